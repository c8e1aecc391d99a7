//! Named functions available to JSON descriptions via `fn`.
//!
//! Each reads its parameters from the node's options. Option errors are
//! faults (the description is wrong); data-dependent misses are `Failure`.

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::event::{NewEvent, Tag, make_event};
use crate::core::path::MemoryPath;
use crate::core::status::NodeStatus;
use crate::io::event_log::{AppendRequest, EventLogError};
use crate::tree::node::{Callable, TickContext};

/// Every stdlib function with its registered name.
pub fn functions() -> Vec<(&'static str, Callable)> {
    vec![
        ("set", Callable::action(set)),
        ("copy", Callable::action(copy)),
        ("increment", Callable::action(increment)),
        ("push", Callable::action(push)),
        ("countdown", Callable::action(countdown)),
        ("emit", Callable::action(emit)),
        ("truthy", Callable::predicate(truthy)),
    ]
}

/// `{path, value}`: write `value` at `path`.
pub fn set(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let path = path_option(ctx, "path")?;
    let value = ctx
        .option("value")
        .cloned()
        .ok_or_else(|| missing_option(ctx, "value"))?;
    ctx.working().set(&path, value)?;
    Ok(NodeStatus::Success)
}

/// `{from, to}`: copy a value (working set, then long-term memory).
pub fn copy(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let from = path_option(ctx, "from")?;
    let to = path_option(ctx, "to")?;
    let Some(value) = ctx.lookup(&from) else {
        debug!(%from, "copy source missing");
        return Ok(NodeStatus::Failure);
    };
    ctx.working().set(&to, value)?;
    Ok(NodeStatus::Success)
}

/// `{path, by?}`: add `by` (default 1) to an integer; a missing value counts as 0.
pub fn increment(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let path = path_option(ctx, "path")?;
    let by = match ctx.option("by") {
        Some(by) => by
            .as_i64()
            .ok_or_else(|| anyhow!("{}: `by` must be an integer", ctx.node().location()))?,
        None => 1,
    };
    let mut not_integer = false;
    ctx.working().update(&path, |current| match current {
        None | Some(Value::Null) => Value::from(by),
        Some(value) => match value.as_i64() {
            Some(n) => Value::from(n.saturating_add(by)),
            None => {
                not_integer = true;
                value.clone()
            }
        },
    })?;
    if not_integer {
        debug!(%path, "increment target is not an integer");
        return Ok(NodeStatus::Failure);
    }
    Ok(NodeStatus::Success)
}

/// `{from, to}`: append a value to the array at `to`, creating it if absent.
pub fn push(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let from = path_option(ctx, "from")?;
    let to = path_option(ctx, "to")?;
    let Some(value) = ctx.lookup(&from) else {
        debug!(%from, "push source missing");
        return Ok(NodeStatus::Failure);
    };
    let mut not_array = false;
    ctx.working().update(&to, |current| match current {
        None | Some(Value::Null) => Value::Array(vec![value]),
        Some(Value::Array(items)) => {
            let mut items = items.clone();
            items.push(value);
            Value::Array(items)
        }
        Some(other) => {
            not_array = true;
            other.clone()
        }
    })?;
    if not_array {
        debug!(%to, "push target is not an array");
        return Ok(NodeStatus::Failure);
    }
    Ok(NodeStatus::Success)
}

/// `{path}`: `Running` while the integer at `path` is positive, decrementing it
/// each tick; `Success` once it reaches zero.
pub fn countdown(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let path = path_option(ctx, "path")?;
    let Some(remaining) = ctx.working().get(&path).and_then(|value| value.as_i64()) else {
        debug!(%path, "countdown target missing or not an integer");
        return Ok(NodeStatus::Failure);
    };
    if remaining <= 0 {
        return Ok(NodeStatus::Success);
    }
    ctx.working().set(&path, Value::from(remaining - 1))?;
    Ok(NodeStatus::Running)
}

/// `{type, tags?, bodyFrom?}`: append one event.
///
/// `tags` are `"type:id"` strings; `bodyFrom` names an object in memory to
/// use as the body. With no event log, or on an append conflict, `Failure`.
pub fn emit(ctx: &TickContext<'_>) -> Result<NodeStatus> {
    let event_type = ctx
        .option("type")
        .and_then(Value::as_str)
        .ok_or_else(|| missing_option(ctx, "type"))?;
    let mut event = NewEvent::new(event_type);
    if let Some(tags) = ctx.option("tags") {
        let tags = tags
            .as_array()
            .ok_or_else(|| anyhow!("{}: `tags` must be an array", ctx.node().location()))?;
        for tag in tags {
            let tag: Tag = tag
                .as_str()
                .ok_or_else(|| anyhow!("{}: tags must be strings", ctx.node().location()))?
                .parse()
                .with_context(|| format!("{}: invalid tag", ctx.node().location()))?;
            event = event.with_tag(tag);
        }
    }
    if ctx.option("bodyFrom").is_some() {
        let source = path_option(ctx, "bodyFrom")?;
        match ctx.lookup(&source) {
            Some(Value::Object(body)) => event = event.with_body(body),
            Some(_) | None => {
                debug!(%source, "emit body missing or not an object");
                return Ok(NodeStatus::Failure);
            }
        }
    }

    let Some(log) = ctx.event_log() else {
        warn!(location = ctx.node().location(), "emit without an event log");
        return Ok(NodeStatus::Failure);
    };
    let mut tx = Map::new();
    tx.insert("node".to_string(), Value::from(ctx.node().location()));
    match log.append(AppendRequest::new(vec![make_event(event)]).with_tx_metadata(tx)) {
        Ok(()) => Ok(NodeStatus::Success),
        Err(EventLogError::Conflict(reason)) => {
            warn!(%reason, "emit rejected");
            Ok(NodeStatus::Failure)
        }
        Err(err) => Err(err.into()),
    }
}

/// `{path}`: the value exists and is not null, false, 0, "" or empty.
pub fn truthy(ctx: &TickContext<'_>) -> bool {
    let Ok(path) = path_option(ctx, "path") else {
        return false;
    };
    match ctx.lookup(&path) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Bool(true)) => true,
    }
}

fn path_option(ctx: &TickContext<'_>, key: &str) -> Result<MemoryPath> {
    let raw = ctx.option(key).ok_or_else(|| missing_option(ctx, key))?;
    MemoryPath::from_value(raw).with_context(|| format!("{}: `{key}`", ctx.node().location()))
}

fn missing_option(ctx: &TickContext<'_>, key: &str) -> anyhow::Error {
    anyhow!(
        "{}: `{}` requires option `{key}`",
        ctx.node().location(),
        ctx.node().option("fn").and_then(Value::as_str).unwrap_or("function")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::core::query::EventQuery;
    use crate::core::status::NodeStatus;
    use crate::io::event_log::{EventLog, InMemoryEventLog};
    use crate::test_support::build_with;
    use crate::tree::builder::InitialContext;
    use crate::tree::description::{Description, sequence};

    fn call(name: &str, options: serde_json::Value) -> Description {
        let mut description = Description::new(if name == "truthy" {
            "condition"
        } else {
            "action"
        });
        if let serde_json::Value::Object(options) = options {
            description = description.with_options(options);
        }
        description.with_option("fn", json!(name))
    }

    fn run(description: Description, working: serde_json::Value) -> (NodeStatus, serde_json::Value) {
        let tree = build_with(description, InitialContext::new().with_working(working))
            .expect("build");
        let status = tree.tick().expect("tick");
        (status, tree.working().snapshot())
    }

    #[test]
    fn set_copy_increment_and_push_edit_the_working_set() {
        let (status, working) = run(
            sequence([
                call("set", json!({"path": "a.b", "value": 3})),
                call("copy", json!({"from": "a.b", "to": "c"})),
                call("increment", json!({"path": "c", "by": 4})),
                call("increment", json!({"path": "fresh"})),
                call("push", json!({"from": "c", "to": "list"})),
                call("push", json!({"from": "fresh", "to": "list"})),
            ]),
            json!({}),
        );
        assert_eq!(status, NodeStatus::Success);
        assert_eq!(
            working,
            json!({"a": {"b": 3}, "c": 7, "fresh": 1, "list": [7, 1]})
        );
    }

    #[test]
    fn data_misses_are_failures() {
        assert_eq!(
            run(call("copy", json!({"from": "nope", "to": "x"})), json!({})).0,
            NodeStatus::Failure
        );
        assert_eq!(
            run(call("increment", json!({"path": "s"})), json!({"s": "text"})).0,
            NodeStatus::Failure
        );
        assert_eq!(
            run(call("push", json!({"from": "v", "to": "s"})), json!({"v": 1, "s": 2})).0,
            NodeStatus::Failure
        );
    }

    #[test]
    fn missing_options_are_faults() {
        let tree = build_with(call("set", json!({"path": "x"})), InitialContext::new())
            .expect("build");
        assert!(tree.tick().is_err());
    }

    #[test]
    fn countdown_runs_until_zero() {
        let tree = build_with(
            call("countdown", json!({"path": "left"})),
            InitialContext::new().with_working(json!({"left": 2})),
        )
        .expect("build");
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Running);
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Running);
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);
        assert_eq!(tree.working().get_str("left"), Some(json!(0)));

        assert_eq!(
            run(call("countdown", json!({"path": "left"})), json!({})).0,
            NodeStatus::Failure
        );
    }

    #[test]
    fn truthy_follows_json_truthiness() {
        for (value, expected) in [
            (json!(1), NodeStatus::Success),
            (json!("x"), NodeStatus::Success),
            (json!([0]), NodeStatus::Success),
            (json!(0), NodeStatus::Failure),
            (json!(""), NodeStatus::Failure),
            (json!({}), NodeStatus::Failure),
            (json!(null), NodeStatus::Failure),
        ] {
            let (status, _) = run(call("truthy", json!({"path": "v"})), json!({"v": value}));
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn emit_appends_tagged_events() {
        let log = Arc::new(InMemoryEventLog::start());
        let tree = build_with(
            call(
                "emit",
                json!({"type": "noted", "tags": ["order:7"], "bodyFrom": "note"}),
            ),
            InitialContext::new()
                .with_working(json!({"note": {"text": "hi"}}))
                .with_event_log(log.clone()),
        )
        .expect("build");
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);

        let events: Vec<_> = log
            .read(&EventQuery::of_type("noted"))
            .expect("read")
            .collect::<Result<_, _>>()
            .expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].body["text"], json!("hi"));
        assert_eq!(events[0].tags.iter().next().map(ToString::to_string), Some("order:7".to_string()));
    }

    #[test]
    fn emit_without_a_log_fails() {
        assert_eq!(
            run(call("emit", json!({"type": "noted"})), json!({})).0,
            NodeStatus::Failure
        );
    }
}
