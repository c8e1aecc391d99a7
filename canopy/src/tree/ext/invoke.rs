//! `invoke`: drives a nested tree to completion inside one tick.

use anyhow::Result;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::core::path::MemoryPath;
use crate::core::status::NodeStatus;
use crate::core::working_set::WorkingSet;
use crate::error::BuildError;
use crate::tree::executor::drive_node;
use crate::tree::kinds::{count_option, single_child};
use crate::tree::node::{Callable, Node, TickContext};
use crate::tree::registry::NodeKind;

/// Runs its single child as the root of a nested tree.
///
/// The nested tree gets a fresh working set seeded by the node's projection
/// (a callable, `fn`, or the `input` map of child key → parent path) and
/// shares long-term memory, the event log and extras with the parent. It is
/// ticked until terminal or `maxTicks`. On `Success` the value at
/// `resultPath` (default `result`) is copied to the parent's `outputPath`
/// when one is set. Anything else is `Failure`.
#[derive(Debug, Clone, Copy)]
pub struct Invoke {
    default_max_ticks: u32,
}

impl Invoke {
    pub fn new(default_max_ticks: u32) -> Self {
        Self {
            default_max_ticks: default_max_ticks.max(1),
        }
    }
}

impl NodeKind for Invoke {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "object",
                    "additionalProperties": {"type": ["string", "array"]}
                },
                "resultPath": {"type": ["string", "array"]},
                "outputPath": {"type": ["string", "array"]},
                "maxTicks": {"type": "integer", "minimum": 1}
            }
        }))
    }

    fn build(&self, mut node: Node) -> Result<Node, BuildError> {
        single_child(&node)?;
        for key in ["resultPath", "outputPath"] {
            if let Some(raw) = node.option(key) {
                MemoryPath::from_value(raw)
                    .map_err(|err| BuildError::invalid_node(&node, format!("{key}: {err}")))?;
            }
        }
        if node.option("resultPath").is_none() {
            node.set_option("resultPath", json!("result"));
        }
        if count_option(&mut node, "maxTicks")?.is_none() {
            node.set_option("maxTicks", Value::from(self.default_max_ticks));
        }

        let input = match node.option("input") {
            Some(Value::Object(input)) => Some(parse_input(&node, input)?),
            _ => None,
        };
        let supplied = node.callable().map(|callable| {
            (matches!(callable, Callable::Projection(_)), callable.label())
        });
        match (supplied, input) {
            (Some((true, _)), None) => {}
            (Some((true, _)), Some(_)) => {
                return Err(BuildError::invalid_node(
                    &node,
                    "takes either a projection or an `input` map, not both",
                ));
            }
            (Some((false, label)), _) => {
                return Err(BuildError::invalid_node(
                    &node,
                    format!("expects a projection, got {label}"),
                ));
            }
            (None, Some(input)) => node.set_callable(Callable::projection(move |ctx| {
                project_input(ctx, &input)
            })),
            (None, None) => node.set_callable(Callable::projection(|_| Some(Map::new()))),
        }
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let Some(Callable::Projection(project)) = node.callable() else {
            anyhow::bail!("{}: invoke has no projection", node.location());
        };
        let Some(seed) = project(ctx) else {
            debug!(location = node.location(), "nested tree input unavailable");
            return Ok(NodeStatus::Failure);
        };

        let max_ticks = node
            .option("maxTicks")
            .and_then(Value::as_u64)
            .and_then(|ticks| u32::try_from(ticks).ok())
            .unwrap_or(self.default_max_ticks);
        let nested = ctx.exec().with_working(WorkingSet::from_map(seed));
        let outcome = drive_node(&node.children()[0], &nested, max_ticks, |_, _| {})?;

        match outcome.status {
            NodeStatus::Success => {}
            NodeStatus::Failure => return Ok(NodeStatus::Failure),
            NodeStatus::Running => {
                warn!(
                    location = node.location(),
                    max_ticks, "nested tree still running at its tick bound"
                );
                return Ok(NodeStatus::Failure);
            }
        }

        let Some(output_path) = node.option("outputPath") else {
            return Ok(NodeStatus::Success);
        };
        let output_path = MemoryPath::from_value(output_path)?;
        let result_path = match node.option("resultPath") {
            Some(raw) => MemoryPath::from_value(raw)?,
            None => MemoryPath::key("result"),
        };
        let Some(result) = nested.working().get(&result_path) else {
            debug!(
                location = node.location(),
                %result_path, "nested tree succeeded without a result"
            );
            return Ok(NodeStatus::Failure);
        };
        ctx.working().set(&output_path, result)?;
        debug!(
            location = node.location(),
            ticks = outcome.ticks,
            %output_path,
            "nested tree result copied"
        );
        Ok(NodeStatus::Success)
    }
}

fn parse_input(
    node: &Node,
    input: &Map<String, Value>,
) -> Result<Vec<(MemoryPath, MemoryPath)>, BuildError> {
    input
        .iter()
        .map(|(child_key, parent_path)| {
            let target = MemoryPath::parse(child_key)
                .map_err(|err| BuildError::invalid_node(node, format!("input key: {err}")))?;
            let source = MemoryPath::from_value(parent_path)
                .map_err(|err| BuildError::invalid_node(node, format!("input path: {err}")))?;
            Ok((target, source))
        })
        .collect()
}

/// Copy each mapped parent value into a fresh seed; `None` if any is missing.
fn project_input(
    ctx: &TickContext<'_>,
    input: &[(MemoryPath, MemoryPath)],
) -> Option<Map<String, Value>> {
    let mut seed = Value::Object(Map::new());
    for (target, source) in input {
        let value = ctx.lookup(source)?;
        target.set(&mut seed, value).ok()?;
    }
    match seed {
        Value::Object(seed) => Some(seed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_with, fixed};
    use crate::tree::builder::InitialContext;
    use crate::tree::description::{Description, action, invoke, named_action, sequence};

    fn add_pair() -> Description {
        action(|ctx| {
            let a = ctx.working().get_str("a").and_then(|v| v.as_i64());
            let b = ctx.working().get_str("b").and_then(|v| v.as_i64());
            let (Some(a), Some(b)) = (a, b) else {
                return Ok(NodeStatus::Failure);
            };
            ctx.working().set_str("result", json!(a + b))?;
            Ok(NodeStatus::Success)
        })
    }

    fn run(description: Description, working: Value) -> (NodeStatus, Value) {
        let tree = build_with(description, InitialContext::new().with_working(working))
            .expect("build");
        let status = tree.tick().expect("tick");
        (status, tree.working().snapshot())
    }

    #[test]
    fn input_map_seeds_and_result_is_copied_back() {
        let description = Description::new("invoke")
            .with_option("input", json!({"a": "pair.x", "b": "pair.y"}))
            .with_option("outputPath", json!("sum"))
            .with_child(add_pair());
        let (status, working) = run(description, json!({"pair": {"x": 2, "y": 40}}));
        assert_eq!(status, NodeStatus::Success);
        assert_eq!(working["sum"], json!(42));
        assert!(working.get("result").is_none());
    }

    #[test]
    fn projection_returning_none_fails() {
        let description = invoke(add_pair(), |_| None).with_option("outputPath", json!("sum"));
        let (status, working) = run(description, json!({}));
        assert_eq!(status, NodeStatus::Failure);
        assert!(working.get("sum").is_none());
    }

    #[test]
    fn missing_input_path_fails() {
        let description = Description::new("invoke")
            .with_option("input", json!({"a": "nope"}))
            .with_child(fixed(NodeStatus::Success));
        assert_eq!(run(description, json!({})).0, NodeStatus::Failure);
    }

    #[test]
    fn nested_failure_and_missing_result_fail() {
        let failing = invoke(fixed(NodeStatus::Failure), |_| Some(Map::new()));
        assert_eq!(run(failing, json!({})).0, NodeStatus::Failure);

        let no_result = invoke(fixed(NodeStatus::Success), |_| Some(Map::new()))
            .with_option("outputPath", json!("out"));
        assert_eq!(run(no_result, json!({})).0, NodeStatus::Failure);
    }

    #[test]
    fn nested_tree_is_driven_to_its_tick_bound() {
        let description =
            invoke(fixed(NodeStatus::Running), |_| Some(Map::new())).with_option("maxTicks", json!(3));
        assert_eq!(run(description, json!({})).0, NodeStatus::Failure);
    }

    #[test]
    fn integral_float_tick_bound_is_honoured() {
        let ticks = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let description = invoke(
            crate::test_support::counting_action(&ticks, NodeStatus::Running),
            |_| Some(Map::new()),
        )
        .with_option("maxTicks", json!(2.0));
        assert_eq!(run(description, json!({})).0, NodeStatus::Failure);
        assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_working_set_is_isolated() {
        let mut options = Map::new();
        options.insert("path".into(), json!("scratch"));
        options.insert("value".into(), json!(true));
        let nested = sequence([named_action("set", options)]);
        let (status, working) = run(
            invoke(nested, |_| Some(Map::new())),
            json!({"keep": 1}),
        );
        assert_eq!(status, NodeStatus::Success);
        assert_eq!(working, json!({"keep": 1}));
    }

    #[test]
    fn projection_and_input_are_exclusive() {
        let description = invoke(fixed(NodeStatus::Success), |_| Some(Map::new()))
            .with_option("input", json!({"a": "x"}));
        assert!(matches!(
            build_with(description, InitialContext::new()),
            Err(BuildError::InvalidNode { .. })
        ));
    }
}
