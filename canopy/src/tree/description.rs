//! The nested description format and fluent constructors for it.
//!
//! In JSON a node is `["kind", {options}?, child, child, ...]`: position 0 is
//! the kind tag, position 1 may hold the options record, every other position
//! is a child description.

use serde_json::{Map, Value};

use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::tree::node::{Callable, TickContext};

/// Uncompiled node.
#[derive(Debug, Clone)]
pub struct Description {
    pub kind: String,
    pub options: Map<String, Value>,
    pub callable: Option<Callable>,
    pub children: Vec<Description>,
}

impl Description {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
            callable: None,
            children: Vec::new(),
        }
    }

    /// Parse the JSON form. Callables are referenced by name via `fn`.
    pub fn parse(value: &Value) -> Result<Self, BuildError> {
        parse_at(value, "root")
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options.extend(options);
        self
    }

    #[must_use]
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_option("id", Value::String(id.into()))
    }

    #[must_use]
    pub fn with_callable(mut self, callable: Callable) -> Self {
        self.callable = Some(callable);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Description) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Description>) -> Self {
        self.children.extend(children);
        self
    }
}

pub fn sequence(children: impl IntoIterator<Item = Description>) -> Description {
    Description::new("sequence").with_children(children)
}

pub fn fallback(children: impl IntoIterator<Item = Description>) -> Description {
    Description::new("fallback").with_children(children)
}

/// `threshold` defaults to the number of children.
pub fn parallel(
    threshold: Option<usize>,
    children: impl IntoIterator<Item = Description>,
) -> Description {
    let description = Description::new("parallel").with_children(children);
    match threshold {
        Some(threshold) => description.with_option("successThreshold", Value::from(threshold)),
        None => description,
    }
}

pub fn condition<F>(predicate: F) -> Description
where
    F: Fn(&TickContext<'_>) -> bool + Send + Sync + 'static,
{
    Description::new("condition").with_callable(Callable::predicate(predicate))
}

/// Condition that succeeds when `path` resolves to a value valid against `schema`.
pub fn check(path: &str, schema: Value) -> Description {
    Description::new("condition")
        .with_option("path", Value::String(path.to_string()))
        .with_option("schema", schema)
}

pub fn action<F>(f: F) -> Description
where
    F: Fn(&TickContext<'_>) -> anyhow::Result<NodeStatus> + Send + Sync + 'static,
{
    Description::new("action").with_callable(Callable::action(f))
}

/// Action backed by a registered function.
pub fn named_action(name: &str, options: Map<String, Value>) -> Description {
    Description::new("action")
        .with_options(options)
        .with_option("fn", Value::String(name.to_string()))
}

pub fn repeat(child: Description) -> Description {
    Description::new("repeat").with_child(child)
}

/// Run `root` as a nested tree whose working set is seeded by `projection`.
pub fn invoke<F>(root: Description, projection: F) -> Description
where
    F: Fn(&TickContext<'_>) -> Option<Map<String, Value>> + Send + Sync + 'static,
{
    Description::new("invoke")
        .with_callable(Callable::projection(projection))
        .with_child(root)
}

fn parse_at(value: &Value, location: &str) -> Result<Description, BuildError> {
    let Value::Array(items) = value else {
        return Err(BuildError::malformed(
            location,
            format!("expected an array, got {}", type_name(value)),
        ));
    };
    let Some((head, rest)) = items.split_first() else {
        return Err(BuildError::malformed(location, "empty description"));
    };
    let kind = match head {
        Value::String(kind) if !kind.is_empty() => kind.clone(),
        other => {
            return Err(BuildError::malformed(
                location,
                format!("position 0 must be a kind tag, got {}", type_name(other)),
            ));
        }
    };

    let (options, rest) = match rest.split_first() {
        Some((Value::Object(options), rest)) => (options.clone(), rest),
        _ => (Map::new(), rest),
    };
    let offset = items.len() - rest.len();

    let mut children = Vec::with_capacity(rest.len());
    for (index, child) in rest.iter().enumerate() {
        match child {
            Value::Array(_) => {
                children.push(parse_at(child, &format!("{location}/{index}"))?);
            }
            Value::Object(_) => {
                return Err(BuildError::malformed(
                    location,
                    format!(
                        "options record at position {}; only position 1 may hold options",
                        offset + index
                    ),
                ));
            }
            other => {
                return Err(BuildError::malformed(
                    &format!("{location}/{index}"),
                    format!("child must be a description, got {}", type_name(other)),
                ));
            }
        }
    }

    Ok(Description {
        kind,
        options,
        callable: None,
        children,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_options_and_children() {
        let description = Description::parse(&json!([
            "sequence",
            {"id": "root"},
            ["condition", {"fn": "ready"}],
            ["action", {"fn": "go"}]
        ]))
        .expect("parse");

        assert_eq!(description.kind, "sequence");
        assert_eq!(description.options["id"], json!("root"));
        assert_eq!(description.children.len(), 2);
        assert_eq!(description.children[1].kind, "action");
        assert_eq!(description.children[1].options["fn"], json!("go"));
    }

    #[test]
    fn bare_tag_has_no_options_or_children() {
        let description = Description::parse(&json!(["sequence"])).expect("parse");
        assert!(description.options.is_empty());
        assert!(description.children.is_empty());
    }

    #[test]
    fn options_after_a_child_are_rejected_with_location() {
        let err = Description::parse(&json!([
            "sequence",
            ["fallback", ["action"], {"late": true}]
        ]))
        .expect_err("malformed");

        match err {
            BuildError::Malformed { location, reason } => {
                assert_eq!(location, "root/0");
                assert!(reason.contains("position 2"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_tag_heads_and_scalars() {
        assert!(matches!(
            Description::parse(&json!([])),
            Err(BuildError::Malformed { .. })
        ));
        assert!(matches!(
            Description::parse(&json!([{"id": "x"}])),
            Err(BuildError::Malformed { .. })
        ));
        let err = Description::parse(&json!(["sequence", 3])).expect_err("scalar child");
        assert!(matches!(err, BuildError::Malformed { location, .. } if location == "root/0"));
    }

    #[test]
    fn fluent_constructors_build_nested_descriptions() {
        let description = sequence([
            check("ready", json!({"const": true})),
            parallel(Some(1), [action(|_| Ok(NodeStatus::Success))]),
        ]);
        assert_eq!(description.children[0].options["path"], json!("ready"));
        assert_eq!(
            description.children[1].options["successThreshold"],
            json!(1)
        );
        assert!(description.children[1].children[0].callable.is_some());
    }
}
