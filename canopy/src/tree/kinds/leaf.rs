//! Leaf kinds: `condition` and `action`.

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::debug;

use super::reject_children;
use crate::core::path::MemoryPath;
use crate::core::schema::SchemaCheck;
use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::tree::node::{Callable, Node, TickContext};
use crate::tree::registry::NodeKind;

/// Pure check over memory: `Success` when it holds, `Failure` otherwise.
///
/// Either a predicate (`fn` or callable), a `path`, or both. With a `path`,
/// the value is looked up in the working set then long-term memory; a missing
/// value or one that fails the optional `schema` is a `Failure` and the
/// predicate is not consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Condition;

impl NodeKind for Condition {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": {"type": ["string", "array"]},
                "schema": {"type": ["object", "boolean"]}
            }
        }))
    }

    fn build(&self, mut node: Node) -> Result<Node, BuildError> {
        reject_children(&node)?;
        let predicate = match node.callable() {
            Some(Callable::Predicate(predicate)) => Some(predicate.clone()),
            Some(other) => {
                return Err(BuildError::invalid_node(
                    &node,
                    format!("expects a predicate, got {}", other.label()),
                ));
            }
            None => None,
        };
        let path = node
            .option("path")
            .map(MemoryPath::from_value)
            .transpose()
            .map_err(|err| BuildError::invalid_node(&node, format!("path: {err}")))?;
        let schema = node
            .option("schema")
            .map(SchemaCheck::compile)
            .transpose()
            .map_err(|reason| BuildError::InvalidSchema {
                location: node.location().to_string(),
                reason,
            })?;

        let Some(path) = path else {
            if schema.is_some() {
                return Err(BuildError::invalid_node(&node, "schema requires a path"));
            }
            if predicate.is_none() {
                return Err(BuildError::invalid_node(
                    &node,
                    "needs a predicate or a path",
                ));
            }
            return Ok(node);
        };

        let location = node.location().to_string();
        node.set_callable(Callable::predicate(move |ctx| {
            let Some(value) = ctx.lookup(&path) else {
                debug!(%location, %path, "condition path missing");
                return false;
            };
            if let Some(schema) = &schema {
                if let Err(errors) = schema.check(&value) {
                    debug!(%location, %path, errors = %errors.join("; "), "condition value rejected");
                    return false;
                }
            }
            predicate.as_ref().is_none_or(|predicate| predicate(ctx))
        }));
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let Some(Callable::Predicate(predicate)) = node.callable() else {
            bail!("{}: condition has no predicate", node.location());
        };
        Ok(NodeStatus::from_bool(predicate(ctx)))
    }
}

/// Runs an action callable and reports its status verbatim.
///
/// An `Err` from the callable is a fault and propagates out of the tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Action;

impl NodeKind for Action {
    fn build(&self, node: Node) -> Result<Node, BuildError> {
        reject_children(&node)?;
        match node.callable() {
            Some(Callable::Action(_)) => Ok(node),
            Some(other) => Err(BuildError::invalid_node(
                &node,
                format!("expects an action, got {}", other.label()),
            )),
            None => Err(BuildError::invalid_node(
                &node,
                "needs an action (callable or `fn`)",
            )),
        }
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let Some(Callable::Action(action)) = node.callable() else {
            bail!("{}: action has no callable", node.location());
        };
        action(ctx)
    }
}
