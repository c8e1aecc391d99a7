//! `repeat`: re-ticks one child within a single tick while it keeps succeeding.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::tree::kinds::{count_option, single_child};
use crate::tree::node::{Node, TickContext};
use crate::tree::registry::NodeKind;

/// Loops its child until the child fails (`Success`), reports `Running`
/// (`Running`), or `maxIterations` successes ran without either (`Failure`).
///
/// Child failure ends the loop successfully: the child is the loop guard.
#[derive(Debug, Clone, Copy)]
pub struct Repeat {
    default_max_iterations: u64,
}

impl Repeat {
    pub fn new(default_max_iterations: u64) -> Self {
        Self {
            default_max_iterations: default_max_iterations.max(1),
        }
    }
}

impl NodeKind for Repeat {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "maxIterations": {"type": "integer", "minimum": 1}
            }
        }))
    }

    fn build(&self, mut node: Node) -> Result<Node, BuildError> {
        single_child(&node)?;
        if count_option(&mut node, "maxIterations")?.is_none() {
            node.set_option("maxIterations", Value::from(self.default_max_iterations));
        }
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let max_iterations = node
            .option("maxIterations")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_max_iterations);
        let child = &node.children()[0];

        for iteration in 1..=max_iterations {
            match child.tick(ctx.exec())? {
                NodeStatus::Success => {}
                NodeStatus::Failure => {
                    debug!(location = node.location(), iteration, "repeat finished");
                    return Ok(NodeStatus::Success);
                }
                NodeStatus::Running => return Ok(NodeStatus::Running),
            }
        }
        warn!(
            location = node.location(),
            max_iterations, "repeat hit its iteration bound"
        );
        Ok(NodeStatus::Failure)
    }
}
