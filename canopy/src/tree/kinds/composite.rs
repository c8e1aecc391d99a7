//! `sequence` and `fallback`: ordered, short-circuiting composites.

use anyhow::Result;
use tracing::trace;

use crate::core::status::NodeStatus;
use crate::tree::node::{Node, TickContext};
use crate::tree::registry::NodeKind;

/// Ticks children in order while they succeed. Empty: `Success`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequence;

impl NodeKind for Sequence {
    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        for (index, child) in node.children().iter().enumerate() {
            let status = child.tick(ctx.exec())?;
            if status != NodeStatus::Success {
                trace!(location = node.location(), index, %status, "sequence short-circuited");
                return Ok(status);
            }
        }
        Ok(NodeStatus::Success)
    }
}

/// Ticks children in order while they fail. Empty: `Failure`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fallback;

impl NodeKind for Fallback {
    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        for (index, child) in node.children().iter().enumerate() {
            let status = child.tick(ctx.exec())?;
            if status != NodeStatus::Failure {
                trace!(location = node.location(), index, %status, "fallback short-circuited");
                return Ok(status);
            }
        }
        Ok(NodeStatus::Failure)
    }
}
