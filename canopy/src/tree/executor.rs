//! Compiled trees and the tick loop that drives them.

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::core::memory::{LongTermMemory, MemoryProjection};
use crate::core::status::NodeStatus;
use crate::core::working_set::WorkingSet;
use crate::io::event_log::EventLogError;
use crate::tree::node::{ExecutionContext, Node};

/// A compiled, runnable tree instance.
///
/// Nodes are immutable; state lives in the context, so ticking a tree twice
/// with unchanged memory produces the same status.
#[derive(Debug)]
pub struct Tree {
    root: Node,
    context: ExecutionContext,
    projection: Option<MemoryProjection>,
}

impl Tree {
    pub(crate) fn new(
        root: Node,
        context: ExecutionContext,
        projection: Option<MemoryProjection>,
    ) -> Self {
        Self {
            root,
            context,
            projection,
        }
    }

    /// Evaluate the root once.
    ///
    /// An `Err` is a fault raised by an action (or a panicked parallel
    /// worker); it is not a status.
    #[instrument(skip_all, fields(root = %self.root.tag()))]
    pub fn tick(&self) -> Result<NodeStatus> {
        let status = self.root.tick(&self.context)?;
        debug!(%status, "tree ticked");
        Ok(status)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn working(&self) -> &WorkingSet {
        self.context.working()
    }

    pub fn long_term(&self) -> &LongTermMemory {
        self.context.long_term()
    }

    /// Fold events appended since build (or the last refresh) into long-term
    /// memory. Returns how many events were folded.
    pub fn refresh_long_term(&mut self) -> Result<usize, EventLogError> {
        let (Some(projection), Some(log)) = (&self.projection, self.context.event_log()) else {
            return Ok(0);
        };
        let log = Arc::clone(log);
        self.context
            .long_term_mut()
            .refresh(projection, log.as_ref())
    }
}

/// Where [`drive`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Last status observed; `Running` means the bound was hit.
    pub status: NodeStatus,
    pub ticks: u32,
}

impl DriveOutcome {
    pub fn exhausted(&self) -> bool {
        self.status == NodeStatus::Running
    }
}

/// Tick `tree` until it reports a terminal status or `max_ticks` ticks ran.
pub fn drive<F>(tree: &Tree, max_ticks: u32, on_tick: F) -> Result<DriveOutcome>
where
    F: FnMut(u32, NodeStatus),
{
    drive_node(&tree.root, &tree.context, max_ticks, on_tick)
}

pub(crate) fn drive_node<F>(
    root: &Node,
    context: &ExecutionContext,
    max_ticks: u32,
    mut on_tick: F,
) -> Result<DriveOutcome>
where
    F: FnMut(u32, NodeStatus),
{
    if max_ticks == 0 {
        bail!("max_ticks must be > 0");
    }
    let mut ticks = 0u32;
    loop {
        let status = root.tick(context)?;
        ticks += 1;
        on_tick(ticks, status);
        if status.is_terminal() || ticks >= max_ticks {
            debug!(%status, ticks, "drive stopped");
            return Ok(DriveOutcome { status, ticks });
        }
    }
}
