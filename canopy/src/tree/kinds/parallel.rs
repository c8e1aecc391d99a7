//! `parallel`: ticks every child concurrently and decides by threshold.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};
use tracing::{Span, debug};

use crate::core::status::NodeStatus;
use crate::error::BuildError;
use crate::tree::kinds::count_option;
use crate::tree::node::{ExecutionContext, Node, TickContext};
use crate::tree::registry::NodeKind;

/// Runs all children each tick on up to `workers` scoped threads.
///
/// Option `successThreshold` (k) defaults to the number of children and is
/// written back into the options at build.
#[derive(Debug, Clone, Copy)]
pub struct Parallel {
    workers: usize,
}

impl Parallel {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl Default for Parallel {
    fn default() -> Self {
        Self::new(4)
    }
}

impl NodeKind for Parallel {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "successThreshold": {"type": "integer", "minimum": 0}
            }
        }))
    }

    fn build(&self, mut node: Node) -> Result<Node, BuildError> {
        let total = node.children().len();
        let threshold = match count_option(&mut node, "successThreshold")? {
            Some(threshold) => usize::try_from(threshold).unwrap_or(usize::MAX),
            None => total,
        };
        if threshold > total {
            return Err(BuildError::invalid_node(
                &node,
                format!("successThreshold {threshold} exceeds child count {total}"),
            ));
        }
        node.set_option("successThreshold", Value::from(threshold));
        Ok(node)
    }

    fn tick(&self, node: &Node, ctx: &TickContext<'_>) -> Result<NodeStatus> {
        let children = node.children();
        let total = children.len();
        let threshold = node
            .option("successThreshold")
            .and_then(Value::as_u64)
            .and_then(|threshold| usize::try_from(threshold).ok())
            .unwrap_or(total);

        let results = tick_all(children, ctx.exec(), self.workers)?;
        let successes = results
            .iter()
            .filter(|status| **status == NodeStatus::Success)
            .count();
        let failures = results
            .iter()
            .filter(|status| **status == NodeStatus::Failure)
            .count();
        let status = decide(successes, failures, total, threshold);
        debug!(
            location = node.location(),
            successes, failures, total, threshold, %status,
            "parallel decided"
        );
        Ok(status)
    }
}

/// Threshold rule: `Success` once `k` children succeeded, `Failure` once
/// success became unreachable, `Running` otherwise.
pub fn decide(successes: usize, failures: usize, total: usize, threshold: usize) -> NodeStatus {
    if successes >= threshold {
        NodeStatus::Success
    } else if failures > total.saturating_sub(threshold) {
        NodeStatus::Failure
    } else {
        NodeStatus::Running
    }
}

/// Tick every child once, at most `workers` at a time, and wait for all of them.
///
/// Results come back in child order; the first child error (by order) wins.
fn tick_all(children: &[Node], exec: &ExecutionContext, workers: usize) -> Result<Vec<NodeStatus>> {
    if children.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.clamp(1, children.len());
    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<Result<NodeStatus>>>> =
        children.iter().map(|_| Mutex::new(None)).collect();

    let panicked = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let span = Span::current();
                let (next, slots) = (&next, &slots);
                scope.spawn(move || {
                    let _entered = span.enter();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(child) = children.get(index) else {
                            break;
                        };
                        let result = child.tick(exec);
                        *slots[index].lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(result);
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().is_err())
            .fold(false, |any, failed| any || failed)
    });
    if panicked {
        bail!("a parallel worker panicked");
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .ok_or_else(|| anyhow!("parallel child {index} was never ticked"))?
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::test_support::{build_tree, build_with, counting_action, fixed};
    use crate::tree::description::{action, parallel};

    #[test]
    fn threshold_rule_covers_all_outcomes() {
        assert_eq!(decide(2, 0, 3, 2), NodeStatus::Success);
        assert_eq!(decide(1, 2, 3, 2), NodeStatus::Failure);
        assert_eq!(decide(1, 1, 3, 2), NodeStatus::Running);
        assert_eq!(decide(0, 2, 3, 2), NodeStatus::Failure);
        assert_eq!(decide(0, 0, 0, 0), NodeStatus::Success);
        assert_eq!(decide(0, 3, 3, 0), NodeStatus::Success);
    }

    #[test]
    fn empty_parallel_succeeds() {
        assert_eq!(
            build_tree(parallel(None, [])).tick().expect("tick"),
            NodeStatus::Success
        );
    }

    #[test]
    fn default_threshold_is_every_child() {
        let tree = build_tree(parallel(
            None,
            [fixed(NodeStatus::Success), fixed(NodeStatus::Running)],
        ));
        assert_eq!(
            tree.root().option("successThreshold"),
            Some(&Value::from(2))
        );
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Running);
    }

    #[test]
    fn two_of_three_succeeds_even_with_a_failure() {
        let tree = build_tree(parallel(
            Some(2),
            [
                fixed(NodeStatus::Success),
                fixed(NodeStatus::Failure),
                fixed(NodeStatus::Success),
            ],
        ));
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);
    }

    #[test]
    fn integral_float_threshold_is_read_as_an_integer() {
        let tree = build_tree(
            parallel(None, [fixed(NodeStatus::Success), fixed(NodeStatus::Failure)])
                .with_option("successThreshold", json!(1.0)),
        );
        assert_eq!(
            tree.root().option("successThreshold"),
            Some(&Value::from(1))
        );
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);
    }

    #[test]
    fn failure_is_decided_while_a_child_is_still_running() {
        let tree = build_tree(parallel(
            Some(2),
            [
                fixed(NodeStatus::Failure),
                fixed(NodeStatus::Failure),
                fixed(NodeStatus::Running),
            ],
        ));
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Failure);
    }

    #[test]
    fn threshold_above_child_count_is_rejected() {
        let err = build_with(
            parallel(Some(3), [fixed(NodeStatus::Success)]),
            Default::default(),
        )
        .expect_err("invalid threshold");
        assert!(matches!(err, BuildError::InvalidNode { .. }));
    }

    #[test]
    fn every_child_is_ticked_even_after_the_outcome_is_known() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tree = build_tree(parallel(
            Some(1),
            [
                counting_action(&counter, NodeStatus::Success),
                counting_action(&counter, NodeStatus::Success),
                counting_action(&counter, NodeStatus::Failure),
            ],
        ));
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn children_overlap_in_time() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let child = || {
            let (in_flight, peak) = (Arc::clone(&in_flight), Arc::clone(&peak));
            action(move |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(NodeStatus::Success)
            })
        };
        let tree = build_tree(parallel(None, [child(), child()]));
        assert_eq!(tree.tick().expect("tick"), NodeStatus::Success);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn first_child_error_by_order_is_returned() {
        let tree = build_tree(parallel(
            None,
            [
                fixed(NodeStatus::Success),
                action(|_| anyhow::bail!("first")),
                action(|_| anyhow::bail!("second")),
            ],
        ));
        let err = tree.tick().expect_err("fault");
        assert_eq!(err.to_string(), "first");
    }
}
