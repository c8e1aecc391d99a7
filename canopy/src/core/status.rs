//! Three-valued node result.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one tick of a node.
///
/// `Running` is the only value that asks the caller to tick the tree again.
/// It is a control signal, not an error: faults travel through `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Failure,
    Running,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Running)
    }

    /// `Success` when `cond` holds, else `Failure`.
    pub fn from_bool(cond: bool) -> Self {
        if cond {
            NodeStatus::Success
        } else {
            NodeStatus::Failure
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Success => "success",
            NodeStatus::Failure => "failure",
            NodeStatus::Running => "running",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_non_terminal() {
        assert!(NodeStatus::Success.is_terminal());
        assert!(NodeStatus::Failure.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&NodeStatus::Running).expect("serialize");
        assert_eq!(json, "\"running\"");
        let parsed: NodeStatus = serde_json::from_str("\"failure\"").expect("parse");
        assert_eq!(parsed, NodeStatus::Failure);
    }
}
