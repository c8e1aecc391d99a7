//! Built-in node kinds.

mod composite;
mod leaf;
mod parallel;

pub use composite::{Fallback, Sequence};
pub use leaf::{Action, Condition};
pub use parallel::{Parallel, decide};

use serde_json::Value;

use crate::error::BuildError;
use crate::tree::node::Node;

pub(crate) fn reject_children(node: &Node) -> Result<(), BuildError> {
    if node.children().is_empty() {
        return Ok(());
    }
    Err(BuildError::invalid_node(
        node,
        format!("takes no children, got {}", node.children().len()),
    ))
}

pub(crate) fn single_child(node: &Node) -> Result<(), BuildError> {
    match node.children().len() {
        1 => Ok(()),
        n => Err(BuildError::invalid_node(
            node,
            format!("takes exactly one child, got {n}"),
        )),
    }
}

/// Read a non-negative integer option, accepting integral floats such as `2.0`.
///
/// A present value is written back as a plain integer so ticks can read it
/// with `as_u64`. Anything else is rejected rather than defaulted.
pub(crate) fn count_option(node: &mut Node, key: &str) -> Result<Option<u64>, BuildError> {
    let Some(raw) = node.option(key) else {
        return Ok(None);
    };
    let count = raw.as_u64().or_else(|| {
        raw.as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= u64::MAX as f64)
            .map(|n| n as u64)
    });
    let Some(count) = count else {
        return Err(BuildError::invalid_node(
            node,
            format!("{key} must be a non-negative integer, got {raw}"),
        ));
    };
    node.set_option(key, Value::from(count));
    Ok(Some(count))
}
