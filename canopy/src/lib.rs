//! Behavior-tree execution engine.
//!
//! A tree is compiled once from a nested description and then ticked by the
//! caller until its root reports a terminal status. Every tick re-walks the tree
//! from the root; progress lives in the working set, never in the nodes.
//!
//! - **[`core`]**: Pure, deterministic building blocks (status algebra, memory
//!   paths, working set, events, long-term memory folds). No I/O.
//! - **[`tree`]**: The engine proper: description DSL, node kind registry,
//!   builder, executor, built-in and extension node kinds.
//! - **[`io`]**: Side-effecting collaborators (configuration, event logs, child
//!   processes, model invocation).

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
