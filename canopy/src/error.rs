//! Typed errors raised while registering node kinds and building trees.
//!
//! Tick-time faults are not listed here: `tick` returns `anyhow::Result` so an
//! action's own error reaches the caller unchanged.

use crate::io::event_log::EventLogError;
use crate::tree::node::Node;

/// Fatal error from [`crate::tree::builder::TreeBuilder::build`].
///
/// `location` is the `/`-separated child index path of the offending node,
/// rooted at `root` (e.g. `root/1/0`).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{location}: unknown node kind '{kind}'")]
    UnknownKind { kind: String, location: String },

    #[error("{location}: unknown function '{name}' for node kind '{kind}'")]
    UnknownFunction {
        name: String,
        kind: String,
        location: String,
    },

    #[error("{location}: malformed description: {reason}")]
    Malformed { location: String, reason: String },

    #[error("{location}: invalid options for '{kind}': {}", errors.join("; "))]
    InvalidOptions {
        kind: String,
        location: String,
        errors: Vec<String>,
    },

    #[error("{location}: invalid schema: {reason}")]
    InvalidSchema { location: String, reason: String },

    #[error("{location}: invalid '{kind}' node: {reason}")]
    InvalidNode {
        kind: String,
        location: String,
        reason: String,
    },

    #[error("invalid initial context: {0}")]
    InvalidContext(String),

    #[error("long-term memory requested but no event log was provided")]
    MissingEventLog,

    #[error("materialize long-term memory: {0}")]
    Memory(#[source] EventLogError),
}

impl BuildError {
    /// Kind-specific build rejection for `node`.
    pub fn invalid_node(node: &Node, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            kind: node.tag().to_string(),
            location: node.location().to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(location: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error from [`crate::tree::registry::Registry`] registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("node kind '{0}' is already registered (strict registry)")]
    DuplicateKind(String),

    #[error("function '{0}' is already registered (strict registry)")]
    DuplicateFunction(String),

    #[error("node kind '{kind}' declares an invalid options schema: {reason}")]
    InvalidOptionsSchema { kind: String, reason: String },
}
