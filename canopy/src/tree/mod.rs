//! The behavior-tree engine.
//!
//! A [`description::Description`] is compiled by [`builder::TreeBuilder`]
//! through the [`registry::Registry`] into a [`executor::Tree`]: an immutable
//! [`node::Node`] graph plus the execution context shared by all its nodes.

pub mod builder;
pub mod description;
pub mod executor;
pub mod ext;
pub mod kinds;
pub mod node;
pub mod registry;
pub mod stdlib;
