//! Extension node kinds registered by [`crate::tree::registry::Registry::standard`].

mod invoke;
mod repeat;

pub use invoke::Invoke;
pub use repeat::Repeat;
