//! Deterministic building blocks shared by the engine.
//!
//! Core modules are free of I/O side effects. Collaborators such as the event
//! log are reached only through traits defined in [`crate::io`].

pub mod event;
pub mod memory;
pub mod path;
pub mod query;
pub mod schema;
pub mod status;
pub mod working_set;
