//! Side-effecting collaborators: configuration, event logs, child processes and
//! model invocation.

pub mod config;
pub mod event_log;
pub mod model;
pub mod process;
pub mod prompt;
