//! Stable exit codes for `canopy` CLI commands.

/// Command succeeded, or the tree finished with `success`.
pub const OK: i32 = 0;
/// Invalid input: unreadable files, malformed descriptions, build errors, action faults.
pub const INVALID: i32 = 1;
/// `canopy run` finished with `failure`.
pub const FAILURE: i32 = 2;
/// `canopy run` exhausted `max_ticks` while the root was still `running`.
pub const STILL_RUNNING: i32 = 3;
