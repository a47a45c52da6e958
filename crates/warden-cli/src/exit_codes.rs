//! Process exit codes
//!
//! These follow sysexits.h where a matching code exists.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - a flag or environment variable is invalid
pub const CONFIG_ERROR: i32 = 78;

/// IO error - certificate unreadable, address in use, etc.
pub const IO_ERROR: i32 = 74;

/// Service unavailable - the Kubernetes API cannot be reached
pub const UNAVAILABLE: i32 = 69;
