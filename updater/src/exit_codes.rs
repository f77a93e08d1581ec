//! Stable exit codes for updater CLI commands.

/// Every location was checked out.
pub const OK: i32 = 0;
/// A checkout failed, or config/arguments were invalid.
pub const FAILED: i32 = 1;
/// A checkout was cancelled.
pub const CANCELLED: i32 = 2;
/// A checkout gave up on authentication (no externals were reported for it).
pub const AUTH_FAILED: i32 = 3;
