//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, config, or plan, or any failure without a dedicated code.
pub const INVALID: i32 = 1;
/// The command gate rejected the request (wrong command or no instructions).
pub const COMMAND_REJECTED: i32 = 2;
/// Every attempt failed.
pub const RECOVERY_EXHAUSTED: i32 = 3;
