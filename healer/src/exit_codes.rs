//! Stable exit codes for `healer` commands.

/// Command finished. `healer run` also exits with this when the heal attempt
/// itself failed, so the invoking workflow is never failed by it.
pub const OK: i32 = 0;
/// Invalid input: strict-mode configuration errors, protocol violations,
/// unreadable files.
pub const INVALID: i32 = 1;
