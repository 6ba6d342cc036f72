//! Stable exit codes for documenter CLI commands.

/// The run completed, or a non-run command succeeded.
pub const OK: i32 = 0;
/// The run failed (budget, timeout, cancellation, upstream, decode) or the input/config was invalid.
pub const FAILED: i32 = 1;
/// The model stopped to ask the operator clarification questions.
pub const CLARIFICATION: i32 = 2;
/// Three consecutive tool failures aborted the run.
pub const ABORTED: i32 = 3;
