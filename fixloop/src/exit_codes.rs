//! Stable exit codes for fixloop CLI commands.

/// Command succeeded; for `run`, the lint converged.
pub const OK: i32 = 0;
/// A collaborator (lint, agent, source file) failed, or any other error.
pub const INVALID: i32 = 1;
/// Missing or invalid config, or missing API key. Raised before any cycle runs.
pub const CONFIG: i32 = 2;
/// `fixloop run` spent `max_iterations` repairs without converging.
pub const NOT_CONVERGED: i32 = 3;
