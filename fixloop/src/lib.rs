//! Edit-lint-fix loop for a single-file Rust project.
//!
//! `fixloop` runs the linter, turns its diagnostic text into structured
//! records, hands the records and the current source to a repair agent, and
//! writes the agent's replacement back, until a lint pass comes back clean.
//!
//! - **[`core`]**: Pure logic (diagnostic extraction, reply parsing, data
//!   model). No I/O.
//! - **[`io`]**: Collaborators behind traits (lint command, HTTP agent, source
//!   file) plus config and iteration logs.
//!
//! [`looping`] drives the cycle on top of both.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
