//! Deterministic, pure logic shared by the repair loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod extract;
pub mod response;
pub mod types;
