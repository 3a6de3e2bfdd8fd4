//! Side-effecting collaborators: processes, HTTP, filesystem.

pub mod agent;
pub mod config;
pub mod init;
pub mod iteration_log;
pub mod lint;
pub mod process;
pub mod prompt;
pub mod source_store;
