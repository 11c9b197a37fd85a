//! CLI layer for mnemo-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! serving the two MCP transports, running the dreaming pipeline, and
//! inspecting state.

pub mod commands;
pub mod parser;

pub use commands::execute;
pub use parser::{Cli, Commands, DreamCommands};
