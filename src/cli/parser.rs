//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mnemo-rs: tiered agent memory and MCP tool-execution server.
///
/// Serves a persistent, searchable memory and a catalog of structured
/// tools to LLM clients over stdio or HTTP.
#[derive(Parser, Debug)]
#[command(name = "mnemo-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the JSON configuration file.
    ///
    /// Environment variables override file values; see the config module
    /// docs for the list.
    #[arg(short, long, env = "MNEMO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve MCP over stdin/stdout (line-delimited JSON-RPC).
    ///
    /// The standard transport for desktop MCP clients. Logs go to stderr;
    /// stdout carries only protocol messages.
    #[command(after_help = r#"Examples:
  mnemo-rs serve-stdio                       # Default config
  mnemo-rs --config mnemo.json serve-stdio   # Explicit config file
"#)]
    ServeStdio,

    /// Serve MCP over HTTP with SSE-framed responses.
    #[command(after_help = r#"Examples:
  mnemo-rs serve-http                        # Bind per config (127.0.0.1:8000)
  mnemo-rs serve-http --port 9000            # Override the port
  MCP_REQUIRE_AUTH=true MCP_API_KEY=k1 mnemo-rs serve-http
"#)]
    ServeHttp {
        /// Bind host override.
        #[arg(long)]
        host: Option<String>,

        /// Bind port override.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Dreaming consolidation operations (process, upgrade, inspect).
    #[command(subcommand)]
    Dream(DreamCommands),

    /// List the tool catalog as JSON.
    Tools {
        /// Include user-prompt templates.
        #[arg(short, long)]
        templates: bool,

        /// Group by category instead of a flat list.
        #[arg(long)]
        by_category: bool,
    },

    /// Show memory tier statistics.
    Status,
}

/// Dreaming pipeline operations.
#[derive(Subcommand, Debug)]
pub enum DreamCommands {
    /// Run the consolidation pipeline over a conversation text file.
    #[command(after_help = r#"Examples:
  mnemo-rs dream process session-42 transcript.txt
  mnemo-rs dream process session-42 transcript.txt --quality good
"#)]
    Process {
        /// Conversation identifier (directory name under dreams/).
        conversation_id: String,

        /// File holding the raw conversation text.
        file: PathBuf,

        /// Quality level override (basic, good, premium).
        #[arg(short, long)]
        quality: Option<String>,
    },

    /// Re-run an archived conversation at a higher quality level.
    Upgrade {
        /// Conversation identifier.
        conversation_id: String,

        /// Target quality level (good, premium).
        #[arg(short, long, default_value = "good")]
        quality: String,
    },

    /// Print an archive version (latest when --version is omitted).
    Show {
        /// Conversation identifier.
        conversation_id: String,

        /// Specific version to print.
        #[arg(long)]
        version: Option<u32>,
    },

    /// Print a conversation's manifest.
    Manifest {
        /// Conversation identifier.
        conversation_id: String,
    },

    /// List all archived conversations.
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_stdio() {
        let cli = Cli::try_parse_from(["mnemo-rs", "serve-stdio"]).unwrap_or_else(|_| unreachable!());
        assert!(matches!(cli.command, Commands::ServeStdio));
    }

    #[test]
    fn test_parse_serve_http_with_port() {
        let cli = Cli::try_parse_from(["mnemo-rs", "serve-http", "--port", "9000"])
            .unwrap_or_else(|_| unreachable!());
        let Commands::ServeHttp { port, host } = cli.command else {
            unreachable!()
        };
        assert_eq!(port, Some(9000));
        assert!(host.is_none());
    }

    #[test]
    fn test_parse_dream_process() {
        let cli = Cli::try_parse_from([
            "mnemo-rs", "dream", "process", "conv-1", "text.txt", "--quality", "good",
        ])
        .unwrap_or_else(|_| unreachable!());
        let Commands::Dream(DreamCommands::Process {
            conversation_id,
            quality,
            ..
        }) = cli.command
        else {
            unreachable!()
        };
        assert_eq!(conversation_id, "conv-1");
        assert_eq!(quality.as_deref(), Some("good"));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["mnemo-rs"]).is_err());
    }
}
