//! Command-line interface for medqa
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Medical question answering over a fine-tuned language model
#[derive(Parser, Debug)]
#[command(
    name = "medqa",
    version,
    about = "Medical question answering over a fine-tuned language model"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the model and serve the HTTP API (default)
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(long, short = 'p', value_name = "PORT")]
        port: Option<u16>,

        /// Per-request generation timeout, e.g. 90s or 5m (overrides server.generation_timeout)
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
        timeout: Option<String>,
    },

    /// Load the model locally and answer one question
    Ask {
        /// The question to answer
        question: String,
    },

    /// Query the status of a running server
    Status {
        /// Server base URL
        #[arg(long, value_name = "URL", default_value = crate::defaults::SERVER_URL)]
        url: String,
    },

    /// Ask a running server a question
    Query {
        /// The question to answer
        question: String,

        /// Server base URL
        #[arg(long, value_name = "URL", default_value = crate::defaults::SERVER_URL)]
        url: String,
    },

    /// Run answer text cleanup and casing repair (reads stdin without TEXT)
    Clean {
        /// Text to normalize
        text: Option<String>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print one value by dotted key (e.g. generation.top_k)
    Get {
        /// Dotted key path
        key: String,
    },
    /// Print the effective configuration (file + environment)
    List,
    /// Print the default configuration as a TOML template
    Dump,
    /// Print the configuration file path
    Path,
}

/// Validate a humantime duration, keeping the original text.
fn parse_timeout(s: &str) -> Result<String, String> {
    let s = s.trim();
    humantime::parse_duration(s)
        .map(|_| s.to_string())
        .map_err(|e| e.to_string())
}
