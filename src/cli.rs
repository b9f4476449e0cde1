//! CLI argument definitions using clap with subcommand architecture

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{DaemonConfig, DEFAULT_DATABASE};

/// Live classroom reaction sessions
#[derive(Parser, Debug)]
#[command(name = "classpulse")]
#[command(about = "Run the live feedback daemon or inspect its session store")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Session store path (`:memory:` for a throwaway store)
    #[arg(long, env = "CLASSPULSE_DATABASE", default_value = DEFAULT_DATABASE, global = true)]
    pub database: String,

    /// Log filter directive, e.g. `debug` or `classpulse=trace`
    #[arg(long, env = "CLASSPULSE_LOG", global = true)]
    pub log_level: Option<String>,

    /// Output format for inspection commands
    #[arg(short, long, default_value = "text", value_enum, global = true)]
    pub format: OutputFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the REST and WebSocket servers
    Serve(DaemonConfig),

    /// List an owner's sessions, newest first
    Sessions {
        /// Owner identity
        #[arg(long)]
        owner: String,
    },

    /// Show one session
    Show {
        /// Session code
        code: String,
    },

    /// Close a session
    End {
        /// Session code
        code: String,
    },

    /// Print a session's feedback, oldest first
    Feedback {
        /// Session code
        code: String,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}
