//! CLI argument parsing for the btts daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand, ValueEnum};

/// btts
///
/// Personal full-text search over messaging history.
#[derive(Parser, Debug)]
#[command(name = "btts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/btts/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the search daemon
    Serve {
        /// Override HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override database path
        #[arg(long)]
        db_path: Option<String>,
    },

    /// Manage indexed chats
    Chats {
        #[command(subcommand)]
        command: ChatCommands,
    },

    /// Manage HTTP API keys
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Search the index
    Search {
        query: String,

        /// Chat to search; repeat for several. Defaults to every watched chat
        #[arg(long = "chat", allow_negative_numbers = true)]
        chats: Vec<i64>,

        /// Comma-separated author ids
        #[arg(long)]
        users: Option<String>,

        /// Comma-separated message types (names or codes)
        #[arg(long)]
        types: Option<String>,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show storage statistics and the update cursor
    Status,
}

/// On/off switch for chat flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChatCommands {
    /// List indexed chats
    List,

    /// Register a chat and create its index
    Add {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,

        #[arg(long)]
        title: Option<String>,

        /// private, group or channel
        #[arg(long, default_value = "group")]
        chat_type: String,
    },

    /// Drop a chat and its index
    Remove {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },

    /// Start or stop following a chat
    Watch {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        state: Toggle,
    },

    /// Keep documents when messages are deleted
    NoDelete {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        state: Toggle,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeyCommands {
    /// Create a key and print it
    Create {
        name: String,

        /// Unrestricted key
        #[arg(long)]
        master: bool,

        /// Comma-separated chats a scoped key may read
        #[arg(long, allow_hyphen_values = true)]
        chats: Option<String>,
    },

    List,

    Revoke { key: String },
}
