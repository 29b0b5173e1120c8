//! btts daemon library exports.
//!
//! # Modules
//!
//! - `cli`: command-line argument parsing with clap
//! - `commands`: command implementations (serve, chats, keys, search, status)

pub mod cli;
pub mod commands;

pub use cli::{ChatCommands, Cli, Commands, KeyCommands, Toggle};
pub use commands::{
    handle_chats, handle_keys, handle_search, init_logging, load_settings, run_chat_command,
    run_key_command, run_search, serve, show_status, shutdown_signal, Components, SearchArgs,
};
