//! btts daemon
//!
//! Personal full-text search over messaging history.
//!
//! # Usage
//!
//! ```bash
//! btts serve [--port PORT] [--db-path PATH]
//! btts chats list|add|remove|watch|no-delete
//! btts keys create|list|revoke
//! btts search QUERY [--chat ID]...
//! btts status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/btts/config.toml)
//! 3. `--config` file
//! 4. Environment variables (BTTS_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use btts_daemon::{
    handle_chats, handle_keys, handle_search, init_logging, load_settings, serve,
    show_status, shutdown_signal, Cli, Commands, SearchArgs,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;

    if let Commands::Serve { port, db_path } = &cli.command {
        if let Some(port) = port {
            settings.http.port = *port;
        }
        if let Some(db_path) = db_path {
            settings.db_path = db_path.clone();
        }
    }
    init_logging(&settings)?;

    match cli.command {
        Commands::Serve { .. } => {
            serve(&settings, None, shutdown_signal()).await?;
        }
        Commands::Chats { command } => {
            handle_chats(&settings, command).await?;
        }
        Commands::Keys { command } => {
            handle_keys(&settings, command)?;
        }
        Commands::Search {
            query,
            chats,
            users,
            types,
            offset,
            limit,
        } => {
            handle_search(
                &settings,
                SearchArgs {
                    query,
                    chats,
                    users,
                    types,
                    offset,
                    limit,
                },
            )
            .await?;
        }
        Commands::Status => {
            show_status(&settings)?;
        }
    }

    Ok(())
}
