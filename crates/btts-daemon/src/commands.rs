//! Command implementations for the btts daemon.
//!
//! Handles:
//! - serve: open storage and the index, reconcile, serve HTTP until signalled
//! - chats / keys: metadata administration
//! - search: one-shot query from the terminal
//! - status: storage statistics and the update cursor

use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use btts_indexing::{GapReconciler, IndexingError, PlatformClient, ReconcilerConfig, WatchedChats};
use btts_search::{backend_from_settings, IndexBackend, SearchRequest, SearchResponse};
use btts_service::{
    run_server_with_shutdown, AppState, Authenticator, ResultCache, SearchService,
};
use btts_storage::Storage;
use btts_types::{ApiKey, ChatType, IndexChat, LogFormat, MessageType, SearchFilter, Settings};

use crate::cli::{ChatCommands, KeyCommands};

/// Length of generated API keys.
const API_KEY_LEN: usize = 32;

/// How often expired cache entries are purged while serving.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Load settings and apply the global CLI overrides.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match settings.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Storage, index and chat registry opened from settings.
pub struct Components {
    pub storage: Arc<Storage>,
    pub backend: Arc<dyn IndexBackend>,
    pub watched: Arc<WatchedChats>,
}

impl Components {
    pub fn open(settings: &Settings) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        info!(path = %db_path.display(), "Opening storage");
        let storage = Arc::new(Storage::open(&db_path).context("Failed to open storage")?);
        let backend = backend_from_settings(settings).context("Failed to open index backend")?;
        let watched =
            Arc::new(WatchedChats::load(storage.clone()).context("Failed to load chat registry")?);
        Ok(Self {
            storage,
            backend,
            watched,
        })
    }

    fn search_service(&self, settings: &Settings) -> SearchService {
        SearchService::new(
            self.watched.clone(),
            self.backend.clone(),
            Arc::new(ResultCache::from_settings(&settings.cache)),
        )
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run the daemon until `shutdown` resolves.
///
/// With a platform client the stored update cursor is reconciled first and
/// a periodic reconciler runs beside the HTTP server. Without one only the
/// search surface is served.
pub async fn serve<F>(
    settings: &Settings,
    client: Option<Arc<dyn PlatformClient>>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let components = Components::open(settings)?;
    let addr: SocketAddr = settings
        .http_addr()
        .parse()
        .context("Invalid HTTP address")?;
    info!(
        db_path = %settings.db_path,
        http = %addr,
        backend = components.backend.name(),
        chats = components.watched.len(),
        "btts starting"
    );

    let cancel = CancellationToken::new();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    let reconciler = match client {
        Some(client) => {
            let reconciler = GapReconciler::new(
                client,
                components.backend.clone(),
                components.storage.clone(),
                components.watched.clone(),
                ReconcilerConfig::from(&settings.reconcile),
            );
            match reconciler.reconcile(&cancel).await {
                Ok(report) => info!(
                    pages = report.pages,
                    indexed = report.indexed,
                    deleted = report.deleted,
                    pts = report.state.pts,
                    "Startup reconciliation done"
                ),
                Err(IndexingError::ResyncRequired { pts }) => warn!(
                    pts,
                    "Update gap too long, re-import watched chats to close it"
                ),
                Err(e) => warn!(error = %e, "Startup reconciliation failed, will retry periodically"),
            }
            let periodic = reconciler.clone();
            let token = cancel.clone();
            let interval = Duration::from_secs(settings.reconcile.interval_secs.max(1));
            background.push(tokio::spawn(async move {
                periodic.run_periodic(interval, token).await;
            }));
            Some(reconciler)
        }
        None => {
            warn!("No platform client linked, serving search only");
            None
        }
    };

    let service = Arc::new(components.search_service(settings));
    {
        let cache = service.cache().clone();
        let token = cancel.clone();
        background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }
        }));
    }

    let auth = Arc::new(Authenticator::new(
        components.storage.clone(),
        settings.http.master_key.clone(),
    ));
    let result = run_server_with_shutdown(addr, AppState::new(service, auth), shutdown).await;

    cancel.cancel();
    if let Some(reconciler) = reconciler {
        reconciler.shutdown().await;
    }
    for handle in background {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    components
        .backend
        .close()
        .await
        .context("Failed to close index backend")?;

    result.context("HTTP server error")?;
    info!("btts stopped");
    Ok(())
}

fn parse_list<T: std::str::FromStr>(what: &str, raw: Option<&str>) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {} {:?}: {}", what, s, e))
        })
        .collect()
}

/// Apply a chat administration command. Returns the lines to print.
pub async fn run_chat_command(
    components: &Components,
    command: ChatCommands,
) -> Result<Vec<String>> {
    let watched = &components.watched;
    match command {
        ChatCommands::List => {
            let chats = watched.all();
            if chats.is_empty() {
                return Ok(vec!["No chats indexed".to_string()]);
            }
            Ok(chats
                .iter()
                .map(|c| {
                    format!(
                        "{:>16}  {:<8} watching={:<5} no_delete={:<5} pts={:<8} {}",
                        c.chat_id,
                        c.chat_type.as_str(),
                        c.watching,
                        c.no_delete,
                        c.pts,
                        c.title
                    )
                })
                .collect())
        }
        ChatCommands::Add {
            chat_id,
            title,
            chat_type,
        } => {
            let chat_type: ChatType = chat_type.parse().map_err(anyhow::Error::msg)?;
            let title = title.unwrap_or_else(|| chat_id.to_string());
            components
                .backend
                .create_index(chat_id)
                .await
                .context("Failed to create index")?;
            watched.upsert(IndexChat::new(chat_id, title.clone(), chat_type))?;
            Ok(vec![format!("Added chat {} ({})", chat_id, title)])
        }
        ChatCommands::Remove { chat_id } => {
            components
                .backend
                .delete_index(chat_id)
                .await
                .context("Failed to delete index")?;
            if !watched.remove(chat_id)? {
                bail!("Chat {} is not indexed", chat_id);
            }
            Ok(vec![format!("Removed chat {}", chat_id)])
        }
        ChatCommands::Watch { chat_id, state } => {
            let mut chat = watched
                .get(chat_id)
                .with_context(|| format!("Chat {} is not indexed", chat_id))?;
            chat.watching = state.enabled();
            watched.upsert(chat)?;
            Ok(vec![format!("Chat {} watching={}", chat_id, state.enabled())])
        }
        ChatCommands::NoDelete { chat_id, state } => {
            let mut chat = watched
                .get(chat_id)
                .with_context(|| format!("Chat {} is not indexed", chat_id))?;
            chat.no_delete = state.enabled();
            watched.upsert(chat)?;
            Ok(vec![format!("Chat {} no_delete={}", chat_id, state.enabled())])
        }
    }
}

fn generate_key() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Apply an API key command. Returns the lines to print.
pub fn run_key_command(storage: &Storage, command: KeyCommands) -> Result<Vec<String>> {
    match command {
        KeyCommands::Create {
            name,
            master,
            chats,
        } => {
            let chats: Vec<i64> = parse_list("chat id", chats.as_deref())?;
            if !master && chats.is_empty() {
                bail!("A scoped key needs --chats (or pass --master)");
            }
            let key = generate_key();
            let api_key = if master {
                ApiKey::master(key.clone(), name)
            } else {
                ApiKey::scoped(key.clone(), name, chats)
            };
            storage.put_api_key(&api_key)?;
            Ok(vec![key])
        }
        KeyCommands::List => {
            let keys = storage.list_api_keys()?;
            if keys.is_empty() {
                return Ok(vec!["No API keys".to_string()]);
            }
            Ok(keys
                .iter()
                .map(|k| {
                    let scope = if k.master {
                        "master".to_string()
                    } else {
                        format!("chats={:?}", k.chats)
                    };
                    format!("{}  {:<16} {}", k.key, k.name, scope)
                })
                .collect())
        }
        KeyCommands::Revoke { key } => {
            if !storage.delete_api_key(&key)? {
                bail!("Unknown API key");
            }
            Ok(vec!["Key revoked".to_string()])
        }
    }
}

/// Parameters of the `search` command.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub query: String,
    pub chats: Vec<i64>,
    pub users: Option<String>,
    pub types: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

/// Run a one-shot search. No chats means every watched chat.
pub async fn run_search(service: &SearchService, args: SearchArgs) -> Result<SearchResponse> {
    let users: Vec<i64> = parse_list("user id", args.users.as_deref())?;
    let types: Vec<MessageType> = parse_list("message type", args.types.as_deref())?;

    let response = match args.chats.as_slice() {
        [] => {
            let filter = SearchFilter::new().with_users(users).with_types(types);
            service
                .search_all_watched(&args.query, &filter, args.offset, args.limit)
                .await?
        }
        [chat_id] => {
            service
                .search(
                    SearchRequest::chat(*chat_id, args.query)
                        .with_users(users)
                        .with_types(types)
                        .with_page(args.offset, args.limit),
                )
                .await?
        }
        chats => {
            service
                .search(
                    SearchRequest::chats(chats.to_vec(), args.query)
                        .with_users(users)
                        .with_types(types)
                        .with_page(args.offset, args.limit),
                )
                .await?
        }
    };
    Ok(response)
}

pub async fn handle_chats(settings: &Settings, command: ChatCommands) -> Result<()> {
    let components = Components::open(settings)?;
    for line in run_chat_command(&components, command).await? {
        println!("{}", line);
    }
    components.backend.close().await?;
    Ok(())
}

pub fn handle_keys(settings: &Settings, command: KeyCommands) -> Result<()> {
    let storage = Storage::open(&settings.expanded_db_path()).context("Failed to open storage")?;
    for line in run_key_command(&storage, command)? {
        println!("{}", line);
    }
    Ok(())
}

pub async fn handle_search(settings: &Settings, args: SearchArgs) -> Result<()> {
    let components = Components::open(settings)?;
    let service = components.search_service(settings);
    let response = run_search(&service, args).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    components.backend.close().await?;
    Ok(())
}

/// Show storage statistics and the update cursor.
pub fn show_status(settings: &Settings) -> Result<()> {
    let storage = Storage::open(&settings.expanded_db_path()).context("Failed to open storage")?;
    let stats = storage.get_stats()?;
    let state = storage.get_updates_state()?;

    println!("Database: {}", settings.expanded_db_path().display());
    println!("Index root: {}", settings.expanded_index_root().display());
    println!("Engine: {:?}", settings.engine.kind);
    println!(
        "Chats: {} ({} watched)",
        stats.chat_count, stats.watched_count
    );
    println!("Users: {}", stats.user_count);
    println!("API keys: {}", stats.api_key_count);
    println!("Disk usage: {} bytes", stats.disk_usage_bytes);
    if state.is_zero() {
        println!("Update cursor: not initialized");
    } else {
        println!(
            "Update cursor: pts={} qts={} date={} seq={}",
            state.pts, state.qts, state.date, state.seq
        );
    }
    Ok(())
}
