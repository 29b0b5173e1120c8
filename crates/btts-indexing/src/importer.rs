//! Bulk history import.
//!
//! Two paths feed existing history into the index:
//!
//! - [`BulkImporter::import_chat`] pages one chat's history newest to
//!   oldest and registers the chat as watched.
//! - [`BulkImporter::export_account`] opens a takeout session, lists the
//!   account's dialogs per split range and exports every dialog whose kind
//!   the [`ExportConfig`] selects.
//!
//! Both pause a random 100-200ms between pages and check cancellation at
//! every batch boundary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use btts_search::IndexBackend;
use btts_storage::Storage;
use btts_types::{
    ChatEntityKind, ChatType, Dialog, Entities, HistoryPage, IndexChat, MessageRange, Peer,
    UserInfo,
};

use crate::error::IndexingError;
use crate::extractor::Extractor;
use crate::platform::PlatformClient;
use crate::watched::WatchedChats;

/// Messages (and dialogs) requested per page.
pub const IMPORT_BATCH_SIZE: usize = 100;

/// Phase of an import, reported through [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Init,
    Dialogs,
    Export,
    Complete,
}

/// Progress report handed to the caller's callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: ImportStage,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl Progress {
    fn new(stage: ImportStage, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            current,
            total,
            message: message.into(),
        }
    }
}

/// Kind of a dialog as far as export selection goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogKind {
    User,
    Group,
    Megagroup,
    Channel,
}

/// Which dialog kinds an account export includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub users: bool,
    pub groups: bool,
    pub megagroups: bool,
    pub channels: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            users: true,
            groups: true,
            megagroups: true,
            channels: true,
        }
    }
}

impl ExportConfig {
    pub fn allows(&self, kind: DialogKind) -> bool {
        match kind {
            DialogKind::User => self.users,
            DialogKind::Group => self.groups,
            DialogKind::Megagroup => self.megagroups,
            DialogKind::Channel => self.channels,
        }
    }
}

/// Chat to import, by public username or by peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Username(String),
    Peer(Peer),
}

/// Paging and pacing of imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub pause_min: Duration,
    pub pause_max: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: IMPORT_BATCH_SIZE,
            pause_min: Duration::from_millis(100),
            pause_max: Duration::from_millis(200),
        }
    }
}

/// Result of a single-chat import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub chat_id: i64,
    /// Messages fetched
    pub processed: usize,
    /// Documents written
    pub indexed: usize,
}

/// Result of an account export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Distinct dialogs listed
    pub dialogs: usize,
    /// Chats exported, in export order
    pub chats: Vec<i64>,
    pub indexed: usize,
}

#[derive(Debug, Clone, Copy)]
enum HistorySource {
    Plain,
    InRange(MessageRange),
}

/// Imports existing history into the index.
pub struct BulkImporter {
    client: Arc<dyn PlatformClient>,
    backend: Arc<dyn IndexBackend>,
    storage: Arc<Storage>,
    watched: Arc<WatchedChats>,
    extractor: Extractor,
    config: ImportConfig,
}

impl BulkImporter {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        backend: Arc<dyn IndexBackend>,
        storage: Arc<Storage>,
        watched: Arc<WatchedChats>,
    ) -> Self {
        let extractor = Extractor::new(client.self_id());
        Self {
            client,
            backend,
            storage,
            watched,
            extractor,
            config: ImportConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Import one chat's full history and mark it watched.
    pub async fn import_chat(
        &self,
        target: ImportTarget,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<ImportSummary, IndexingError> {
        let (peer, entities) = match target {
            ImportTarget::Username(name) => {
                let resolved = self
                    .client
                    .resolve_username(name.trim_start_matches('@'))
                    .await?;
                (resolved.peer, resolved.entities)
            }
            ImportTarget::Peer(peer) => (peer, Entities::new()),
        };
        let chat = self.register_chat(peer, &entities, None).await?;
        let chat_id = chat.chat_id;
        info!(chat_id, title = %chat.title, "Importing chat history");

        on_progress(Progress::new(ImportStage::Init, 0, 0, chat.title.clone()));
        let title = chat.title.clone();
        let (processed, indexed) = self
            .index_history(peer, HistorySource::Plain, cancel, &mut |done, total| {
                on_progress(Progress::new(
                    ImportStage::Export,
                    done,
                    total.max(0) as usize,
                    title.clone(),
                ));
            })
            .await?;
        on_progress(Progress::new(
            ImportStage::Complete,
            processed,
            processed,
            title,
        ));

        info!(chat_id, processed, indexed, "Chat import complete");
        Ok(ImportSummary {
            chat_id,
            processed,
            indexed,
        })
    }

    /// Export every selected dialog of the account through a takeout session.
    ///
    /// The session is always finished, reporting whether the export
    /// succeeded.
    pub async fn export_account(
        &self,
        export: &ExportConfig,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<ExportSummary, IndexingError> {
        on_progress(Progress::new(ImportStage::Init, 0, 1, "Starting takeout session"));
        let takeout_id = self.client.init_takeout().await?;
        debug!(takeout_id, "Takeout session open");

        let result = self.export_dialogs(export, cancel, on_progress).await;
        let finished = self.client.finish_takeout(result.is_ok()).await;

        match (result, finished) {
            (Ok(summary), Ok(())) => {
                info!(
                    dialogs = summary.dialogs,
                    chats = summary.chats.len(),
                    indexed = summary.indexed,
                    "Account export complete"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), finished) => {
                if let Err(finish_err) = finished {
                    warn!(error = %finish_err, "Failed to close takeout session");
                }
                Err(e)
            }
        }
    }

    async fn export_dialogs(
        &self,
        export: &ExportConfig,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<ExportSummary, IndexingError> {
        let ranges = self.client.get_split_ranges().await?;
        let ranges = if ranges.is_empty() {
            vec![MessageRange::new(0, i64::MAX)]
        } else {
            ranges
        };

        let mut dialogs: Vec<Dialog> = Vec::new();
        let mut seen: HashSet<Peer> = HashSet::new();
        let mut entities = Entities::new();
        for (i, range) in ranges.iter().enumerate() {
            let mut offset = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(IndexingError::Cancelled);
                }
                let page = self
                    .client
                    .get_dialogs(*range, offset, self.config.batch_size)
                    .await?;
                if page.dialogs.is_empty() {
                    break;
                }
                offset += page.dialogs.len();
                let full = page.dialogs.len() >= self.config.batch_size;
                entities.extend(page.entities);
                dialogs.extend(page.dialogs.into_iter().filter(|d| seen.insert(d.peer)));
                if !full {
                    break;
                }
                self.pause(cancel).await?;
            }
            on_progress(Progress::new(
                ImportStage::Dialogs,
                i + 1,
                ranges.len(),
                format!("{} dialogs", dialogs.len()),
            ));
        }

        let mut megagroups: HashMap<i64, bool> = HashMap::new();
        let mut selected = Vec::new();
        for dialog in &dialogs {
            let kind = self
                .classify(dialog.peer, &entities, &mut megagroups)
                .await?;
            if export.allows(kind) {
                selected.push((dialog.peer, kind));
            }
        }
        debug!(
            listed = dialogs.len(),
            selected = selected.len(),
            "Dialogs selected for export"
        );

        let mut summary = ExportSummary {
            dialogs: dialogs.len(),
            ..Default::default()
        };
        for (i, (peer, kind)) in selected.iter().enumerate() {
            let chat = self.register_chat(*peer, &entities, Some(*kind)).await?;
            for range in &ranges {
                let (_, indexed) = self
                    .index_history(*peer, HistorySource::InRange(*range), cancel, &mut |_, _| {})
                    .await?;
                summary.indexed += indexed;
            }
            summary.chats.push(chat.chat_id);
            on_progress(Progress::new(
                ImportStage::Export,
                i + 1,
                selected.len(),
                chat.title,
            ));
        }

        on_progress(Progress::new(
            ImportStage::Complete,
            selected.len(),
            selected.len(),
            "Export complete",
        ));
        Ok(summary)
    }

    /// Decide a dialog's kind. Channel ids are looked up once per export.
    async fn classify(
        &self,
        peer: Peer,
        entities: &Entities,
        megagroups: &mut HashMap<i64, bool>,
    ) -> Result<DialogKind, IndexingError> {
        let channel_id = match peer {
            Peer::User(_) => return Ok(DialogKind::User),
            Peer::Chat(_) => return Ok(DialogKind::Group),
            Peer::Channel(id) => id,
        };
        let is_megagroup = match megagroups.get(&channel_id) {
            Some(cached) => *cached,
            None => {
                let resolved = match entities.chat(channel_id).map(|c| c.kind) {
                    Some(ChatEntityKind::Channel) => false,
                    Some(ChatEntityKind::Megagroup | ChatEntityKind::Group) => true,
                    None => self.client.is_megagroup(channel_id).await?,
                };
                megagroups.insert(channel_id, resolved);
                resolved
            }
        };
        Ok(if is_megagroup {
            DialogKind::Megagroup
        } else {
            DialogKind::Channel
        })
    }

    /// Create the chat's index and store it as watched, keeping the flags of
    /// an existing record.
    async fn register_chat(
        &self,
        peer: Peer,
        entities: &Entities,
        kind: Option<DialogKind>,
    ) -> Result<IndexChat, IndexingError> {
        let chat_id = peer.id();
        let default_type = match (peer, kind) {
            (Peer::User(_), _) => ChatType::Private,
            (Peer::Chat(_), _) | (_, Some(DialogKind::Megagroup)) => ChatType::Group,
            (Peer::Channel(_), _) => ChatType::Channel,
        };
        let mut chat = self
            .watched
            .get(chat_id)
            .unwrap_or_else(|| IndexChat::new(chat_id, chat_id.to_string(), default_type));
        chat.watching = true;
        match peer {
            Peer::User(id) => {
                if let Some(user) = entities.user(id) {
                    chat.refresh_from_user(user);
                }
            }
            Peer::Chat(id) | Peer::Channel(id) => {
                if let Some(entity) = entities.chat(id) {
                    chat.refresh_from_chat(entity);
                }
            }
        }

        self.backend.create_index(chat_id).await?;
        self.watched.upsert(chat.clone())?;
        Ok(chat)
    }

    /// Page a chat's history newest to oldest and index every page.
    ///
    /// Returns (messages fetched, documents written).
    async fn index_history(
        &self,
        peer: Peer,
        source: HistorySource,
        cancel: &CancellationToken,
        on_page: &mut (dyn FnMut(usize, i64) + Send),
    ) -> Result<(usize, usize), IndexingError> {
        let chat_id = peer.id();
        let batch = self.config.batch_size;
        let mut offset_id = 0;
        let mut processed = 0;
        let mut indexed = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }

            let page: HistoryPage = match source {
                HistorySource::Plain => self.client.get_history(peer, offset_id, 0, batch).await?,
                HistorySource::InRange(range) => {
                    self.client
                        .get_history_in_range(range, peer, offset_id, batch)
                        .await?
                }
            };
            if page.messages.is_empty() {
                break;
            }

            let in_scope = page.messages.iter().filter(|m| match source {
                HistorySource::Plain => true,
                HistorySource::InRange(range) => range.contains(m.id),
            });
            let docs = self.extractor.extract_all(in_scope);
            for doc in &docs {
                if let Some(user) = page.entities.user(doc.user_id) {
                    self.storage
                        .put_user_info(&UserInfo::from_user(user, chat_id))?;
                }
            }
            indexed += self.backend.add_documents(chat_id, docs).await?;
            processed += page.messages.len();
            on_page(processed, page.count);

            let oldest = page.messages.iter().map(|m| m.id).min().unwrap_or(0);
            let exhausted = page.messages.len() < batch
                || oldest <= 1
                || matches!(source, HistorySource::InRange(range) if oldest <= range.min_id);
            if exhausted {
                break;
            }
            offset_id = oldest;
            self.pause(cancel).await?;
        }

        debug!(chat_id, processed, indexed, "History paged");
        Ok((processed, indexed))
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), IndexingError> {
        let min = self.config.pause_min.as_millis() as u64;
        let max = self.config.pause_max.as_millis() as u64;
        let millis = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        if millis == 0 {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(IndexingError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(()),
        }
    }
}
