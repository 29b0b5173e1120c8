//! Live ingestion of platform updates.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use btts_search::IndexBackend;
use btts_storage::Storage;
use btts_types::{Entities, IndexChat, Message, Peer, Update, UserInfo};

use crate::enricher::{Enricher, NoopEnricher};
use crate::error::IndexingError;
use crate::extractor::Extractor;
use crate::watched::WatchedChats;

/// Why an update left the index untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotWatched,
    NoAuthor,
    IgnoredAuthor,
    NoText,
    /// Chat has tombstones disabled
    NoDelete,
    /// Update kind the ingestor does not act on
    Unsupported,
    /// Handling failed and was logged
    Failed,
}

/// Result of handling a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed,
    Deleted(usize),
    Skipped(SkipReason),
}

/// Inline handler for updates in watched chats.
///
/// Safe to call from several tasks for distinct chats. Updates for one chat
/// must be delivered in order by the caller.
pub struct WatchIngestor {
    backend: Arc<dyn IndexBackend>,
    storage: Arc<Storage>,
    watched: Arc<WatchedChats>,
    extractor: Extractor,
    ignore_users: HashSet<i64>,
    enricher: Arc<dyn Enricher>,
}

impl WatchIngestor {
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        storage: Arc<Storage>,
        watched: Arc<WatchedChats>,
        extractor: Extractor,
    ) -> Self {
        Self {
            backend,
            storage,
            watched,
            extractor,
            ignore_users: HashSet::new(),
            enricher: Arc::new(NoopEnricher),
        }
    }

    /// Authors whose messages are never indexed.
    pub fn with_ignore_users(mut self, users: impl IntoIterator<Item = i64>) -> Self {
        self.ignore_users = users.into_iter().collect();
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    /// Handle one update. Failures are logged and reported as skipped.
    pub async fn handle_update(&self, update: &Update, entities: &Entities) -> IngestOutcome {
        match self.try_handle_update(update, entities).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Failed to ingest update");
                IngestOutcome::Skipped(SkipReason::Failed)
            }
        }
    }

    pub async fn try_handle_update(
        &self,
        update: &Update,
        entities: &Entities,
    ) -> Result<IngestOutcome, IndexingError> {
        match update {
            Update::NewMessage { message, .. } | Update::EditMessage { message, .. } => {
                self.handle_message(message, entities).await
            }
            Update::DeleteChannelMessages {
                channel_id, ids, ..
            } => self.handle_delete(*channel_id, ids).await,
            Update::DeleteMessages { ids, .. } => {
                debug!(count = ids.len(), "Ignoring account-wide delete");
                Ok(IngestOutcome::Skipped(SkipReason::Unsupported))
            }
            Update::ChannelTooLong { .. } | Update::Other { .. } => {
                Ok(IngestOutcome::Skipped(SkipReason::Unsupported))
            }
        }
    }

    /// Index a single new or edited message.
    pub async fn handle_message(
        &self,
        message: &Message,
        entities: &Entities,
    ) -> Result<IngestOutcome, IndexingError> {
        let chat_id = message.chat_id();
        let Some(mut chat) = self.watched.watched(chat_id) else {
            return Ok(IngestOutcome::Skipped(SkipReason::NotWatched));
        };

        if refresh_chat(&mut chat, message.peer, entities) {
            self.watched.upsert(chat.clone())?;
        }

        let author = self.extractor.author_of(message);
        if author == 0 {
            debug!(chat_id, id = message.id, "Dropping unattributed message");
            return Ok(IngestOutcome::Skipped(SkipReason::NoAuthor));
        }

        if let Some(info) = author_info(author, chat_id, entities) {
            self.storage.put_user_info(&info)?;
        }

        if self.ignore_users.contains(&author) {
            debug!(chat_id, user_id = author, "Ignoring message from ignored user");
            return Ok(IngestOutcome::Skipped(SkipReason::IgnoredAuthor));
        }

        let extra = if chat.no_ocr {
            None
        } else {
            self.enricher.enrich(message).await
        };
        let Some(doc) = self
            .extractor
            .extract_with(message, extra.as_deref().unwrap_or(""))
        else {
            return Ok(IngestOutcome::Skipped(SkipReason::NoText));
        };

        self.backend.add_documents(chat_id, vec![doc]).await?;
        debug!(chat_id, id = message.id, "Indexed message");
        Ok(IngestOutcome::Indexed)
    }

    /// Apply a channel tombstone unless the chat keeps deleted messages.
    pub async fn handle_delete(
        &self,
        chat_id: i64,
        ids: &[i64],
    ) -> Result<IngestOutcome, IndexingError> {
        let Some(chat) = self.watched.watched(chat_id) else {
            return Ok(IngestOutcome::Skipped(SkipReason::NotWatched));
        };
        if chat.no_delete {
            debug!(chat_id, count = ids.len(), "Keeping deleted messages");
            return Ok(IngestOutcome::Skipped(SkipReason::NoDelete));
        }

        self.backend.delete_documents(chat_id, ids).await?;
        debug!(chat_id, count = ids.len(), "Applied tombstones");
        Ok(IngestOutcome::Deleted(ids.len()))
    }
}

/// Refresh title, username and type from the entity describing the chat.
fn refresh_chat(chat: &mut IndexChat, peer: Peer, entities: &Entities) -> bool {
    match peer {
        Peer::User(id) => entities
            .user(id)
            .is_some_and(|user| chat.refresh_from_user(user)),
        Peer::Chat(id) | Peer::Channel(id) => entities
            .chat(id)
            .is_some_and(|entity| chat.refresh_from_chat(entity)),
    }
}

fn author_info(author: i64, chat_id: i64, entities: &Entities) -> Option<UserInfo> {
    if let Some(user) = entities.user(author) {
        return Some(UserInfo::from_user(user, chat_id));
    }
    entities
        .chat(author)
        .map(|entity| UserInfo::from_chat(entity, chat_id))
}
