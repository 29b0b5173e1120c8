//! End-to-end test infrastructure for btts.
//!
//! Provides a shared [`TestHarness`] wiring storage, the embedded index,
//! the chat registry, the live ingestor and the search service over a temp
//! directory. Platform traffic is scripted with
//! [`ScriptedPlatform`](btts_indexing::ScriptedPlatform).

use std::sync::Arc;
use std::time::Duration;

use btts_indexing::{
    BulkImporter, Extractor, GapReconciler, ImportConfig, ReconcilerConfig, ScriptedPlatform,
    WatchIngestor, WatchedChats,
};
use btts_search::{EmbeddedBackend, EmbeddedConfig, IndexBackend, SearchRequest};
use btts_service::{AppState, Authenticator, ResultCache, SearchService};
use btts_storage::Storage;
use btts_types::{ChatType, IndexChat, Message, Peer};

/// Account id the harness logs in as.
pub const SELF_ID: i64 = 1000;

/// Scripted platform logged in as [`SELF_ID`].
pub fn platform() -> ScriptedPlatform {
    ScriptedPlatform::new(SELF_ID)
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub backend: Arc<dyn IndexBackend>,
    pub watched: Arc<WatchedChats>,
    pub ingestor: WatchIngestor,
    pub service: Arc<SearchService>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(
            Storage::open(&temp_dir.path().join("db")).expect("Failed to open test storage"),
        );
        let backend: Arc<dyn IndexBackend> = Arc::new(
            EmbeddedBackend::new(EmbeddedConfig::new(temp_dir.path().join("index")))
                .expect("Failed to open embedded backend"),
        );
        let watched = Arc::new(
            WatchedChats::load(storage.clone()).expect("Failed to load chat registry"),
        );
        let ingestor = WatchIngestor::new(
            backend.clone(),
            storage.clone(),
            watched.clone(),
            Extractor::new(SELF_ID),
        );
        let cache = Arc::new(ResultCache::new(Duration::from_secs(60), 100, 1 << 20));
        let service = Arc::new(SearchService::new(watched.clone(), backend.clone(), cache));

        Self {
            _temp_dir: temp_dir,
            storage,
            backend,
            watched,
            ingestor,
            service,
        }
    }

    /// Register and watch a chat, creating its index.
    pub async fn watch(&self, chat_id: i64, title: &str, chat_type: ChatType) -> IndexChat {
        let chat = IndexChat::new(chat_id, title, chat_type);
        self.backend
            .create_index(chat_id)
            .await
            .expect("Failed to create index");
        self.watched
            .upsert(chat.clone())
            .expect("Failed to register chat");
        chat
    }

    /// Flip the tombstone switch on a registered chat.
    pub fn set_no_delete(&self, chat_id: i64, no_delete: bool) {
        let mut chat = self.watched.get(chat_id).expect("chat not registered");
        chat.no_delete = no_delete;
        self.watched.upsert(chat).expect("Failed to update chat");
    }

    /// Ids of every hit for `query` in one chat, in result order.
    pub async fn search_ids(&self, chat_id: i64, query: &str) -> Vec<i64> {
        self.service
            .search(SearchRequest::chat(chat_id, query).with_page(0, 100))
            .await
            .expect("search failed")
            .hits
            .iter()
            .map(|h| h.document.id)
            .collect()
    }

    /// Reconciler over the harness state, with short pauses.
    pub fn reconciler(&self, platform: Arc<ScriptedPlatform>) -> GapReconciler {
        GapReconciler::new(
            platform,
            self.backend.clone(),
            self.storage.clone(),
            self.watched.clone(),
            ReconcilerConfig {
                slice_pause: Duration::from_millis(1),
                call_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
    }

    /// Importer over the harness state, with small pages and short pauses.
    pub fn importer(&self, platform: Arc<ScriptedPlatform>, batch_size: usize) -> BulkImporter {
        BulkImporter::new(
            platform,
            self.backend.clone(),
            self.storage.clone(),
            self.watched.clone(),
        )
        .with_config(ImportConfig {
            batch_size,
            pause_min: Duration::from_millis(1),
            pause_max: Duration::from_millis(2),
        })
    }

    /// HTTP state authenticating against the harness key store.
    pub fn app_state(&self, master_key: &str) -> AppState {
        AppState::new(
            self.service.clone(),
            Arc::new(Authenticator::new(
                self.storage.clone(),
                Some(master_key.to_string()),
            )),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Text message from `from` in a group or channel.
pub fn group_message(id: i64, peer: Peer, from: i64, date: i64, text: &str) -> Message {
    Message::text(id, peer, date, text).with_from(Peer::User(from))
}
