//! Gap reconciliation after disconnects.
//!
//! The platform publishes an account-wide cursor `{pts, qts, date, seq}` and
//! a per-channel `pts`. On startup (and periodically afterwards) the
//! reconciler replays `getDifference` from the stored cursor until the
//! platform reports it is caught up. Channels that fall too far behind are
//! replayed separately with `getChannelDifference` in bounded background
//! tasks.
//!
//! The cursor is persisted only after a page has been applied. A crash in
//! between replays the page on the next start, which is harmless because
//! document writes are upserts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use btts_search::IndexBackend;
use btts_storage::Storage;
use btts_types::{
    ChannelDifference, Difference, Document, Entities, Message, ReconcileSettings, Update,
    UpdatesState, UserInfo,
};

use crate::error::IndexingError;
use crate::extractor::Extractor;
use crate::platform::{PlatformClient, PlatformError};
use crate::watched::WatchedChats;

/// Page size for channel differences.
pub const CHANNEL_DIFFERENCE_LIMIT: usize = 100;

/// Pause between difference slices.
pub const SLICE_PAUSE: Duration = Duration::from_millis(500);

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Deadline for one iteration (fetch plus apply)
    pub call_timeout: Duration,
    pub slice_pause: Duration,
    pub channel_limit: usize,
    pub max_concurrent_channel_syncs: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            slice_pause: SLICE_PAUSE,
            channel_limit: CHANNEL_DIFFERENCE_LIMIT,
            max_concurrent_channel_syncs: 4,
        }
    }
}

impl From<&ReconcileSettings> for ReconcilerConfig {
    fn from(settings: &ReconcileSettings) -> Self {
        Self {
            call_timeout: Duration::from_secs(settings.timeout_secs),
            max_concurrent_channel_syncs: settings.max_concurrent_channel_syncs.max(1),
            ..Default::default()
        }
    }
}

/// What a reconciliation run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// No cursor was stored; the current state was fetched instead
    pub initialized: bool,
    /// Difference pages applied
    pub pages: usize,
    pub indexed: usize,
    pub deleted: usize,
    /// Cursor after the run
    pub state: UpdatesState,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchStats {
    indexed: usize,
    deleted: usize,
}

enum Step {
    Done(UpdatesState, BatchStats),
    Continue(UpdatesState, BatchStats),
    TooLong(i64),
}

struct Inner {
    client: Arc<dyn PlatformClient>,
    backend: Arc<dyn IndexBackend>,
    storage: Arc<Storage>,
    watched: Arc<WatchedChats>,
    extractor: Extractor,
    config: ReconcilerConfig,
    /// One difference loop at a time
    run_lock: tokio::sync::Mutex<()>,
    /// Guards read-modify-write of the stored cursor
    state_lock: Mutex<()>,
    channel_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    pending_resyncs: Mutex<HashSet<i64>>,
    resync_slots: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Replays missed updates into the index.
#[derive(Clone)]
pub struct GapReconciler {
    inner: Arc<Inner>,
}

impl GapReconciler {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        backend: Arc<dyn IndexBackend>,
        storage: Arc<Storage>,
        watched: Arc<WatchedChats>,
        config: ReconcilerConfig,
    ) -> Self {
        let extractor = Extractor::new(client.self_id());
        let slots = config.max_concurrent_channel_syncs.max(1);
        Self {
            inner: Arc::new(Inner {
                client,
                backend,
                storage,
                watched,
                extractor,
                config,
                run_lock: tokio::sync::Mutex::new(()),
                state_lock: Mutex::new(()),
                channel_locks: Mutex::new(HashMap::new()),
                pending_resyncs: Mutex::new(HashSet::new()),
                resync_slots: Arc::new(Semaphore::new(slots)),
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Token cancelling background channel resyncs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Cancel background resyncs and wait for them to stop.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.wait_for_resyncs().await;
    }

    /// Wait until every queued channel resync has finished.
    pub async fn wait_for_resyncs(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Stored cursor.
    pub fn state(&self) -> Result<UpdatesState, IndexingError> {
        Ok(self.inner.storage.get_updates_state()?)
    }

    fn persist_state(&self, state: &UpdatesState) -> Result<(), IndexingError> {
        let _guard = lock(&self.inner.state_lock);
        self.inner.storage.put_updates_state(state)?;
        debug!(pts = state.pts, date = state.date, "Persisted update state");
        Ok(())
    }

    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T, IndexingError>
    where
        F: Future<Output = Result<T, PlatformError>>,
    {
        match tokio::time::timeout(self.inner.config.call_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(IndexingError::Timeout(what.to_string())),
        }
    }

    /// Track a live update: advance the cursor it belongs to and react to
    /// channel gaps. Must be called within a Tokio runtime.
    pub fn observe(&self, update: &Update) -> Result<(), IndexingError> {
        if let Update::ChannelTooLong { channel_id, .. } = update {
            self.spawn_channel_resync(*channel_id);
        }

        let Some(pts) = update.pts() else {
            return Ok(());
        };
        match update.channel_id() {
            Some(channel_id) => {
                self.inner.watched.advance_pts(channel_id, pts)?;
            }
            None => {
                let _guard = lock(&self.inner.state_lock);
                let mut state = self.inner.storage.get_updates_state()?;
                if state.advance_pts(pts) {
                    self.inner.storage.put_updates_state(&state)?;
                }
            }
        }
        Ok(())
    }

    /// Replay `getDifference` from the stored cursor until caught up.
    ///
    /// A missing cursor is initialized from `getState` without replaying.
    /// An iteration that fails or times out leaves the cursor where it was.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<ReconcileReport, IndexingError> {
        let _running = self.inner.run_lock.lock().await;
        let mut report = ReconcileReport::default();

        let mut state = self.inner.storage.get_updates_state()?;
        if state.is_zero() {
            state = self
                .timed("getState", self.inner.client.get_state())
                .await?;
            self.persist_state(&state)?;
            info!(pts = state.pts, "Initialized update state");
            report.initialized = true;
            report.state = state;
            return Ok(report);
        }

        loop {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }

            let step = tokio::time::timeout(self.inner.config.call_timeout, self.step(&state))
                .await
                .map_err(|_| IndexingError::Timeout("getDifference iteration".to_string()))??;

            match step {
                Step::Done(next, stats) => {
                    state = next;
                    self.persist_state(&state)?;
                    report.add(stats);
                    report.state = state;
                    info!(
                        pts = state.pts,
                        pages = report.pages,
                        indexed = report.indexed,
                        "Update state reconciled"
                    );
                    return Ok(report);
                }
                Step::Continue(next, stats) => {
                    state = next;
                    self.persist_state(&state)?;
                    report.add(stats);
                    report.state = state;
                    debug!(pts = state.pts, "Applied difference slice");
                }
                Step::TooLong(pts) => {
                    state.pts = pts;
                    self.persist_state(&state)?;
                    warn!(pts, "Difference too long, full resync required");
                    return Err(IndexingError::ResyncRequired { pts });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(IndexingError::Cancelled),
                _ = tokio::time::sleep(self.inner.config.slice_pause) => {}
            }
        }
    }

    async fn step(&self, state: &UpdatesState) -> Result<Step, IndexingError> {
        let difference = self.inner.client.get_difference(state).await?;
        Ok(match difference {
            Difference::Empty { date, seq } => {
                let mut next = *state;
                next.date = date;
                next.seq = seq;
                Step::Done(next, BatchStats::default())
            }
            Difference::Difference {
                new_messages,
                other_updates,
                entities,
                new_state,
            } => {
                let stats = self
                    .process_difference(&new_messages, &other_updates, &entities)
                    .await?;
                Step::Done(new_state, stats)
            }
            Difference::Slice {
                new_messages,
                other_updates,
                entities,
                intermediate_state,
            } => {
                let stats = self
                    .process_difference(&new_messages, &other_updates, &entities)
                    .await?;
                debug!(pts = intermediate_state.pts, "Received difference slice");
                Step::Continue(intermediate_state, stats)
            }
            Difference::TooLong { pts } => Step::TooLong(pts),
        })
    }

    /// Apply one difference page: index messages of watched chats grouped
    /// by chat, then tombstones, then queue channel resyncs.
    async fn process_difference(
        &self,
        messages: &[Message],
        updates: &[Update],
        entities: &Entities,
    ) -> Result<BatchStats, IndexingError> {
        let inner = &self.inner;
        let mut stats = BatchStats::default();

        let mut groups: BTreeMap<i64, Vec<Document>> = BTreeMap::new();
        for message in messages.iter().chain(updates.iter().filter_map(Update::message)) {
            let chat_id = message.chat_id();
            if !inner.watched.is_watched(chat_id) {
                continue;
            }
            if let Some(doc) = inner.extractor.extract(message) {
                if let Some(user) = entities.user(doc.user_id) {
                    inner
                        .storage
                        .put_user_info(&UserInfo::from_user(user, chat_id))?;
                }
                groups.entry(chat_id).or_default().push(doc);
            }
        }
        for (chat_id, docs) in groups {
            stats.indexed += inner.backend.add_documents(chat_id, docs).await?;
        }

        for update in updates {
            match update {
                Update::DeleteChannelMessages {
                    channel_id, ids, ..
                } => {
                    let Some(chat) = inner.watched.watched(*channel_id) else {
                        continue;
                    };
                    if chat.no_delete {
                        debug!(chat_id = channel_id, "Keeping deleted messages");
                        continue;
                    }
                    inner.backend.delete_documents(*channel_id, ids).await?;
                    stats.deleted += ids.len();
                }
                Update::ChannelTooLong { channel_id, .. } => {
                    self.spawn_channel_resync(*channel_id);
                }
                _ => {}
            }
        }

        Ok(stats)
    }

    fn channel_lock(&self, channel_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.inner.channel_locks)
            .entry(channel_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Queue a background channel resync.
    ///
    /// Returns None when the channel is not watched or a resync for it is
    /// already queued. Concurrency across channels is bounded by
    /// `max_concurrent_channel_syncs`.
    pub fn spawn_channel_resync(&self, channel_id: i64) -> Option<JoinHandle<()>> {
        if !self.inner.watched.is_watched(channel_id) {
            debug!(chat_id = channel_id, "Skipping resync of unwatched channel");
            return None;
        }
        if !lock(&self.inner.pending_resyncs).insert(channel_id) {
            debug!(chat_id = channel_id, "Channel resync already queued");
            return None;
        }

        let this = self.clone();
        Some(self.inner.tasks.spawn(async move {
            let cancel = this.inner.cancel.clone();
            let result = match this.inner.resync_slots.clone().acquire_owned().await {
                Ok(_permit) => this.resync_channel(channel_id, &cancel).await,
                Err(_) => Err(IndexingError::Cancelled),
            };
            lock(&this.inner.pending_resyncs).remove(&channel_id);

            match result {
                Ok(indexed) => info!(chat_id = channel_id, indexed, "Channel resynced"),
                Err(IndexingError::Cancelled) => debug!(chat_id = channel_id, "Channel resync cancelled"),
                Err(e) => warn!(chat_id = channel_id, error = %e, "Channel resync failed"),
            }
        }))
    }

    /// Replay `getChannelDifference` for one channel until final.
    ///
    /// Returns the number of documents indexed. The channel's pts is stored
    /// after every page.
    pub async fn resync_channel(
        &self,
        channel_id: i64,
        cancel: &CancellationToken,
    ) -> Result<usize, IndexingError> {
        let channel_lock = self.channel_lock(channel_id);
        let _guard = channel_lock.lock().await;

        let inner = &self.inner;
        let Some(chat) = inner.watched.watched(channel_id) else {
            return Ok(0);
        };
        let mut pts = chat.pts;
        let mut indexed = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }

            let difference = self
                .timed(
                    "getChannelDifference",
                    inner
                        .client
                        .get_channel_difference(channel_id, pts, inner.config.channel_limit),
                )
                .await?;

            match difference {
                ChannelDifference::Empty { pts: latest } => {
                    inner.watched.advance_pts(channel_id, latest)?;
                    break;
                }
                ChannelDifference::Difference {
                    pts: latest,
                    new_messages,
                    other_updates,
                    entities,
                    is_final,
                } => {
                    let stats = self
                        .process_difference(&new_messages, &other_updates, &entities)
                        .await?;
                    indexed += stats.indexed;
                    inner.watched.advance_pts(channel_id, latest)?;
                    pts = latest;
                    debug!(chat_id = channel_id, pts, "Applied channel difference page");
                    if is_final {
                        break;
                    }
                }
                ChannelDifference::TooLong {
                    pts: latest,
                    messages,
                    entities,
                } => {
                    let stats = self.process_difference(&messages, &[], &entities).await?;
                    indexed += stats.indexed;
                    inner.watched.advance_pts(channel_id, latest)?;
                    break;
                }
            }
        }

        Ok(indexed)
    }

    /// Re-run [`reconcile`](Self::reconcile) every `interval` until cancelled.
    ///
    /// Failures are logged and retried on the next tick.
    pub async fn run_periodic(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup has just reconciled.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Periodic reconciler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.reconcile(&cancel).await {
                Ok(report) => debug!(pages = report.pages, indexed = report.indexed, "Periodic reconcile done"),
                Err(IndexingError::Cancelled) => return,
                Err(e) => warn!(error = %e, "Periodic reconcile failed, retrying next tick"),
            }
        }
    }
}

impl ReconcileReport {
    fn add(&mut self, stats: BatchStats) {
        self.pages += 1;
        self.indexed += stats.indexed;
        self.deleted += stats.deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedPlatform;
    use btts_search::{EmbeddedBackend, EmbeddedConfig, SearchRequest};
    use btts_types::{ChatType, IndexChat, Peer};
    use tempfile::TempDir;

    struct Fixture {
        reconciler: GapReconciler,
        platform: Arc<ScriptedPlatform>,
        backend: Arc<EmbeddedBackend>,
        storage: Arc<Storage>,
        watched: Arc<WatchedChats>,
        _temp: TempDir,
    }

    fn fixture(platform: ScriptedPlatform) -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(&temp.path().join("db")).unwrap());
        let backend =
            Arc::new(EmbeddedBackend::new(EmbeddedConfig::new(temp.path().join("idx"))).unwrap());
        let watched = Arc::new(WatchedChats::load(storage.clone()).unwrap());
        let platform = Arc::new(platform);
        let config = ReconcilerConfig {
            slice_pause: Duration::from_millis(1),
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let reconciler = GapReconciler::new(
            platform.clone(),
            backend.clone(),
            storage.clone(),
            watched.clone(),
            config,
        );
        Fixture {
            reconciler,
            platform,
            backend,
            storage,
            watched,
            _temp: temp,
        }
    }

    fn msg(id: i64, chat: i64, text: &str) -> Message {
        Message::text(id, Peer::User(chat), id, text)
    }

    async fn ids(backend: &EmbeddedBackend, chat_id: i64) -> Vec<i64> {
        backend
            .search(&SearchRequest::chat(chat_id, ""))
            .await
            .unwrap()
            .hits
            .iter()
            .map(|h| h.document.id)
            .collect()
    }

    #[tokio::test]
    async fn test_zero_state_fetches_current() {
        let platform = ScriptedPlatform::new(1000).with_state(UpdatesState::new(50, 1, 900, 3));
        let f = fixture(platform);

        let report = f.reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert!(report.initialized);
        assert_eq!(f.storage.get_updates_state().unwrap().pts, 50);
        assert_eq!(f.platform.difference_calls(), 0);
    }

    #[tokio::test]
    async fn test_slice_then_difference() {
        let platform = ScriptedPlatform::new(1000)
            .push_difference(Difference::Slice {
                new_messages: vec![msg(1, 7, "alpha"), msg(2, 7, "beta")],
                other_updates: vec![],
                entities: Entities::new(),
                intermediate_state: UpdatesState::new(10, 0, 100, 1),
            })
            .push_difference(Difference::Difference {
                new_messages: vec![msg(3, 7, "gamma")],
                other_updates: vec![],
                entities: Entities::new(),
                new_state: UpdatesState::new(12, 0, 200, 2),
            });
        let f = fixture(platform);
        f.storage
            .put_updates_state(&UpdatesState::new(5, 0, 50, 1))
            .unwrap();
        f.watched
            .upsert(IndexChat::new(7, "seven", ChatType::Private))
            .unwrap();

        let report = f.reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.indexed, 3);
        assert_eq!(f.storage.get_updates_state().unwrap().pts, 12);
        assert_eq!(ids(&f.backend, 7).await, vec![3, 2, 1]);
        // The second call resumes from the slice's intermediate state.
        assert_eq!(f.platform.difference_states()[1].pts, 10);
    }

    #[tokio::test]
    async fn test_empty_updates_date_only() {
        let platform = ScriptedPlatform::new(1000).push_difference(Difference::Empty {
            date: 1000,
            seq: 4,
        });
        let f = fixture(platform);
        f.storage
            .put_updates_state(&UpdatesState::new(12, 0, 200, 2))
            .unwrap();

        let report = f.reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.indexed, 0);
        assert_eq!(
            f.storage.get_updates_state().unwrap(),
            UpdatesState::new(12, 0, 1000, 4)
        );
    }

    #[tokio::test]
    async fn test_too_long_requires_resync() {
        let platform =
            ScriptedPlatform::new(1000).push_difference(Difference::TooLong { pts: 400 });
        let f = fixture(platform);
        f.storage
            .put_updates_state(&UpdatesState::new(12, 0, 200, 2))
            .unwrap();

        let err = f
            .reconciler
            .reconcile(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexingError::ResyncRequired { pts: 400 }));
        assert_eq!(f.storage.get_updates_state().unwrap().pts, 400);
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor() {
        let platform = ScriptedPlatform::new(1000)
            .push_difference_error(PlatformError::Network("reset".into()));
        let f = fixture(platform);
        let before = UpdatesState::new(12, 0, 200, 2);
        f.storage.put_updates_state(&before).unwrap();

        assert!(f.reconciler.reconcile(&CancellationToken::new()).await.is_err());
        assert_eq!(f.storage.get_updates_state().unwrap(), before);
    }

    #[tokio::test]
    async fn test_unwatched_and_tombstones() {
        let platform = ScriptedPlatform::new(1000).push_difference(Difference::Difference {
            new_messages: vec![
                Message::text(1, Peer::Channel(500), 1, "keep").as_post(),
                Message::text(2, Peer::Channel(500), 2, "drop").as_post(),
                msg(3, 9, "unwatched"),
            ],
            other_updates: vec![Update::DeleteChannelMessages {
                channel_id: 500,
                ids: vec![2],
                pts: Some(3),
            }],
            entities: Entities::new(),
            new_state: UpdatesState::new(20, 0, 300, 3),
        });
        let f = fixture(platform);
        f.storage
            .put_updates_state(&UpdatesState::new(12, 0, 200, 2))
            .unwrap();
        f.watched
            .upsert(IndexChat::new(500, "chan", ChatType::Channel))
            .unwrap();

        let report = f.reconciler.reconcile(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(ids(&f.backend, 500).await, vec![1]);
        assert!(ids(&f.backend, 9).await.is_empty());
    }

    #[tokio::test]
    async fn test_observe_advances_pts() {
        let f = fixture(ScriptedPlatform::new(1000));
        f.storage
            .put_updates_state(&UpdatesState::new(10, 0, 1, 1))
            .unwrap();
        f.watched
            .upsert(IndexChat::new(500, "chan", ChatType::Channel))
            .unwrap();

        let private = Update::NewMessage {
            message: msg(1, 7, "x"),
            pts: Some(15),
        };
        f.reconciler.observe(&private).unwrap();
        f.reconciler
            .observe(&Update::Other { pts: Some(11) })
            .unwrap();
        assert_eq!(f.storage.get_updates_state().unwrap().pts, 15);

        let channel = Update::DeleteChannelMessages {
            channel_id: 500,
            ids: vec![1],
            pts: Some(77),
        };
        f.reconciler.observe(&channel).unwrap();
        assert_eq!(f.watched.get(500).unwrap().pts, 77);
        assert_eq!(f.storage.get_updates_state().unwrap().pts, 15);
    }

    #[tokio::test]
    async fn test_channel_resync_pages_until_final() {
        let platform = ScriptedPlatform::new(1000)
            .push_channel_difference(
                500,
                ChannelDifference::Difference {
                    pts: 30,
                    new_messages: vec![Message::text(1, Peer::Channel(500), 1, "one").as_post()],
                    other_updates: vec![],
                    entities: Entities::new(),
                    is_final: false,
                },
            )
            .push_channel_difference(
                500,
                ChannelDifference::Difference {
                    pts: 40,
                    new_messages: vec![Message::text(2, Peer::Channel(500), 2, "two").as_post()],
                    other_updates: vec![],
                    entities: Entities::new(),
                    is_final: true,
                },
            );
        let f = fixture(platform);
        let mut chat = IndexChat::new(500, "chan", ChatType::Channel);
        chat.pts = 20;
        f.watched.upsert(chat).unwrap();

        let indexed = f
            .reconciler
            .resync_channel(500, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(indexed, 2);
        assert_eq!(f.watched.get(500).unwrap().pts, 40);
        assert_eq!(f.platform.channel_calls(), vec![(500, 20), (500, 30)]);
    }

    #[tokio::test]
    async fn test_channel_too_long_spawns_once() {
        let platform = ScriptedPlatform::new(1000).push_channel_difference(
            500,
            ChannelDifference::Empty { pts: 90 },
        );
        let f = fixture(platform);
        f.watched
            .upsert(IndexChat::new(500, "chan", ChatType::Channel))
            .unwrap();

        let update = Update::ChannelTooLong {
            channel_id: 500,
            pts: None,
        };
        f.reconciler.observe(&update).unwrap();
        f.reconciler.observe(&update).unwrap();
        f.reconciler.wait_for_resyncs().await;

        assert_eq!(f.platform.channel_calls().len(), 1);
        assert_eq!(f.watched.get(500).unwrap().pts, 90);
        assert!(f.reconciler.spawn_channel_resync(999).is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let platform = ScriptedPlatform::new(1000).push_difference(Difference::Empty {
            date: 1,
            seq: 1,
        });
        let f = fixture(platform);
        f.storage
            .put_updates_state(&UpdatesState::new(1, 0, 0, 0))
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = f.reconciler.reconcile(&cancel).await.unwrap_err();
        assert!(matches!(err, IndexingError::Cancelled));
    }
}
