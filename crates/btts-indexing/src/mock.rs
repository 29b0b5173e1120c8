//! Scripted platform client.
//!
//! Serves canned differences, history and dialogs from memory so the
//! reconciler and importer can run without a live connection. Used by this
//! crate's tests and by the end-to-end suite.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use btts_types::{
    ChannelDifference, Dialog, DialogsPage, Difference, Entities, HistoryPage, Message,
    MessageRange, Peer, UpdatesState,
};

use crate::platform::{PlatformClient, PlatformError, ResolvedPeer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory [`PlatformClient`].
///
/// Differences are served from a queue; once it drains the platform
/// reports it is caught up. History is served newest first.
#[derive(Default)]
pub struct ScriptedPlatform {
    self_id: i64,
    state: UpdatesState,
    differences: Mutex<VecDeque<Result<Difference, PlatformError>>>,
    difference_states: Mutex<Vec<UpdatesState>>,
    channel_differences: Mutex<HashMap<i64, VecDeque<ChannelDifference>>>,
    channel_calls: Mutex<Vec<(i64, i64)>>,
    history: HashMap<i64, Vec<Message>>,
    history_entities: Entities,
    usernames: HashMap<String, ResolvedPeer>,
    ranges: Vec<MessageRange>,
    dialogs: Vec<Dialog>,
    megagroups: HashSet<i64>,
    megagroup_calls: AtomicUsize,
    takeout_log: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn new(self_id: i64) -> Self {
        Self {
            self_id,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: UpdatesState) -> Self {
        self.state = state;
        self
    }

    pub fn push_difference(self, difference: Difference) -> Self {
        lock(&self.differences).push_back(Ok(difference));
        self
    }

    pub fn push_difference_error(self, error: PlatformError) -> Self {
        lock(&self.differences).push_back(Err(error));
        self
    }

    pub fn push_channel_difference(self, channel_id: i64, difference: ChannelDifference) -> Self {
        lock(&self.channel_differences)
            .entry(channel_id)
            .or_default()
            .push_back(difference);
        self
    }

    pub fn with_history(mut self, peer_id: i64, messages: Vec<Message>) -> Self {
        self.history.insert(peer_id, messages);
        self
    }

    /// Entities attached to every history and dialogs page.
    pub fn with_entities(mut self, entities: Entities) -> Self {
        self.history_entities = entities;
        self
    }

    pub fn with_username(mut self, name: &str, resolved: ResolvedPeer) -> Self {
        self.usernames.insert(name.to_string(), resolved);
        self
    }

    pub fn with_ranges(mut self, ranges: Vec<MessageRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_dialogs(mut self, dialogs: Vec<Dialog>) -> Self {
        self.dialogs = dialogs;
        self
    }

    pub fn with_megagroup(mut self, channel_id: i64) -> Self {
        self.megagroups.insert(channel_id);
        self
    }

    pub fn difference_calls(&self) -> usize {
        lock(&self.difference_states).len()
    }

    pub fn difference_states(&self) -> Vec<UpdatesState> {
        lock(&self.difference_states).clone()
    }

    pub fn channel_calls(&self) -> Vec<(i64, i64)> {
        lock(&self.channel_calls).clone()
    }

    pub fn megagroup_calls(&self) -> usize {
        self.megagroup_calls.load(Ordering::SeqCst)
    }

    /// Takeout calls in order: `init`, then `finish:<success>`.
    pub fn takeout_log(&self) -> Vec<String> {
        lock(&self.takeout_log).clone()
    }

    fn page(&self, peer: Peer, range: Option<MessageRange>, offset_id: i64, limit: usize) -> HistoryPage {
        let mut messages: Vec<Message> = self
            .history
            .get(&peer.id())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|m| range.map_or(true, |r| r.contains(m.id)))
            .collect();
        let count = messages.len() as i64;
        messages.sort_by_key(|m| std::cmp::Reverse(m.id));
        let messages = messages
            .into_iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit)
            .collect();
        HistoryPage {
            messages,
            entities: self.history_entities.clone(),
            count,
        }
    }
}

#[async_trait]
impl PlatformClient for ScriptedPlatform {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn resolve_username(&self, username: &str) -> Result<ResolvedPeer, PlatformError> {
        self.usernames
            .get(username)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(username.to_string()))
    }

    async fn get_history(
        &self,
        peer: Peer,
        offset_id: i64,
        _add_offset: i32,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError> {
        Ok(self.page(peer, None, offset_id, limit))
    }

    async fn get_state(&self) -> Result<UpdatesState, PlatformError> {
        Ok(self.state)
    }

    async fn get_difference(&self, state: &UpdatesState) -> Result<Difference, PlatformError> {
        lock(&self.difference_states).push(*state);
        lock(&self.differences)
            .pop_front()
            .unwrap_or(Ok(Difference::Empty {
                date: state.date,
                seq: state.seq,
            }))
    }

    async fn get_channel_difference(
        &self,
        channel_id: i64,
        pts: i64,
        _limit: usize,
    ) -> Result<ChannelDifference, PlatformError> {
        lock(&self.channel_calls).push((channel_id, pts));
        Ok(lock(&self.channel_differences)
            .get_mut(&channel_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ChannelDifference::Empty { pts }))
    }

    async fn init_takeout(&self) -> Result<i64, PlatformError> {
        lock(&self.takeout_log).push("init".into());
        Ok(1)
    }

    async fn get_split_ranges(&self) -> Result<Vec<MessageRange>, PlatformError> {
        Ok(self.ranges.clone())
    }

    async fn get_dialogs(
        &self,
        _range: MessageRange,
        offset: usize,
        limit: usize,
    ) -> Result<DialogsPage, PlatformError> {
        Ok(DialogsPage {
            dialogs: self.dialogs.iter().skip(offset).take(limit).copied().collect(),
            entities: self.history_entities.clone(),
        })
    }

    async fn get_history_in_range(
        &self,
        range: MessageRange,
        peer: Peer,
        offset_id: i64,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError> {
        Ok(self.page(peer, Some(range), offset_id, limit))
    }

    async fn finish_takeout(&self, success: bool) -> Result<(), PlatformError> {
        lock(&self.takeout_log).push(format!("finish:{}", success));
        Ok(())
    }

    async fn is_megagroup(&self, channel_id: i64) -> Result<bool, PlatformError> {
        self.megagroup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.megagroups.contains(&channel_id))
    }
}
