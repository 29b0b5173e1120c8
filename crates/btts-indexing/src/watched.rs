//! In-memory registry of indexed chats.
//!
//! Read-heavy and write-rare: lookups take a read lock and hand back
//! copies; every write goes to storage first, then to the map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use btts_storage::Storage;
use btts_types::IndexChat;

use crate::error::IndexingError;

/// Process-scoped set of chats, backed by the metadata store.
pub struct WatchedChats {
    storage: Arc<Storage>,
    chats: RwLock<HashMap<i64, IndexChat>>,
}

impl WatchedChats {
    /// Load every chat record from storage.
    pub fn load(storage: Arc<Storage>) -> Result<Self, IndexingError> {
        let registry = Self {
            storage,
            chats: RwLock::new(HashMap::new()),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Replace the cached set with what storage holds.
    pub fn reload(&self) -> Result<(), IndexingError> {
        let chats: HashMap<i64, IndexChat> = self
            .storage
            .list_chats()?
            .into_iter()
            .map(|c| (c.chat_id, c))
            .collect();
        let watched = chats.values().filter(|c| c.watching).count();
        *self.write() = chats;
        info!(watched, "Loaded chat registry");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, IndexChat>> {
        self.chats.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, IndexChat>> {
        self.chats.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, chat_id: i64) -> Option<IndexChat> {
        self.read().get(&chat_id).cloned()
    }

    /// The chat record, only if it is being watched.
    pub fn watched(&self, chat_id: i64) -> Option<IndexChat> {
        self.read().get(&chat_id).filter(|c| c.watching).cloned()
    }

    pub fn is_watched(&self, chat_id: i64) -> bool {
        self.read().get(&chat_id).is_some_and(|c| c.watching)
    }

    /// Every known chat, ordered by id.
    pub fn all(&self) -> Vec<IndexChat> {
        let mut chats: Vec<IndexChat> = self.read().values().cloned().collect();
        chats.sort_by_key(|c| c.chat_id);
        chats
    }

    /// Ids of watched chats, ordered.
    pub fn watched_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .read()
            .values()
            .filter(|c| c.watching)
            .map(|c| c.chat_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert or replace a chat record.
    pub fn upsert(&self, chat: IndexChat) -> Result<(), IndexingError> {
        self.storage.put_chat(&chat)?;
        debug!(chat_id = chat.chat_id, watching = chat.watching, "Updated chat registry");
        self.write().insert(chat.chat_id, chat);
        Ok(())
    }

    /// Drop a chat. Returns false if it was unknown.
    pub fn remove(&self, chat_id: i64) -> Result<bool, IndexingError> {
        let existed = self.storage.delete_chat(chat_id)?;
        self.write().remove(&chat_id);
        Ok(existed)
    }

    /// Store a channel's pts if it moved forward. Returns true if stored.
    pub fn advance_pts(&self, chat_id: i64, pts: i64) -> Result<bool, IndexingError> {
        let Some(mut chat) = self.get(chat_id) else {
            return Ok(false);
        };
        if pts <= chat.pts {
            return Ok(false);
        }
        chat.pts = pts;
        self.upsert(chat)?;
        Ok(true)
    }

    /// Store a channel's pts unconditionally. Returns false for unknown chats.
    pub fn set_pts(&self, chat_id: i64, pts: i64) -> Result<bool, IndexingError> {
        let Some(mut chat) = self.get(chat_id) else {
            return Ok(false);
        };
        chat.pts = pts;
        self.upsert(chat)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btts_types::ChatType;
    use tempfile::TempDir;

    fn registry() -> (WatchedChats, Arc<Storage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let registry = WatchedChats::load(storage.clone()).unwrap();
        (registry, storage, temp)
    }

    #[test]
    fn test_upsert_persists_and_caches() {
        let (registry, storage, _temp) = registry();
        registry
            .upsert(IndexChat::new(10, "ten", ChatType::Group))
            .unwrap();

        assert!(registry.is_watched(10));
        assert_eq!(storage.get_chat(10).unwrap().unwrap().title, "ten");
    }

    #[test]
    fn test_load_reads_storage() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let mut paused = IndexChat::new(2, "paused", ChatType::Channel);
        paused.watching = false;
        storage.put_chat(&paused).unwrap();
        storage
            .put_chat(&IndexChat::new(1, "live", ChatType::Private))
            .unwrap();

        let registry = WatchedChats::load(storage).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.watched_ids(), vec![1]);
        assert!(registry.watched(2).is_none());
        assert!(registry.get(2).is_some());
    }

    #[test]
    fn test_reader_gets_copy() {
        let (registry, _storage, _temp) = registry();
        registry
            .upsert(IndexChat::new(1, "a", ChatType::Group))
            .unwrap();
        let mut copy = registry.get(1).unwrap();
        copy.title = "changed".into();
        assert_eq!(registry.get(1).unwrap().title, "a");
    }

    #[test]
    fn test_advance_pts_is_monotonic() {
        let (registry, storage, _temp) = registry();
        registry
            .upsert(IndexChat::new(500, "chan", ChatType::Channel))
            .unwrap();

        assert!(registry.advance_pts(500, 10).unwrap());
        assert!(!registry.advance_pts(500, 5).unwrap());
        assert_eq!(storage.get_chat(500).unwrap().unwrap().pts, 10);
        assert!(!registry.advance_pts(999, 1).unwrap());
    }

    #[test]
    fn test_remove() {
        let (registry, storage, _temp) = registry();
        registry
            .upsert(IndexChat::new(1, "a", ChatType::Group))
            .unwrap();
        assert!(registry.remove(1).unwrap());
        assert!(!registry.remove(1).unwrap());
        assert!(registry.is_empty());
        assert!(storage.get_chat(1).unwrap().is_none());
    }
}
