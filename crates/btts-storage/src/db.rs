//! RocksDB wrapper for btts metadata.
//!
//! Provides:
//! - Database open with column family setup
//! - Chat records (watch flags, per-channel pts)
//! - Author profiles, sub-bots and API keys with a reverse ACL index
//! - The updates state singleton

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use btts_types::{ApiKey, IndexChat, SubBot, UpdatesState, UserInfo};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_API_KEY, CF_API_KEY_CHATS, CF_INDEX_CHAT, CF_SUB_BOT,
    CF_UPDATES_STATE, CF_USER_INFO,
};
use crate::error::StorageError;
use crate::keys::{chat_grant_key, id_key, parse_chat_grant_key, UPDATES_STATE_KEY};

/// Main storage interface for btts metadata
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            results.push(serde_json::from_slice(&value)?);
        }
        Ok(results)
    }

    // ==================== Chat Methods ====================

    /// Insert or replace a chat record
    pub fn put_chat(&self, chat: &IndexChat) -> Result<(), StorageError> {
        self.put_json(CF_INDEX_CHAT, &id_key(chat.chat_id), chat)?;
        debug!(chat_id = chat.chat_id, "Stored chat");
        Ok(())
    }

    pub fn get_chat(&self, chat_id: i64) -> Result<Option<IndexChat>, StorageError> {
        self.get_json(CF_INDEX_CHAT, &id_key(chat_id))
    }

    /// All chats ordered by chat id
    pub fn list_chats(&self) -> Result<Vec<IndexChat>, StorageError> {
        self.scan_json(CF_INDEX_CHAT)
    }

    /// Chats with the watching flag set
    pub fn list_watched(&self) -> Result<Vec<IndexChat>, StorageError> {
        Ok(self
            .list_chats()?
            .into_iter()
            .filter(|c| c.watching)
            .collect())
    }

    /// Delete a chat and revoke it from every API key ACL.
    ///
    /// Returns false if the chat did not exist.
    pub fn delete_chat(&self, chat_id: i64) -> Result<bool, StorageError> {
        let chats_cf = self.cf(CF_INDEX_CHAT)?;
        let keys_cf = self.cf(CF_API_KEY)?;
        let grants_cf = self.cf(CF_API_KEY_CHATS)?;

        let existed = self.db.get_cf(chats_cf, id_key(chat_id))?.is_some();

        let mut batch = WriteBatch::default();
        batch.delete_cf(chats_cf, id_key(chat_id));

        for api_key in self.keys_for_chat(chat_id)? {
            batch.delete_cf(grants_cf, chat_grant_key(chat_id, &api_key));
            if let Some(mut record) = self.get_api_key(&api_key)? {
                record.chats.retain(|c| *c != chat_id);
                batch.put_cf(keys_cf, record.key.as_bytes(), serde_json::to_vec(&record)?);
            }
        }

        self.db.write(batch)?;
        debug!(chat_id, existed, "Deleted chat");
        Ok(existed)
    }

    /// Apply a change to an existing chat and persist it
    pub fn update_chat<F>(&self, chat_id: i64, f: F) -> Result<IndexChat, StorageError>
    where
        F: FnOnce(&mut IndexChat),
    {
        let mut chat = self
            .get_chat(chat_id)?
            .ok_or_else(|| StorageError::NotFound(format!("chat {}", chat_id)))?;
        f(&mut chat);
        self.put_chat(&chat)?;
        Ok(chat)
    }

    pub fn set_watching(&self, chat_id: i64, watching: bool) -> Result<IndexChat, StorageError> {
        self.update_chat(chat_id, |c| c.watching = watching)
    }

    pub fn set_no_delete(&self, chat_id: i64, no_delete: bool) -> Result<IndexChat, StorageError> {
        self.update_chat(chat_id, |c| c.no_delete = no_delete)
    }

    /// Store the channel-local pts. Returns false if the chat is unknown.
    pub fn set_chat_pts(&self, chat_id: i64, pts: i64) -> Result<bool, StorageError> {
        match self.get_chat(chat_id)? {
            Some(mut chat) => {
                chat.pts = pts;
                self.put_chat(&chat)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== User Info Methods ====================

    pub fn put_user_info(&self, user: &UserInfo) -> Result<(), StorageError> {
        self.put_json(CF_USER_INFO, &id_key(user.user_id), user)
    }

    pub fn get_user_info(&self, user_id: i64) -> Result<Option<UserInfo>, StorageError> {
        self.get_json(CF_USER_INFO, &id_key(user_id))
    }

    // ==================== Sub Bot Methods ====================

    pub fn put_sub_bot(&self, bot: &SubBot) -> Result<(), StorageError> {
        self.put_json(CF_SUB_BOT, &id_key(bot.bot_id), bot)
    }

    pub fn get_sub_bot(&self, bot_id: i64) -> Result<Option<SubBot>, StorageError> {
        self.get_json(CF_SUB_BOT, &id_key(bot_id))
    }

    pub fn list_sub_bots(&self) -> Result<Vec<SubBot>, StorageError> {
        self.scan_json(CF_SUB_BOT)
    }

    pub fn delete_sub_bot(&self, bot_id: i64) -> Result<(), StorageError> {
        let cf = self.cf(CF_SUB_BOT)?;
        self.db.delete_cf(cf, id_key(bot_id))?;
        Ok(())
    }

    // ==================== API Key Methods ====================

    /// Insert or replace an API key together with its ACL join rows
    pub fn put_api_key(&self, api_key: &ApiKey) -> Result<(), StorageError> {
        let keys_cf = self.cf(CF_API_KEY)?;
        let grants_cf = self.cf(CF_API_KEY_CHATS)?;

        let mut batch = WriteBatch::default();
        if let Some(previous) = self.get_api_key(&api_key.key)? {
            for chat_id in previous.chats {
                batch.delete_cf(grants_cf, chat_grant_key(chat_id, &api_key.key));
            }
        }
        for chat_id in &api_key.chats {
            batch.put_cf(grants_cf, chat_grant_key(*chat_id, &api_key.key), b"");
        }
        batch.put_cf(keys_cf, api_key.key.as_bytes(), serde_json::to_vec(api_key)?);

        self.db.write(batch)?;
        debug!(name = %api_key.name, chats = api_key.chats.len(), "Stored api key");
        Ok(())
    }

    pub fn get_api_key(&self, key: &str) -> Result<Option<ApiKey>, StorageError> {
        self.get_json(CF_API_KEY, key.as_bytes())
    }

    pub fn list_api_keys(&self) -> Result<Vec<ApiKey>, StorageError> {
        self.scan_json(CF_API_KEY)
    }

    /// Remove a key and its ACL rows. Returns false if it did not exist.
    pub fn delete_api_key(&self, key: &str) -> Result<bool, StorageError> {
        let Some(existing) = self.get_api_key(key)? else {
            return Ok(false);
        };
        let keys_cf = self.cf(CF_API_KEY)?;
        let grants_cf = self.cf(CF_API_KEY_CHATS)?;

        let mut batch = WriteBatch::default();
        for chat_id in existing.chats {
            batch.delete_cf(grants_cf, chat_grant_key(chat_id, key));
        }
        batch.delete_cf(keys_cf, key.as_bytes());
        self.db.write(batch)?;
        Ok(true)
    }

    /// Keys whose ACL includes the chat
    pub fn keys_for_chat(&self, chat_id: i64) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_API_KEY_CHATS)?;
        let prefix = id_key(chat_id);

        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let (_, api_key) = parse_chat_grant_key(&key)?;
            keys.push(api_key);
        }
        Ok(keys)
    }

    // ==================== Updates State Methods ====================

    /// Load the cursor; zero state if never persisted
    pub fn get_updates_state(&self) -> Result<UpdatesState, StorageError> {
        Ok(self
            .get_json(CF_UPDATES_STATE, UPDATES_STATE_KEY)?
            .unwrap_or_default())
    }

    pub fn put_updates_state(&self, state: &UpdatesState) -> Result<(), StorageError> {
        self.put_json(CF_UPDATES_STATE, UPDATES_STATE_KEY, state)?;
        debug!(pts = state.pts, qts = state.qts, date = state.date, seq = state.seq, "Persisted updates state");
        Ok(())
    }

    // ==================== Stats ====================

    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats {
            chat_count: self.count_cf_entries(self.cf(CF_INDEX_CHAT)?)?,
            user_count: self.count_cf_entries(self.cf(CF_USER_INFO)?)?,
            api_key_count: self.count_cf_entries(self.cf(CF_API_KEY)?)?,
            sub_bot_count: self.count_cf_entries(self.cf(CF_SUB_BOT)?)?,
            ..Default::default()
        };
        stats.watched_count = self.list_watched()?.len() as u64;
        stats.disk_usage_bytes = self.get_disk_usage()?;
        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> Result<u64, StorageError> {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        Ok(total_size)
    }

    /// Names of the column families this store opens
    pub fn column_families() -> &'static [&'static str] {
        ALL_CF_NAMES
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub chat_count: u64,
    pub watched_count: u64,
    pub user_count: u64,
    pub api_key_count: u64,
    pub sub_bot_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
