//! Column family definitions for RocksDB.
//!
//! One column family per metadata table:
//! - index_chat: indexed chats keyed by chat id
//! - user_info: author profiles keyed by user id
//! - sub_bot: auxiliary bots keyed by bot id
//! - api_key: bearer keys keyed by the key string
//! - api_key_chats: reverse ACL index, `chat_id || key` -> empty
//! - updates_state: the account-wide update cursor (single row)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for indexed chats
pub const CF_INDEX_CHAT: &str = "index_chat";

/// Column family name for cached author profiles
pub const CF_USER_INFO: &str = "user_info";

/// Column family name for auxiliary bots
pub const CF_SUB_BOT: &str = "sub_bot";

/// Column family name for API keys
pub const CF_API_KEY: &str = "api_key";

/// Column family name for the chat -> api key join
pub const CF_API_KEY_CHATS: &str = "api_key_chats";

/// Column family name for the updates state singleton
pub const CF_UPDATES_STATE: &str = "updates_state";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_INDEX_CHAT,
    CF_USER_INFO,
    CF_SUB_BOT,
    CF_API_KEY,
    CF_API_KEY_CHATS,
    CF_UPDATES_STATE,
];

/// User info is rewritten on every observed message
fn user_info_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_INDEX_CHAT, Options::default()),
        ColumnFamilyDescriptor::new(CF_USER_INFO, user_info_options()),
        ColumnFamilyDescriptor::new(CF_SUB_BOT, Options::default()),
        ColumnFamilyDescriptor::new(CF_API_KEY, Options::default()),
        ColumnFamilyDescriptor::new(CF_API_KEY_CHATS, Options::default()),
        ColumnFamilyDescriptor::new(CF_UPDATES_STATE, Options::default()),
    ]
}
