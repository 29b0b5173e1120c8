//! # btts-types
//!
//! Shared domain types for btts.
//!
//! This crate defines the data contract the other crates share:
//! - Documents: the records the search index stores, plus text extraction
//! - Filters: the filter grammar understood by both backends
//! - Messages and updates: the platform model the indexing pipeline consumes
//! - Chats, users and API keys: metadata kept beside the index
//! - Settings: configuration types
//!
//! ## Usage
//!
//! ```rust
//! use btts_types::{extract_text, MessageType};
//!
//! let (text, kind) = extract_text(None, "hello");
//! assert_eq!(text, "hello");
//! assert_eq!(kind, MessageType::Text);
//! ```

pub mod chat;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod message;
pub mod state;
pub mod update;

pub use chat::{ApiKey, ChatType, IndexChat, SubBot, UserInfo};
pub use config::{
    AppSettings, CacheSettings, EngineKind, EngineSettings, FileCacheSettings, HttpSettings,
    IndexLayout, LogFormat, ReconcileSettings, Settings,
};
pub use document::{extract_text, Document, MessageType, STICKER_FILE_NAMES};
pub use error::BttsError;
pub use filter::{filter_expression, SearchFilter};
pub use message::{
    ChatEntity, ChatEntityKind, DocumentAttribute, Entities, Media, Message, Peer, UserEntity,
};
pub use state::UpdatesState;
pub use update::{
    ChannelDifference, Dialog, DialogsPage, Difference, HistoryPage, MessageRange, Update,
};
