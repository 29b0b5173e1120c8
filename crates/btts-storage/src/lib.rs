//! Metadata storage for btts.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation per table (chats, users, keys, sub-bots, state)
//! - Order-preserving id keys for ordered chat listings
//! - Atomic writes via WriteBatch for API keys and their ACL join rows

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
