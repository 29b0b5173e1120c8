//! Metadata store errors.

use thiserror::Error;

use btts_types::BttsError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// The database was opened without one of the btts column families
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// A stored key has the wrong width or encoding
    #[error("Key error: {0}")]
    Key(String),

    /// A stored JSON record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for BttsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => BttsError::NotFound(what),
            StorageError::ColumnFamilyNotFound(_)
            | StorageError::Key(_)
            | StorageError::Serialization(_) => BttsError::Fatal(err.to_string()),
            StorageError::RocksDb(e) => BttsError::Transient(e.to_string()),
        }
    }
}
