//! Indexing pipeline for btts.
//!
//! Everything that turns platform messages into index documents lives here.
//!
//! ## Key Components
//!
//! - [`PlatformClient`]: the operations needed from the messaging platform
//! - [`Extractor`]: message to [`Document`](btts_types::Document) conversion
//! - [`WatchedChats`]: in-memory registry of indexed chats
//! - [`WatchIngestor`]: applies live updates to the index
//! - [`GapReconciler`]: replays missed updates after disconnects
//! - [`BulkImporter`]: single-chat history import and takeout account export
//!
//! ## Flow
//!
//! 1. On startup the reconciler replays the difference since the stored cursor
//! 2. Live updates go through the ingestor and are observed by the reconciler
//!    so the cursor keeps up
//! 3. Channels reporting a too-long gap are resynced in the background
//! 4. New chats enter the index through the importer

pub mod enricher;
pub mod error;
pub mod extractor;
pub mod importer;
pub mod ingestor;
pub mod mock;
pub mod platform;
pub mod reconciler;
pub mod watched;

pub use enricher::{Enricher, NoopEnricher};
pub use error::IndexingError;
pub use extractor::Extractor;
pub use importer::{
    BulkImporter, DialogKind, ExportConfig, ExportSummary, ImportConfig, ImportStage,
    ImportSummary, ImportTarget, Progress, IMPORT_BATCH_SIZE,
};
pub use ingestor::{IngestOutcome, SkipReason, WatchIngestor};
pub use mock::ScriptedPlatform;
pub use platform::{PlatformClient, PlatformError, ResolvedPeer};
pub use reconciler::{
    GapReconciler, ReconcileReport, ReconcilerConfig, CHANNEL_DIFFERENCE_LIMIT, SLICE_PAUSE,
};
pub use watched::WatchedChats;
