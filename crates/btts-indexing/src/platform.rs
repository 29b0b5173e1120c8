//! Contract with the messaging platform client.
//!
//! The MTProto client itself lives outside this workspace. Everything the
//! indexing pipeline needs from it is expressed by [`PlatformClient`]; flood
//! waits are absorbed by the client's middleware and surface here as slow
//! calls, not errors.

use async_trait::async_trait;
use thiserror::Error;

use btts_types::{
    ChannelDifference, Difference, DialogsPage, Entities, HistoryPage, MessageRange, Peer,
    UpdatesState,
};

/// Errors reported by the platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Connection dropped or request failed in transit
    #[error("Network error: {0}")]
    Network(String),

    /// Flood wait the middleware could not absorb
    #[error("Flood wait of {0}s")]
    FloodWait(u64),

    /// The platform rejected the request
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// Username or peer does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network(_) | PlatformError::FloodWait(_))
    }
}

/// A peer resolved from a username, with the entities describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeer {
    pub peer: Peer,
    pub entities: Entities,
}

/// Operations the indexing pipeline calls on the platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Id of the logged-in account.
    fn self_id(&self) -> i64;

    async fn resolve_username(&self, username: &str) -> Result<ResolvedPeer, PlatformError>;

    /// History page ending before `offset_id` (0 = newest), newest first.
    async fn get_history(
        &self,
        peer: Peer,
        offset_id: i64,
        add_offset: i32,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError>;

    /// Current account-wide update state.
    async fn get_state(&self) -> Result<UpdatesState, PlatformError>;

    async fn get_difference(&self, state: &UpdatesState) -> Result<Difference, PlatformError>;

    async fn get_channel_difference(
        &self,
        channel_id: i64,
        pts: i64,
        limit: usize,
    ) -> Result<ChannelDifference, PlatformError>;

    /// Open a takeout session. Returns the session id.
    async fn init_takeout(&self) -> Result<i64, PlatformError>;

    /// Message-id ranges that may be iterated without racing live updates.
    async fn get_split_ranges(&self) -> Result<Vec<MessageRange>, PlatformError>;

    /// Dialogs page within a split range; an empty page ends the listing.
    async fn get_dialogs(
        &self,
        range: MessageRange,
        offset: usize,
        limit: usize,
    ) -> Result<DialogsPage, PlatformError>;

    /// History page for `peer` wrapped in `InvokeWithMessagesRange`.
    async fn get_history_in_range(
        &self,
        range: MessageRange,
        peer: Peer,
        offset_id: i64,
        limit: usize,
    ) -> Result<HistoryPage, PlatformError>;

    async fn finish_takeout(&self, success: bool) -> Result<(), PlatformError>;

    /// Whether a channel id is a supergroup rather than a broadcast channel.
    async fn is_megagroup(&self, channel_id: i64) -> Result<bool, PlatformError>;
}
