//! Persistence boundary for channels and posts.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Channel, Message, UpsertOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("channel not registered: {0}")]
    UnknownChannel(String),
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Return the channel with this handle, creating it on first reference.
    async fn ensure_channel(&self, handle: &str, title: &str) -> Result<Channel, StoreError>;

    /// Replace the display title of a registered channel.
    async fn set_title(&self, channel: &Channel, title: &str) -> Result<(), StoreError>;

    /// All registered channels ordered by handle.
    async fn list_channels(&self) -> Result<Vec<Channel>, StoreError>;

    /// Write a message keyed by (channel, message id).
    ///
    /// Atomic per key. Insert vs update is decided by key existence only; the
    /// first write fixes `first_seen_at` and every write refreshes
    /// `last_updated_at`.
    async fn upsert(&self, channel: &Channel, message: &Message)
        -> Result<UpsertOutcome, StoreError>;

    async fn exists(&self, channel: &Channel, message_id: i64) -> Result<bool, StoreError>;
}
