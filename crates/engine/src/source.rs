//! Boundary to the upstream channel platform.
//!
//! Implementations perform a single remote read per call and never retry;
//! the poll scheduler owns retry timing.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ChannelRef, Message};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("channel not found: {0}")]
    NotFound(String),
    #[error("rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("upstream rejected the session credentials")]
    Unauthorized,
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("malformed upstream response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Errors that no amount of waiting for the next poll will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Unauthorized)
    }
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resolve a channel handle to its stable upstream identity.
    async fn resolve(&self, handle: &str) -> Result<ChannelRef, SourceError>;

    /// Fetch up to `limit` messages older than `cursor`, newest first.
    ///
    /// `cursor` is an exclusive upper bound on message id; `None` starts from
    /// the newest message. An empty page means the channel is exhausted.
    async fn fetch_page(
        &self,
        channel: &ChannelRef,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>, SourceError>;
}
