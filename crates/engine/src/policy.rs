//! Per-channel synchronization policy.
//!
//! A scan walks a channel newest-first, one page at a time, and decides per
//! message whether to keep going. The three run modes differ only in how the
//! lower time bound is computed and in what ends the scan:
//!
//! - gap-fill stops at the first message already in the store,
//! - full-reconcile re-upserts everything inside the window.
//!
//! Both stop when a message falls below the lower bound or the source runs
//! out of pages.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::source::{MessageSource, SourceError};
use crate::store::{PostStore, StoreError};
use crate::types::{Channel, ChannelReport, Message, StopReason, SyncCounts, UpsertOutcome};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the scheduler may log this error and move on to the next channel.
    pub fn is_isolated(&self) -> bool {
        match self {
            SyncError::Source(err) => !err.is_fatal(),
            SyncError::Store(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    GapFill,
    FullReconcile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerBound {
    Fixed(DateTime<Utc>),
    /// `now - duration`, recomputed at the start of every iteration.
    Trailing(chrono::Duration),
}

impl LowerBound {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LowerBound::Fixed(at) => *at,
            // Saturates at the earliest representable time.
            LowerBound::Trailing(window) => now
                .checked_sub_signed(*window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMode {
    pub name: &'static str,
    pub lower_bound: LowerBound,
    pub stop_mode: StopMode,
}

impl RunMode {
    pub fn backfill(since: DateTime<Utc>, stop_on_existing: bool) -> Self {
        Self {
            name: "backfill",
            lower_bound: LowerBound::Fixed(since),
            stop_mode: if stop_on_existing {
                StopMode::GapFill
            } else {
                StopMode::FullReconcile
            },
        }
    }

    pub fn monitor(since: DateTime<Utc>) -> Self {
        Self {
            name: "monitor",
            lower_bound: LowerBound::Fixed(since),
            stop_mode: StopMode::GapFill,
        }
    }

    pub fn sliding_window(window: chrono::Duration) -> Self {
        Self {
            name: "window",
            lower_bound: LowerBound::Trailing(window),
            stop_mode: StopMode::FullReconcile,
        }
    }
}

#[derive(Debug)]
enum ScanState {
    Fetching { cursor: Option<i64> },
    Evaluating { page: Vec<Message>, cursor: Option<i64> },
    Stopped(StopReason),
}

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    page_size: usize,
    page_delay: Duration,
    excluded_views: Option<i64>,
}

impl SyncPolicy {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page_delay: Duration::ZERO,
            excluded_views: Some(1),
        }
    }

    /// Pause between consecutive page fetches within one channel scan.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Exact view count treated as a duplicate/edit artifact. `None` disables
    /// the filter.
    pub fn with_excluded_views(mut self, views: Option<i64>) -> Self {
        self.excluded_views = views;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn is_excluded(&self, message: &Message) -> bool {
        self.excluded_views == Some(message.views)
    }

    /// Scan one channel under `mode` and persist what is in scope.
    pub async fn sync_channel<S, P>(
        &self,
        source: &S,
        store: &P,
        channel: &Channel,
        mode: &RunMode,
        lower_bound: DateTime<Utc>,
    ) -> Result<ChannelReport, SyncError>
    where
        S: MessageSource + ?Sized,
        P: PostStore + ?Sized,
    {
        let channel_ref = source.resolve(&channel.username).await?;
        let mut counts = SyncCounts::default();
        let mut pages = 0u32;
        let mut state = ScanState::Fetching { cursor: None };

        loop {
            state = match state {
                ScanState::Fetching { cursor } => {
                    if pages > 0 && !self.page_delay.is_zero() {
                        tokio::time::sleep(self.page_delay).await;
                    }
                    let page = source
                        .fetch_page(&channel_ref, cursor, self.page_size)
                        .await?;
                    pages += 1;
                    debug!(
                        channel = %channel.username,
                        mode = mode.name,
                        page = pages,
                        ?cursor,
                        fetched = page.len(),
                        "fetched page"
                    );
                    ScanState::Evaluating { page, cursor }
                }
                ScanState::Evaluating { page, cursor } => {
                    self.evaluate(
                        store,
                        channel,
                        mode.stop_mode,
                        lower_bound,
                        page,
                        cursor,
                        &mut counts,
                    )
                    .await?
                }
                ScanState::Stopped(stop_reason) => {
                    debug!(
                        channel = %channel.username,
                        mode = mode.name,
                        reason = %stop_reason,
                        new = counts.new,
                        updated = counts.updated,
                        skipped = counts.skipped,
                        "scan stopped"
                    );
                    return Ok(ChannelReport {
                        counts,
                        pages,
                        stop_reason,
                    });
                }
            };
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate<P>(
        &self,
        store: &P,
        channel: &Channel,
        stop_mode: StopMode,
        lower_bound: DateTime<Utc>,
        page: Vec<Message>,
        cursor: Option<i64>,
        counts: &mut SyncCounts,
    ) -> Result<ScanState, SyncError>
    where
        P: PostStore + ?Sized,
    {
        let Some(oldest) = page.iter().map(|m| m.id).min() else {
            return Ok(ScanState::Stopped(StopReason::SourceExhausted));
        };

        for message in &page {
            if message.published_at < lower_bound {
                return Ok(ScanState::Stopped(StopReason::BoundaryReached));
            }

            if self.is_excluded(message) {
                counts.skipped += 1;
                log_message(channel, message, "skipped");
                continue;
            }

            if stop_mode == StopMode::GapFill && store.exists(channel, message.id).await? {
                return Ok(ScanState::Stopped(StopReason::FirstExistingReached));
            }

            match store.upsert(channel, message).await? {
                UpsertOutcome::Inserted => {
                    counts.new += 1;
                    log_message(channel, message, "new");
                }
                UpsertOutcome::Updated | UpsertOutcome::UpdatedTimestampOnly => {
                    counts.updated += 1;
                    log_message(channel, message, "updated");
                    // Another writer inserted it between `exists` and `upsert`.
                    if stop_mode == StopMode::GapFill {
                        return Ok(ScanState::Stopped(StopReason::FirstExistingReached));
                    }
                }
            }
        }

        if page.len() < self.page_size {
            return Ok(ScanState::Stopped(StopReason::SourceExhausted));
        }

        if cursor.is_some_and(|c| oldest >= c) {
            warn!(
                channel = %channel.username,
                ?cursor,
                oldest,
                "source returned a page that does not advance the cursor"
            );
            return Ok(ScanState::Stopped(StopReason::SourceExhausted));
        }

        Ok(ScanState::Fetching {
            cursor: Some(oldest),
        })
    }
}

fn log_message(channel: &Channel, message: &Message, classification: &'static str) {
    info!(
        channel = %channel.username,
        message_id = message.id,
        date = %message.published_at.date_naive(),
        views = message.views,
        classification,
        "post"
    );
}
