//! Sequential poll loop over all registered channels.
//!
//! One iteration visits every channel once, in handle order, with a fixed
//! minimum gap between consecutive channel calls. Iterations start at most
//! once per `interval`; time spent syncing is subtracted from the sleep.
//! Shutdown is observed only between channels and while sleeping, never in
//! the middle of a channel scan.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::policy::{RunMode, SyncError, SyncPolicy};
use crate::source::MessageSource;
use crate::store::PostStore;
use crate::types::{Channel, SyncCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub interval: Duration,
    pub channel_delay: Duration,
}

/// Loop-local state carried from one iteration into the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopState {
    pub iteration: u64,
    pub last_channel_call: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationSummary {
    pub iteration: u64,
    pub window_start: DateTime<Utc>,
    pub channels: usize,
    pub failed: usize,
    pub counts: SyncCounts,
    pub elapsed: Duration,
    pub interrupted: bool,
}

pub struct PollScheduler<'a, S: ?Sized, P: ?Sized> {
    source: &'a S,
    store: &'a P,
    policy: SyncPolicy,
    pacing: Pacing,
    only: Option<Vec<String>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a, S, P> PollScheduler<'a, S, P>
where
    S: MessageSource + ?Sized,
    P: PostStore + ?Sized,
{
    pub fn new(source: &'a S, store: &'a P, policy: SyncPolicy, pacing: Pacing) -> Self {
        Self {
            source,
            store,
            policy,
            pacing,
            only: None,
            shutdown: None,
        }
    }

    /// Restrict iterations to these channel handles.
    pub fn with_channels(mut self, handles: Vec<String>) -> Self {
        self.only = Some(handles);
        self
    }

    /// Stop cleanly once the watched value turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn stopping(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn channels(&self) -> Result<Vec<Channel>, SyncError> {
        let mut channels = self.store.list_channels().await?;
        if let Some(only) = &self.only {
            channels.retain(|c| only.contains(&c.username));
        }
        channels.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(channels)
    }

    /// One pass over all channels.
    pub async fn run_iteration(
        &self,
        state: LoopState,
        mode: &RunMode,
        now: DateTime<Utc>,
    ) -> Result<(IterationSummary, LoopState), SyncError> {
        let started = Instant::now();
        let iteration = state.iteration + 1;
        let mut last_channel_call = state.last_channel_call;
        let window_start = mode.lower_bound.resolve(now);
        let channels = self.channels().await?;

        info!(
            mode = mode.name,
            iteration,
            channels = channels.len(),
            window_start = %window_start,
            "iteration started"
        );
        if channels.is_empty() {
            warn!(mode = mode.name, "no channels registered");
        }

        let mut summary = IterationSummary {
            iteration,
            window_start,
            channels: channels.len(),
            failed: 0,
            counts: SyncCounts::default(),
            elapsed: Duration::ZERO,
            interrupted: false,
        };

        for channel in &channels {
            if let Some(previous) = last_channel_call {
                self.pause(previous + self.pacing.channel_delay).await;
            }
            if self.stopping() {
                summary.interrupted = true;
                break;
            }

            let result = self
                .policy
                .sync_channel(self.source, self.store, channel, mode, window_start)
                .await;
            last_channel_call = Some(Instant::now());

            match result {
                Ok(report) => {
                    info!(
                        channel = %channel.username,
                        new = report.counts.new,
                        updated = report.counts.updated,
                        skipped = report.counts.skipped,
                        pages = report.pages,
                        reason = %report.stop_reason,
                        "channel synced"
                    );
                    summary.counts += report.counts;
                }
                Err(err) if err.is_isolated() => {
                    warn!(channel = %channel.username, error = %err, "channel sync failed");
                    summary.failed += 1;
                }
                Err(err) => {
                    error!(channel = %channel.username, error = ?err, "channel sync aborted");
                    return Err(err);
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            mode = mode.name,
            iteration,
            new = summary.counts.new,
            updated = summary.counts.updated,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "iteration complete"
        );

        Ok((
            summary,
            LoopState {
                iteration,
                last_channel_call,
            },
        ))
    }

    /// Run iterations until shutdown or an error that is not isolated.
    pub async fn run(&self, mode: &RunMode) -> Result<LoopState, SyncError> {
        let mut state = LoopState::default();
        loop {
            let started = Instant::now();
            let (summary, next) = self.run_iteration(state, mode, Utc::now()).await?;
            state = next;
            if summary.interrupted || self.stopping() {
                return Ok(state);
            }

            let sleep = self.pacing.interval.saturating_sub(started.elapsed());
            if !sleep.is_zero() {
                info!(sleep_secs = sleep.as_secs(), "sleeping until next iteration");
                self.pause(started + self.pacing.interval).await;
            }
            if self.stopping() {
                return Ok(state);
            }
        }
    }

    /// Sleep until `deadline`, returning early if shutdown is signalled.
    async fn pause(&self, deadline: Instant) {
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                if *rx.borrow() {
                    return;
                }
                let done = tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => true,
                    signalled = rx.wait_for(|stop| *stop) => signalled.is_ok(),
                };
                // Sender dropped without signalling: keep the pacing.
                if !done {
                    tokio::time::sleep_until(deadline).await;
                }
            }
            None => tokio::time::sleep_until(deadline).await,
        }
    }
}
