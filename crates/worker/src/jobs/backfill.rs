use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use engine::{register_all, LoopState, Pacing, PollScheduler, RunMode, SyncPolicy};
use std::time::Duration;
use tracing::info;

use super::{parse_handle, parse_since, shutdown_signal, Context};

#[derive(Debug, Clone, Args)]
pub struct BackfillArgs {
    /// Channel to backfill (registered if absent). Repeatable.
    #[arg(long = "channel", required = true, value_parser = parse_handle)]
    pub channels: Vec<String>,
    /// Oldest publish date to keep, YYYY-MM-DD (UTC).
    #[arg(long, value_parser = parse_since)]
    pub since: DateTime<Utc>,
    /// Stop each channel at the first post already stored.
    #[arg(long)]
    pub only_newer_than_db: bool,
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub page_size: Option<usize>,
    #[arg(long)]
    pub page_delay_ms: Option<u64>,
    /// Seconds between consecutive channels.
    #[arg(long)]
    pub channel_delay: Option<u64>,
}

pub async fn run(ctx: &Context, args: BackfillArgs) -> Result<()> {
    let settings = &ctx.settings;
    let registered = register_all(&ctx.source, &ctx.store, &args.channels).await?;
    if registered.handles.is_empty() {
        bail!(
            "none of the requested channels exist upstream: {}",
            registered.missing.join(", ")
        );
    }

    let mode = RunMode::backfill(args.since, args.only_newer_than_db);
    let policy = SyncPolicy::new(args.page_size.unwrap_or(settings.backfill_page_size))
        .with_page_delay(
            args.page_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(settings.page_delay),
        )
        .with_excluded_views(settings.excluded_views);
    let pacing = Pacing {
        interval: Duration::ZERO,
        channel_delay: args
            .channel_delay
            .map(Duration::from_secs)
            .unwrap_or(settings.channel_delay),
    };

    info!(
        channels = registered.handles.len(),
        missing = registered.missing.len(),
        since = %args.since,
        stop_mode = ?mode.stop_mode,
        page_size = policy.page_size(),
        "backfill started"
    );

    let scheduler = PollScheduler::new(&ctx.source, &ctx.store, policy, pacing)
        .with_channels(registered.handles)
        .with_shutdown(shutdown_signal());
    let (summary, _) = scheduler
        .run_iteration(LoopState::default(), &mode, Utc::now())
        .await?;

    info!(
        new = summary.counts.new,
        updated = summary.counts.updated,
        skipped = summary.counts.skipped,
        failed = summary.failed,
        interrupted = summary.interrupted,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "backfill complete"
    );

    let failed = summary.failed + registered.missing.len();
    if failed > 0 {
        bail!(
            "{} of {} channels failed to backfill",
            failed,
            summary.channels + registered.missing.len()
        );
    }
    Ok(())
}
