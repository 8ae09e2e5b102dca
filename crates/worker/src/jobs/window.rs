use anyhow::Result;
use clap::Args;
use engine::config::WINDOW_DAYS;
use engine::RunMode;

use super::{poll, Context, PollArgs};

#[derive(Debug, Clone, Args)]
pub struct WindowArgs {
    #[command(flatten)]
    pub poll: PollArgs,
    /// Length of the trailing window in days.
    #[arg(long, value_parser = clap::value_parser!(i64).range(WINDOW_DAYS))]
    pub days: Option<i64>,
}

/// Re-sync the trailing window on every iteration so view, forward and
/// reaction counters stay current.
pub async fn run(ctx: &Context, args: WindowArgs) -> Result<()> {
    let window = args
        .days
        .map(chrono::Duration::days)
        .unwrap_or(ctx.settings.window);
    poll(ctx, args.poll, RunMode::sliding_window(window)).await
}
