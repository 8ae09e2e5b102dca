use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use engine::RunMode;

use super::{parse_since, poll, Context, PollArgs};

#[derive(Debug, Clone, Args)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub poll: PollArgs,
    /// Never sync posts older than this date, YYYY-MM-DD.
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,
}

/// Tail every channel, stopping each scan at the first stored post.
pub async fn run(ctx: &Context, args: MonitorArgs) -> Result<()> {
    let since = args.since.unwrap_or(ctx.settings.monitor_since);
    poll(ctx, args.poll, RunMode::monitor(since)).await
}
