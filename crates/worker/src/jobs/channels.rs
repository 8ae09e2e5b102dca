use anyhow::{bail, Result};
use clap::Subcommand;
use db::models::ChannelStats;
use db::queries::channels as channel_queries;
use engine::{register, Registration};

use super::{parse_handle, Context};

#[derive(Debug, Clone, Subcommand)]
pub enum ChannelsCommand {
    /// Register channels, resolving their titles upstream.
    Add {
        #[arg(required = true, value_parser = parse_handle)]
        handles: Vec<String>,
    },
    /// Show registered channels with post counts.
    List,
}

pub async fn run(ctx: &Context, command: ChannelsCommand) -> Result<()> {
    match command {
        ChannelsCommand::Add { handles } => {
            let mut missing = Vec::new();
            for handle in &handles {
                match register(&ctx.source, &ctx.store, handle).await? {
                    Registration::Resolved(channel) => {
                        println!("{}\t{}", channel.username, channel.title);
                    }
                    Registration::Deferred { channel, reason } => {
                        println!("{}\t(title pending: {})", channel.username, reason);
                    }
                    Registration::NotFound(handle) => missing.push(handle),
                }
            }
            if !missing.is_empty() {
                bail!("channels not found upstream: {}", missing.join(", "));
            }
        }
        ChannelsCommand::List => {
            let stats = channel_queries::stats(ctx.store.pool()).await?;
            if stats.is_empty() {
                println!("no channels registered");
            }
            for row in &stats {
                println!("{}", format_stats(row));
            }
        }
    }
    Ok(())
}

fn format_stats(row: &ChannelStats) -> String {
    let latest = row
        .latest_post_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let synced = row
        .last_synced_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{:<32} {:>8} posts  latest {}  synced {}  {}",
        row.username, row.posts, latest, synced, row.title
    )
}
