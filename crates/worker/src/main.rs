use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use engine::config::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod jobs;

use jobs::backfill::BackfillArgs;
use jobs::channels::ChannelsCommand;
use jobs::monitor::MonitorArgs;
use jobs::window::WindowArgs;

#[derive(Debug, Parser)]
#[command(name = "chansync")]
#[command(about = "Incremental sync of public channel posts into Postgres", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync channel history back to a date, once.
    Backfill(BackfillArgs),
    /// Poll every channel for posts newer than what is stored.
    Monitor(MonitorArgs),
    /// Poll every channel, re-syncing the trailing window to refresh counters.
    Window(WindowArgs),
    /// Register or list channels.
    Channels {
        #[command(subcommand)]
        command: ChannelsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading settings")?;
    let ctx = jobs::Context::connect(settings).await?;
    info!("chansync starting");

    match cli.command {
        Command::Backfill(args) => jobs::backfill::run(&ctx, args).await,
        Command::Monitor(args) => jobs::monitor::run(&ctx, args).await,
        Command::Window(args) => jobs::window::run(&ctx, args).await,
        Command::Channels { command } => jobs::channels::run(&ctx, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::config::parse_date;

    #[test]
    fn test_backfill_args() {
        let cli = Cli::try_parse_from([
            "chansync", "backfill",
            "--channel", "@abualiexpress",
            "--channel", "newsil_tme",
            "--since", "2023-10-07",
            "--only-newer-than-db",
            "--page-size", "50",
        ])
        .unwrap();

        let Command::Backfill(args) = cli.command else {
            panic!("expected backfill");
        };
        assert_eq!(args.channels, vec!["abualiexpress", "newsil_tme"]);
        assert_eq!(args.since, parse_date("2023-10-07").unwrap());
        assert!(args.only_newer_than_db);
        assert_eq!(args.page_size, Some(50));
        assert_eq!(args.page_delay_ms, None);
    }

    #[test]
    fn test_backfill_defaults_to_full_reconcile() {
        let cli = Cli::try_parse_from([
            "chansync", "backfill", "--channel", "news", "--since", "2024-01-01",
        ])
        .unwrap();

        let Command::Backfill(args) = cli.command else {
            panic!("expected backfill");
        };
        assert!(!args.only_newer_than_db);
        assert_eq!(args.page_size, None);
    }

    #[test]
    fn test_backfill_requires_channel_and_since() {
        assert!(Cli::try_parse_from(["chansync", "backfill", "--since", "2024-01-01"]).is_err());
        assert!(Cli::try_parse_from(["chansync", "backfill", "--channel", "news"]).is_err());
    }

    #[test]
    fn test_backfill_rejects_malformed_date() {
        let result = Cli::try_parse_from([
            "chansync", "backfill", "--channel", "news", "--since", "07/10/2023",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_monitor_with_overrides() {
        let cli = Cli::try_parse_from([
            "chansync", "monitor",
            "--interval", "30",
            "--channel-delay", "5",
            "--since", "2024-02-01",
        ])
        .unwrap();

        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(args.poll.interval, Some(30));
        assert_eq!(args.poll.channel_delay, Some(5));
        assert!(args.poll.channels.is_empty());
        assert_eq!(args.since, parse_date("2024-02-01"));
    }

    #[test]
    fn test_window_days() {
        let cli = Cli::try_parse_from(["chansync", "window", "--days", "3"]).unwrap();
        let Command::Window(args) = cli.command else {
            panic!("expected window");
        };
        assert_eq!(args.days, Some(3));
    }

    #[test]
    fn test_window_rejects_out_of_range_days() {
        assert!(Cli::try_parse_from(["chansync", "window", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["chansync", "window", "--days", "36501"]).is_err());
        assert!(Cli::try_parse_from(["chansync", "window", "--days", "200000000"]).is_err());
        assert!(Cli::try_parse_from(["chansync", "window", "--days", "36500"]).is_ok());
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert!(Cli::try_parse_from(["chansync", "monitor", "--page-size", "0"]).is_err());
        assert!(Cli::try_parse_from([
            "chansync", "backfill", "--channel", "news", "--since", "2024-01-01",
            "--page-size", "0",
        ])
        .is_err());
    }

    #[test]
    fn test_channels_subcommands() {
        let cli = Cli::try_parse_from(["chansync", "channels", "add", "@news", "clips"]).unwrap();
        match cli.command {
            Command::Channels {
                command: ChannelsCommand::Add { handles },
            } => assert_eq!(handles, vec!["news", "clips"]),
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["chansync", "channels", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Channels {
                command: ChannelsCommand::List
            }
        ));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["chansync"]).is_err());
    }
}
