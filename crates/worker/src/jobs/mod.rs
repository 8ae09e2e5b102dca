pub mod backfill;
pub mod channels;
pub mod monitor;
pub mod window;

use anyhow::{bail, Context as _, Result};
use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::{DateTime, Utc};
use clap::Args;
use db::PgStore;
use engine::config::{parse_date, Settings};
use engine::{register_all, Pacing, PollScheduler, RunMode, SyncPolicy};
use gateway::GatewayClient;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct Context {
    pub settings: Settings,
    pub store: PgStore,
    pub source: GatewayClient,
}

impl Context {
    pub async fn connect(settings: Settings) -> Result<Self> {
        let pool = connect_db(&settings).await?;
        db::MIGRATOR
            .run(&pool)
            .await
            .context("running migrations")?;
        let source = GatewayClient::new(&settings.gateway_url, settings.session.clone())
            .context("building gateway client")?;
        Ok(Self {
            settings,
            store: PgStore::new(pool),
            source,
        })
    }
}

async fn connect_db(settings: &Settings) -> Result<PgPool> {
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(settings.db_connect_timeout),
        ..Default::default()
    };

    loop {
        let attempt = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .connect(&settings.database_url)
            .await;
        match attempt {
            Ok(pool) => return Ok(pool),
            Err(err) => match backoff.next_backoff() {
                Some(delay) => {
                    warn!(error = %err, ?delay, "database unavailable, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err).context("connecting to database"),
            },
        }
    }
}

/// Flags shared by the long-running poll drivers.
#[derive(Debug, Clone, Default, Args)]
pub struct PollArgs {
    /// Only poll these channels (registered if absent). Repeatable.
    #[arg(long = "channel", value_parser = parse_handle)]
    pub channels: Vec<String>,
    /// Seconds between iteration starts.
    #[arg(long)]
    pub interval: Option<u64>,
    /// Seconds between consecutive channel calls.
    #[arg(long)]
    pub channel_delay: Option<u64>,
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub page_size: Option<usize>,
}

impl PollArgs {
    pub fn pacing(&self, settings: &Settings) -> Pacing {
        Pacing {
            interval: self
                .interval
                .map(Duration::from_secs)
                .unwrap_or(settings.poll_interval),
            channel_delay: self
                .channel_delay
                .map(Duration::from_secs)
                .unwrap_or(settings.channel_delay),
        }
    }

    pub fn policy(&self, settings: &Settings) -> SyncPolicy {
        SyncPolicy::new(self.page_size.unwrap_or(settings.page_size))
            .with_excluded_views(settings.excluded_views)
    }
}

/// Run `mode` as a poll loop until shutdown or a fatal error.
pub async fn poll(ctx: &Context, args: PollArgs, mode: RunMode) -> Result<()> {
    let pacing = args.pacing(&ctx.settings);
    let policy = args.policy(&ctx.settings);

    let mut scheduler = PollScheduler::new(&ctx.source, &ctx.store, policy, pacing)
        .with_shutdown(shutdown_signal());
    if !args.channels.is_empty() {
        let registered = register_all(&ctx.source, &ctx.store, &args.channels).await?;
        if registered.handles.is_empty() {
            bail!(
                "none of the requested channels exist upstream: {}",
                registered.missing.join(", ")
            );
        }
        scheduler = scheduler.with_channels(registered.handles);
    }

    info!(
        mode = mode.name,
        interval_secs = pacing.interval.as_secs(),
        channel_delay_secs = pacing.channel_delay.as_secs(),
        "monitor started"
    );
    let state = scheduler
        .run(&mode)
        .await
        .with_context(|| format!("{} loop failed", mode.name))?;
    info!(mode = mode.name, iterations = state.iteration, "monitor stopped");
    Ok(())
}

/// Flips to `true` on ctrl-c or SIGTERM.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested, finishing current channel");
        let _ = tx.send(true);
    });
    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Accepts `name` or `@name`.
pub fn parse_handle(value: &str) -> Result<String, String> {
    let handle = value.trim().trim_start_matches('@');
    if handle.is_empty() || handle.contains(char::is_whitespace) {
        return Err(format!("invalid channel handle: {:?}", value));
    }
    Ok(handle.to_string())
}

pub fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date(value).ok_or_else(|| format!("expected YYYY-MM-DD, got {:?}", value))
}
