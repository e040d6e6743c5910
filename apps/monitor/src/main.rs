//! blockwatch entry point.
//!
//! Follows a Minecraft server log and pushes join/leave/whitelist alerts to
//! ntfy or a Discord webhook. Configured entirely through environment
//! variables; exits non-zero on bad configuration or a permanently
//! unreadable log file.

mod app;
mod config;

use blockwatch_follow::LogFollower;
use blockwatch_notify::Notifier;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

fn main() -> anyhow::Result<()> {
    // Pick up a local .env if present, then initialize structured logging.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting blockwatch");

    let config = Config::from_env()?;
    tracing::info!(
        log_file = %config.log_file.display(),
        service = config.backend.name(),
        subject = %config.subject,
        join = config.notify_join,
        leave = config.notify_leave,
        whitelist = config.notify_whitelist,
        "configuration loaded"
    );

    let notifier = app::build_notifier(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, notifier))?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn run(config: Config, notifier: Notifier) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let follower = LogFollower::new(config.log_file.clone(), cancel.clone());

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    app::run(&config, &notifier, follower).await?;
    Ok(())
}
