use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use netzcam_scraper::config::{Cli, Config};
use netzcam_scraper::poll::{PollError, Poller};
use netzcam_scraper::source::{HttpFetcher, Source};
use netzcam_scraper::store::ImageStore;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Startup validation already logged its own error line.
        if !matches!(e.downcast_ref::<PollError>(), Some(PollError::UnreachableSources(_))) {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_cli(Cli::parse())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.filter_directive())),
        )
        .init();

    if !config.duplicate_names.is_empty() {
        warn!(names = ?config.duplicate_names, "camera names given more than once, polling each once");
    }

    config.prepare_output_dir()?;

    let fetcher = HttpFetcher::new(config.timeout).context("failed to build HTTP client")?;
    let sources = config
        .names
        .iter()
        .map(|name| Source::new(&config.project, name));
    let mut poller = Poller::new(
        fetcher,
        ImageStore::new(&config.output_dir),
        sources,
        config.interval,
    );

    if let Err(e) = poller.validate().await {
        error!(error = %e, "invalid project or name");
        return Err(e.into());
    }

    info!(
        project = config.project,
        sources = ?poller.sources().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        output_dir = %config.output_dir.display(),
        interval_secs = config.interval.as_secs(),
        "starting netzcam scraper"
    );

    poller.run(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C.  If the handler can't be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
