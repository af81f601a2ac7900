//! CLI definition and the `serve` flow.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::service::Service;
use crate::web::{self, AppState};

/// Continuous integration feedback for Stash pull requests.
#[derive(Parser, Debug)]
#[command(name = "uroboros")]
#[command(about = "Build, test and lint Stash pull requests and report back as comments")]
#[command(version)]
#[command(
    long_about = "uroboros accepts Stash pull-request URLs over HTTP, checks out the source branch, \
runs the Go toolchain and the configured linters, and posts the result as a pull-request comment.\n\n\
Example usage:\n  uroboros --config /etc/uroboros/uroboros.yaml --listen 0.0.0.0:8080"
)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "UROBOROS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Listen address, overrides `web.listen`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Number of workers, overrides `tasks.threads`.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Applies command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(listen) = &self.listen {
            config = config.with_listen(listen.clone());
        }
        if let Some(threads) = self.threads {
            config = config.with_threads(threads);
        }
        config
    }
}

/// Parse CLI arguments without running any command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the service.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the service with the parsed arguments.
///
/// Returns after Ctrl-C once in-flight tasks have finished or the shutdown
/// timeout has passed.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("can't load configuration from {}", cli.config.display()))?;
    let config = cli.apply_overrides(config);
    config.validate().context("invalid configuration")?;

    info!(
        config = %cli.config.display(),
        listen = %config.web.listen,
        stash = %config.stash.address,
        threads = config.tasks.threads,
        linters = config.linters.len(),
        "Starting uroboros"
    );

    let mut service = Service::from_config(&config)?;
    service.start()?;

    let listener = TcpListener::bind(&config.web.listen)
        .await
        .with_context(|| format!("can't listen on {}", config.web.listen))?;

    let state = AppState::new(std::sync::Arc::clone(service.queue()));
    let served = web::serve(listener, state, shutdown_signal()).await;

    let stopped = service.shutdown().await;
    served.context("HTTP server failed")?;
    stopped?;

    let stats = service.stats();
    info!(
        served = stats.served,
        succeeded = stats.succeeded,
        failed = stats.failed,
        success_rate = format!("{:.1}%", stats.success_rate()),
        average_ms = stats.average_job_duration.as_millis() as u64,
        "uroboros stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(err) => warn!(error = %err, "Can't listen for Ctrl-C, shutting down"),
    }
}
