//! # jenkinshift CLI
//!
//! ## Usage
//!
//! ```bash
//! jenkinshift --config ./config/jenkinshift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jenkinshift serve` | Start the BuildConfig HTTP facade |
//! | `jenkinshift check` | Print effective settings, probe Jenkins and the annotation store |
//!
//! `JENKINS_URL` and `PORT` override the configured Jenkins URL and listen
//! port. Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jenkinshift::annotations::configmap::ConfigMapStore;
use jenkinshift::annotations::AnnotationOverlay;
use jenkinshift::config;
use jenkinshift::jenkins::{JenkinsClient, JobClient};
use jenkinshift::server;

/// jenkinshift — serve OpenShift BuildConfigs backed by Jenkins jobs.
#[derive(Parser)]
#[command(name = "jenkinshift", version)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/jenkinshift.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` (or `PORT`) and serves the `oapi/v1`
    /// BuildConfig endpoints.
    Serve,

    /// Print the effective configuration, list Jenkins jobs, and check
    /// that the annotation store answers.
    Check,
}

/// ConfigMap fetched by `check` to confirm Kubernetes access.
const CHECK_CONFIG_MAP: &str = "fabric8";

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Check => {
            println!("jenkins.url          {}", cfg.jenkins.url);
            println!("server.bind          {}", cfg.server.bind);
            println!("kubernetes.api_url   {}", cfg.kubernetes.api_url);
            println!("kubernetes.namespace {}", cfg.kubernetes.namespace);

            let mut failed = false;
            let client = JenkinsClient::new(&cfg.jenkins)?;
            match client.list_jobs().await {
                Ok(jobs) => println!("jenkins jobs         {}", jobs.len()),
                Err(e) => {
                    println!("jenkins              error: {}", e);
                    failed = true;
                }
            }

            let store = ConfigMapStore::new(&cfg.kubernetes)?;
            let overlay = AnnotationOverlay::new(Arc::new(store));
            match overlay.probe(CHECK_CONFIG_MAP).await {
                Ok(true) => println!("annotation store     ok"),
                Ok(false) => println!(
                    "annotation store     ok (no {} ConfigMap)",
                    CHECK_CONFIG_MAP
                ),
                Err(e) => {
                    println!("annotation store     error: {}", e);
                    failed = true;
                }
            }

            if failed {
                bail!("check failed");
            }
        }
    }

    Ok(())
}
