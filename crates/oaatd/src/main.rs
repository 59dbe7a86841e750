//! oaatd: the one-at-a-time operator daemon.
//!
//! Runs every item of an `OaatGroup` as a Kubernetes pod, one at a time:
//! - Group loop: validates groups, picks the next item, starts its pod
//! - Pod watcher: records job phases, results and runtimes
//!
//! # Usage
//!
//! ```text
//! oaatd crds | kubectl apply -f -
//! oaatd run --config /etc/oaat/operator.toml --namespace jobs
//! ```

mod crd;
mod due;
mod error;
mod kube_pods;
mod operator;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::Pod;
use tokio::sync::watch;
use tracing::info;

use oaat_core::OperatorConfig;

use crate::kube_pods::KubePods;
use crate::operator::Operator;
use crate::store::{KubeGroups, scoped};

#[derive(Parser)]
#[command(name = "oaatd", about = "One-at-a-time operator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the operator against the current cluster context.
    Run {
        /// Operator configuration file (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only manage groups in this namespace.
        #[arg(long)]
        namespace: Option<String>,

        /// Group scan interval in seconds.
        #[arg(long, default_value = "5")]
        scan_interval: u64,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the custom resource definitions.
    Crds,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = matches!(cli.command, Command::Run { log_json: true, .. });
    init_tracing(json);

    match cli.command {
        Command::Run {
            config,
            namespace,
            scan_interval,
            ..
        } => run(config.as_deref(), namespace, scan_interval).await,
        Command::CheckConfig { config } => {
            let config = OperatorConfig::from_file(&config)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Crds => {
            println!("{}", serde_json::to_string_pretty(&crd::crd_list())?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,oaatd=debug,oaat=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: Option<&Path>, namespace: Option<String>, scan_interval: u64) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => {
            let config = OperatorConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            config
        }
        None => OperatorConfig::default(),
    };
    config.validate()?;

    let client = kube::Client::try_default().await?;
    info!(namespace = ?namespace, "kubernetes client ready");
    let pods = scoped::<Pod>(&client, namespace.as_deref());
    let store = KubeGroups::new(client.clone(), namespace);
    let operator = Arc::new(Operator::new(store, KubePods::new(client), &config)?);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let groups_handle = tokio::spawn(
        operator
            .clone()
            .run_groups(Duration::from_secs(scan_interval.max(1)), shutdown_rx.clone()),
    );
    let pods_handle = tokio::spawn(operator.watch_pods(pods, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = groups_handle.await;
    let _ = pods_handle.await;

    info!("oaatd stopped");
    Ok(())
}
