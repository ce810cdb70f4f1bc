//! cluster-lease: inspect and maintain the shared cluster lease registry
//!
//! Lists leases, shows the cached cluster, and reconciles the registry with
//! Databricks so stale entries never hand out dead clusters.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cluster_lease_common::LeaseConfig;
use cluster_lease_coordinator::lease::{LeaseCoordinator, SweepOptions};
use cluster_lease_coordinator::provider::{DatabricksConfig, DatabricksProvider, RetryingProvider};
use cluster_lease_coordinator::state::{self, DbPool};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cluster-lease")]
#[command(about = "Shared cluster lease registry maintenance")]
#[command(version)]
struct Args {
    /// Registry database path (default: platform data dir)
    #[arg(long, global = true, env = "CLUSTER_LEASE_DB")]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, env = "CLUSTER_LEASE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered leases
    List,

    /// Show the single-slot cluster cache
    CacheInfo,

    /// Remove stale leases and reap abandoned clusters
    Sweep {
        /// Report findings without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Also delete expired idle clusters owned by other processes
        #[arg(long)]
        reap_foreign: bool,

        /// Keep sweeping every N seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Remove failed leases older than the given age
    Prune {
        #[arg(long, default_value = "24")]
        older_than_hours: u64,
    },

    /// Empty the cluster cache without deleting the cluster
    ClearCache,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(suggestion) = e
        .downcast_ref::<cluster_lease_coordinator::ProviderError>()
        .and_then(|pe| pe.suggestion())
    {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {suggestion}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => LeaseConfig::load(path)?,
        None => LeaseConfig::default(),
    };
    if let Some(db) = args.db {
        config.db_path = Some(db);
    }

    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => state::default_db_path()?,
    };
    let pool = state::open_db(&db_path, config.busy_timeout())
        .await
        .with_context(|| format!("Failed to open lease registry at {}", db_path.display()))?;

    match args.command {
        Command::List => state::list_lease_records(&pool).await?,
        Command::CacheInfo => state::show_cache_info(&pool).await?,
        Command::ClearCache => state::clear_cache_slot(&pool).await?,
        Command::Prune { older_than_hours } => {
            let pruned = state::prune_failed(&pool, prune_age(older_than_hours)).await?;
            println!("Pruned {pruned} failed lease(s)");
        }
        Command::Sweep {
            dry_run,
            reap_foreign,
            watch,
        } => {
            let options = SweepOptions {
                dry_run,
                reap_foreign,
            };
            handle_sweep(pool, config, options, watch).await?;
        }
    }

    Ok(())
}

/// Age cutoff for `prune`, saturating for absurd hour counts
fn prune_age(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Handle the sweep command
async fn handle_sweep(
    pool: DbPool,
    config: LeaseConfig,
    options: SweepOptions,
    watch: Option<u64>,
) -> Result<()> {
    let databricks = DatabricksProvider::new(DatabricksConfig::from_env()?)?;
    let coordinator = LeaseCoordinator::new(pool, RetryingProvider::new(databricks), config);

    let Some(interval) = watch else {
        return sweep_once(&coordinator, options).await;
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping sweep");
            on_signal.cancel();
        }
    });

    info!(interval_secs = interval, "Sweeping until interrupted");
    loop {
        if let Err(e) = sweep_once(&coordinator, options).await {
            warn!(error = ?e, "Sweep pass failed");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
    }

    Ok(())
}

async fn sweep_once(
    coordinator: &LeaseCoordinator<RetryingProvider<DatabricksProvider>>,
    options: SweepOptions,
) -> Result<()> {
    let report = coordinator.sweep(options).await?;

    if report.is_empty() {
        println!("Registry is clean");
        return Ok(());
    }

    println!("{}", report.to_table());
    println!(
        "\n{} finding(s), {} removed, {} teardown failure(s)",
        report.findings.len(),
        report.removed(),
        report.failed()
    );
    if options.dry_run {
        println!("Dry run: nothing was changed.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_age() {
        assert_eq!(prune_age(24), Duration::from_secs(86_400));
        assert_eq!(prune_age(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_prune_args_accept_huge_age() {
        let args = Args::try_parse_from([
            "cluster-lease",
            "prune",
            "--older-than-hours",
            "18446744073709551615",
        ])
        .unwrap();
        match args.command {
            Command::Prune { older_than_hours } => assert_eq!(older_than_hours, u64::MAX),
            other => panic!("expected prune, got {other:?}"),
        }
    }
}
