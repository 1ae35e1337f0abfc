//! costar - GitHub repository recommendations from stargazer co-occurrence
//!
//! This binary loads a configuration, runs the recommendation pipeline for
//! one user and writes the ranked results as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use costar_core::RunConfig;
use tokio_util::sync::CancellationToken;

mod args;
mod logging;

use args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level, args.log_json)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting costar");

    let mut config = if let Some(config_path) = &args.config {
        RunConfig::load_from(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        RunConfig::load().context("failed to load configuration")?
    };
    args.apply(&mut config);

    tracing::debug!(
        user = %config.user.login,
        source = ?config.source.kind,
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = costar_core::run(config, cancel)
        .await
        .context("recommendation run failed")?;

    let total: usize = outcome.report.recommendations.values().map(Vec::len).sum();
    tracing::info!(
        seeds = outcome.report.seeds.len(),
        recommendations = total,
        skipped_neighbors = outcome.report.traversal.skipped_neighbors,
        "costar run complete"
    );
    println!("{}", outcome.written.latest.display());
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, cancelling run");
        cancel.cancel();
    }
}
