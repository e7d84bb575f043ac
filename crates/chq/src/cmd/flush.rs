//! Flush command - One forced sweep, then exit
//!
//! Loads every staging file and unloaded snapshot in the staging directory.
//! Run it only while no daemon is using the same directory.

use anyhow::Result;
use chq_config::Config;
use chq_flush::{SweepKind, SweepReport};
use tracing::info;

use crate::engine::Engine;

/// Run the flush command
pub async fn run(config: Config) -> Result<()> {
    let engine = Engine::build(&config).await?;
    let report = sweep(&engine).await?;
    engine.staging.close();

    info!(
        flushed = report.flushed,
        recovered = report.recovered,
        failed = report.failed,
        rows = report.rows,
        "flush complete"
    );

    if report.failed > 0 {
        anyhow::bail!(
            "{} load(s) failed; their data is kept in {}",
            report.failed,
            config.staging.path.display()
        );
    }
    Ok(())
}

async fn sweep(engine: &Engine) -> Result<SweepReport> {
    engine
        .scheduler
        .sweep(SweepKind::Forced)
        .await
        .ok_or_else(|| anyhow::anyhow!("a forced sweep is already running"))
}
