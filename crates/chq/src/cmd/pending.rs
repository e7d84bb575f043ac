//! Pending command - List staging files and unloaded snapshots

use anyhow::{Context, Result};
use chq_config::Config;
use chq_staging::{PendingFile, PendingKind, StagingArea};

/// Run the pending command
pub async fn run(config: Config) -> Result<()> {
    let staging = StagingArea::open(&config.staging)
        .await
        .context("failed to open staging directory")?;
    let files = staging
        .inventory()
        .await
        .context("failed to list staging directory")?;

    if files.is_empty() {
        println!("nothing pending in {}", staging.dir().display());
        return Ok(());
    }

    println!("{:<9} {:<32} {:>12}  PATH", "KIND", "DESTINATION", "BYTES");
    for file in &files {
        println!("{}", format_row(file));
    }

    let total: u64 = files.iter().map(|f| f.bytes).sum();
    println!("{} file(s), {} bytes", files.len(), total);
    Ok(())
}

fn format_row(file: &PendingFile) -> String {
    let kind = match file.kind {
        PendingKind::Active => "active",
        PendingKind::Snapshot => "snapshot",
    };
    format!(
        "{:<9} {:<32} {:>12}  {}",
        kind,
        file.destination,
        file.bytes,
        file.path.display()
    )
}
