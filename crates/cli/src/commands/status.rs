//! Status command - show the cached report and whether a run is active

use anyhow::{Context, Result};
use feedloom_adapters::{lock::FileRunLock, reports::ReportFiles};
use feedloom_domain::{LockError, RunLock};
use std::path::PathBuf;

use crate::config::AppConfig;

pub async fn execute(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?.with_data_dir(data_dir);
    let data_dir = &config.general.data_dir;

    // Probing the lock is harmless: the guard is dropped right away
    match FileRunLock::new(data_dir).try_acquire() {
        Ok(_) => {}
        Err(LockError::AlreadyRunning { holder }) => match holder {
            Some(h) => println!("Update in progress (pid {}, since {})", h.pid, h.started_at),
            None => println!("Update in progress"),
        },
        Err(e) => tracing::warn!(error = %e, "Could not check run lock"),
    }

    let report = ReportFiles::new(data_dir)
        .read_report()
        .await
        .context("Failed to read cached report")?;

    match report {
        Some(markdown) => println!("{}", markdown),
        None => println!("No update report yet. Run 'feedloom update' first."),
    }

    Ok(())
}
