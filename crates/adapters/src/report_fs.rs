//! Report files in the data directory

use feedloom_domain::usecases::DigestSnapshot;
use std::path::{Path, PathBuf};
use tokio::fs;

const REPORT_FILE: &str = "latest_update.md";
const SNAPSHOT_FILE: &str = "last_digest.json";

#[derive(Debug, thiserror::Error)]
pub enum ReportFsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads and writes the cached report and the digest snapshot
#[derive(Debug, Clone)]
pub struct ReportFiles {
    dir: PathBuf,
}

impl ReportFiles {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub async fn write_report(&self, markdown: &str) -> Result<PathBuf, ReportFsError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.report_path();
        write_atomic(&path, markdown.as_bytes()).await?;
        tracing::debug!(path = %path.display(), "Wrote report");
        Ok(path)
    }

    /// Cached report from the previous run, if any
    pub async fn read_report(&self) -> Result<Option<String>, ReportFsError> {
        match fs::read_to_string(self.report_path()).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Previous digest snapshot. A missing or unreadable snapshot counts as
    /// empty, so every subscription shows up as changed.
    pub async fn read_snapshot(&self) -> DigestSnapshot {
        let body = match fs::read_to_string(self.snapshot_path()).await {
            Ok(body) => body,
            Err(_) => return DigestSnapshot::new(),
        };

        serde_json::from_str(&body).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable digest snapshot");
            DigestSnapshot::new()
        })
    }

    pub async fn write_snapshot(&self, snapshot: &DigestSnapshot) -> Result<(), ReportFsError> {
        fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.snapshot_path(), &body).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await
}
