//! feedloom adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `store`: SQLite and in-memory item stores
//! - `lock`: File and in-process run locks
//! - `sources`: Per-platform source adapters and the adapter registry
//! - `classify`: Category classifiers (keyword, OpenAI-compatible, command)
//! - `reports`: Report and digest snapshot files

pub mod classify;
pub mod feed;
pub mod http;
mod report_fs;
mod run_lock;
pub mod sources;
mod store_memory;
mod store_sqlite;

/// Re-exports for item store adapters
pub mod store {
    pub use crate::store_memory::InMemoryItemStore;
    pub use crate::store_sqlite::SqliteItemStore;
}

/// Re-exports for run lock adapters
pub mod lock {
    pub use crate::run_lock::{FileRunLock, InProcessRunLock};
}

/// Re-exports for report files
pub mod reports {
    pub use crate::report_fs::{ReportFiles, ReportFsError};
}
