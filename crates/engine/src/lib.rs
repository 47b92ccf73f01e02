//! chatmend Engine
//!
//! Reconciles each namespace's session index and panel cache against the
//! session records on disk, recovers orphans from sibling namespaces, and
//! merges namespaces that belong to the same project.
//!
//! Precondition for every mutating call: the consumer application that owns
//! the store is not running. There is no locking protocol with it.

pub mod backup;
pub mod cache_sync;
pub mod config;
pub mod merge;
pub mod namespace;
pub mod orphans;
pub mod pipeline;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod fixtures;

use std::path::PathBuf;

use thiserror::Error;

pub use cache_sync::{PanelCache, SyncOutcome};
pub use config::{RepairOptions, StorageConfig, Variant};
pub use merge::{MergeOutcome, MergePlan, Merger};
pub use namespace::{scan_storage, Namespace, ProjectIdentity};
pub use orphans::{CopyFailure, OrphanCandidate, Recovery};
pub use pipeline::{repair_targets, RepairError, RepairReport, Repairer, Stage};
pub use reconcile::{ExtractFailure, Reconciler, Reconciliation};
pub use store::Store;

/// Errors from reading or writing a namespace's `state.vscdb`
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not found: {0}")]
    Missing(PathBuf),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("value for {key} is not valid UTF-8")]
    NotUtf8 { key: String },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that end work on one namespace
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("session directory missing: {0}")]
    MissingSessionsDir(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("backup failed: {0}")]
    Backup(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
