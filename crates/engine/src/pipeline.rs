//! The repair pipeline for one namespace.
//!
//! `Scanned -> Diffed -> Extracted -> IndexRebuilt -> BackedUp -> Persisted
//! -> CacheSynced`, or a [`RepairError`] naming the last stage reached.
//! Everything is computed in memory before the backup; the index is written
//! before the cache lists.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chatmend_extractor::Extractor;
use chatmend_protocol::{SessionEntry, SessionIndex};
use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

use crate::backup::create_backup;
use crate::cache_sync::{PanelCache, SyncOutcome};
use crate::config::RepairOptions;
use crate::namespace::Namespace;
use crate::orphans::{self, OrphanCandidate, Recovery};
use crate::reconcile::{ExtractFailure, Reconciler};
use crate::store::Store;
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Scanned,
    Diffed,
    Extracted,
    IndexRebuilt,
    BackedUp,
    Persisted,
    CacheSynced,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanned => "scanned",
            Self::Diffed => "diffed",
            Self::Extracted => "extracted",
            Self::IndexRebuilt => "index-rebuilt",
            Self::BackedUp => "backed-up",
            Self::Persisted => "persisted",
            Self::CacheSynced => "cache-synced",
        };
        f.write_str(name)
    }
}

/// A namespace run that ended early
#[derive(Debug, Error)]
#[error("namespace {namespace} failed after {}: {source}", stage_label(.stage))]
pub struct RepairError {
    pub namespace: String,
    /// Last stage completed, if any
    pub stage: Option<Stage>,
    #[source]
    pub source: EngineError,
}

fn stage_label(stage: &Option<Stage>) -> String {
    match stage {
        Some(stage) => format!("stage {stage}"),
        None => "start".to_string(),
    }
}

/// Stage tracking for one namespace run.
pub(crate) struct Run<'a> {
    namespace: &'a str,
    stage: Option<Stage>,
}

impl<'a> Run<'a> {
    pub(crate) fn new(namespace: &'a str) -> Self {
        Self {
            namespace,
            stage: None,
        }
    }

    pub(crate) fn advance(&mut self, stage: Stage) {
        debug!(
            component = "pipeline",
            event = "pipeline.stage",
            namespace = %self.namespace,
            stage = %stage,
        );
        self.stage = Some(stage);
    }

    pub(crate) fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub(crate) fn fail(&self, err: impl Into<EngineError>) -> RepairError {
        RepairError {
            namespace: self.namespace.to_string(),
            stage: self.stage,
            source: err.into(),
        }
    }
}

/// Back up the store, then write the index, then both cache lists.
/// In a dry run the stages are passed without touching anything.
pub(crate) fn commit(
    run: &mut Run<'_>,
    store: &Store,
    index: &SessionIndex,
    cache: &PanelCache,
    dry_run: bool,
) -> Result<Option<PathBuf>, RepairError> {
    let backup = if dry_run {
        None
    } else {
        let path = create_backup(store.path(), &Local::now())
            .map_err(|err| run.fail(EngineError::Backup(err)))?;
        Some(path)
    };
    run.advance(Stage::BackedUp);

    if !dry_run {
        store.write_index(index).map_err(|err| run.fail(err))?;
    }
    run.advance(Stage::Persisted);

    if !dry_run {
        store.write_cache(cache).map_err(|err| run.fail(err))?;
    }
    run.advance(Stage::CacheSynced);
    Ok(backup)
}

/// What a repair run found and did
#[derive(Debug, Clone)]
pub struct RepairReport {
    pub namespace: String,
    pub stage: Stage,
    pub dry_run: bool,
    pub missing_from_index: BTreeSet<String>,
    pub orphaned_in_index: BTreeSet<String>,
    pub missing_from_cache: BTreeSet<String>,
    /// Orphans found in sibling namespaces, best candidate each
    pub recoverable: Vec<OrphanCandidate>,
    /// Files copied back; empty unless orphan recovery ran for real
    pub recovery: Recovery,
    /// Entries added for ids the index did not have
    pub restored: Vec<SessionEntry>,
    pub orphans_removed: Vec<String>,
    pub failures: Vec<ExtractFailure>,
    pub cache: SyncOutcome,
    pub backup: Option<PathBuf>,
}

/// Namespaces with sessions on disk that are out of sync. A namespace with
/// no record directory has nothing to rebuild from and is left alone.
pub fn repair_targets(all: &[Namespace]) -> impl Iterator<Item = &Namespace> {
    all.iter().filter(|ns| ns.has_sessions() && ns.needs_repair())
}

pub struct Repairer {
    extractor: Extractor,
    options: RepairOptions,
}

impl Repairer {
    pub fn new(extractor: Extractor, options: RepairOptions) -> Self {
        Self { extractor, options }
    }

    pub fn options(&self) -> RepairOptions {
        self.options
    }

    /// Repair every namespace [`repair_targets`] picks. A failure is
    /// reported against its namespace and the rest still run.
    pub fn repair_all<'a>(
        &self,
        all: &'a [Namespace],
    ) -> Vec<(&'a Namespace, Result<RepairReport, RepairError>)> {
        repair_targets(all).map(|ns| (ns, self.repair(ns, all))).collect()
    }

    /// Run the full pipeline on `ns`. `all` is the set of namespaces searched
    /// for orphan recovery.
    pub fn repair(&self, ns: &Namespace, all: &[Namespace]) -> Result<RepairReport, RepairError> {
        let opts = self.options;
        let mut run = Run::new(&ns.id);
        let sessions_dir = ns.sessions_dir();
        let store_path = ns.store_path();

        if !sessions_dir.is_dir() {
            return Err(run.fail(EngineError::MissingSessionsDir(sessions_dir)));
        }
        let store = if opts.dry_run {
            Store::open_read_only(&store_path)
        } else {
            Store::open(&store_path)
        }
        .map_err(|err| run.fail(err))?;
        run.advance(Stage::Scanned);

        let mut disk_ids = ns.disk_ids.clone();
        let recoverable = if opts.recover_orphans {
            orphans::resolve(ns, all)
        } else {
            Vec::new()
        };
        let recovery = if opts.recover_orphans && !opts.dry_run && !recoverable.is_empty() {
            orphans::recover(&sessions_dir, &recoverable)
        } else {
            Recovery::default()
        };
        disk_ids.extend(recovery.copied.iter().cloned());
        run.advance(Stage::Diffed);

        let existing = store.read_index().map_err(|err| run.fail(err))?;
        let rebuilt = Reconciler::new(&self.extractor).rebuild(
            &sessions_dir,
            &disk_ids,
            &existing,
            opts.remove_orphans,
        );
        run.advance(Stage::Extracted);
        run.advance(Stage::IndexRebuilt);

        // Every indexed session on disk is fed, so sessions indexed earlier
        // but never cached are closed too. Orphans are not.
        let mut cache = store.read_cache().map_err(|err| run.fail(err))?;
        let feed: Vec<SessionEntry> = rebuilt.entries_for(&disk_ids).collect();
        let synced = cache.sync(&feed).map_err(|err| run.fail(err))?;

        let backup = commit(&mut run, &store, &rebuilt.index, &cache, opts.dry_run)?;

        let restored = rebuilt
            .added
            .iter()
            .filter(|entry| rebuilt.restored.binary_search(&entry.session_id).is_ok())
            .cloned()
            .collect();

        info!(
            component = "pipeline",
            event = "pipeline.repaired",
            namespace = %ns.id,
            dry_run = opts.dry_run,
            restored = rebuilt.restored.len(),
            orphans_removed = rebuilt.orphans_removed.len(),
            recovered = recovery.copied.len(),
            cache_model_added = synced.model_added,
            cache_state_added = synced.state_added,
            failures = rebuilt.failures.len(),
        );

        Ok(RepairReport {
            namespace: ns.id.clone(),
            stage: run.stage().unwrap_or(Stage::CacheSynced),
            dry_run: opts.dry_run,
            missing_from_index: ns.missing_from_index(),
            orphaned_in_index: ns.orphaned_in_index(),
            missing_from_cache: ns.missing_from_cache(),
            recoverable,
            recovery,
            restored,
            orphans_removed: rebuilt.orphans_removed,
            failures: rebuilt.failures,
            cache: synced,
            backup,
        })
    }
}
