//! Index reconciliation: bring a namespace's session index in line with the
//! records on disk.
//!
//! Only ids absent from the starting index are extracted; entries already
//! present are carried over untouched, unknown fields included.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chatmend_extractor::{Extractor, FailureReason};
use chatmend_protocol::{SessionEntry, SessionIndex};
use tracing::{info, warn};

/// One session that could not be summarized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractFailure {
    pub session_id: String,
    pub reason: FailureReason,
    pub message: String,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// The new index, ready to persist
    pub index: SessionIndex,
    /// Entries extracted and inserted by this pass, in id order
    pub added: Vec<SessionEntry>,
    /// Added ids that the previous index did not have
    pub restored: Vec<String>,
    /// Previously indexed ids with no record on disk that were dropped
    pub orphans_removed: Vec<String>,
    pub failures: Vec<ExtractFailure>,
}

impl Reconciliation {
    /// Entries of the new index whose id is in `ids`.
    pub fn entries_for<'a>(&'a self, ids: &'a BTreeSet<String>) -> impl Iterator<Item = SessionEntry> + 'a {
        ids.iter().filter_map(|id| self.index.get(id))
    }
}

pub struct Reconciler<'a> {
    extractor: &'a Extractor,
}

impl<'a> Reconciler<'a> {
    pub fn new(extractor: &'a Extractor) -> Self {
        Self { extractor }
    }

    /// Full rebuild over every id on disk.
    ///
    /// Without `remove_orphans` the existing entries are the starting point and
    /// orphans survive; with it, the rebuild starts empty and every on-disk id
    /// is extracted afresh.
    pub fn rebuild(
        &self,
        sessions_dir: &Path,
        disk_ids: &BTreeSet<String>,
        existing: &SessionIndex,
        remove_orphans: bool,
    ) -> Reconciliation {
        let (start, orphans_removed) = if remove_orphans {
            let orphans = existing
                .ids()
                .filter(|id| !disk_ids.contains(*id))
                .map(str::to_string)
                .collect();
            let empty = SessionIndex {
                entries: BTreeMap::new(),
                ..existing.clone()
            };
            (empty, orphans)
        } else {
            (existing.clone(), Vec::new())
        };

        let mut out = self.insert_missing(sessions_dir, start, disk_ids, existing);
        out.orphans_removed = orphans_removed;

        info!(
            component = "reconcile",
            event = "reconcile.rebuilt",
            sessions_dir = %sessions_dir.display(),
            restored = out.restored.len(),
            orphans_removed = out.orphans_removed.len(),
            failures = out.failures.len(),
            remove_orphans,
        );
        out
    }

    /// Restricted update: add only `ids`, leaving everything else as is.
    pub fn extend(
        &self,
        sessions_dir: &Path,
        existing: SessionIndex,
        ids: &BTreeSet<String>,
    ) -> Reconciliation {
        let previous = existing.clone();
        let out = self.insert_missing(sessions_dir, existing, ids, &previous);
        info!(
            component = "reconcile",
            event = "reconcile.extended",
            sessions_dir = %sessions_dir.display(),
            requested = ids.len(),
            added = out.added.len(),
            failures = out.failures.len(),
        );
        out
    }

    fn insert_missing(
        &self,
        sessions_dir: &Path,
        mut index: SessionIndex,
        ids: &BTreeSet<String>,
        previous: &SessionIndex,
    ) -> Reconciliation {
        let mut out = Reconciliation::default();

        for id in ids {
            if index.contains(id) {
                continue;
            }
            match self.extractor.extract(sessions_dir, id) {
                Ok(entry) => {
                    index.insert(&entry);
                    if !previous.contains(id) {
                        out.restored.push(id.clone());
                    }
                    out.added.push(entry);
                }
                Err(err) => {
                    warn!(
                        component = "reconcile",
                        event = "reconcile.extract_failed",
                        session_id = %id,
                        reason = ?err.reason(),
                        error = %err,
                    );
                    out.failures.push(ExtractFailure {
                        session_id: id.clone(),
                        reason: err.reason(),
                        message: err.to_string(),
                    });
                }
            }
        }

        out.index = index;
        out
    }
}
