//! Duplicate namespace merging.
//!
//! A project reopened after a storage migration gets a fresh namespace, and
//! its earlier sessions stay behind in the old one. Namespaces recorded for
//! the same project URI are grouped; the one whose store was written most
//! recently is active, and every session only the stale ones hold is copied
//! into it. Stale namespaces are never modified.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use chatmend_extractor::Extractor;
use chatmend_protocol::{SessionEntry, SessionIndex};
use tracing::info;

use crate::cache_sync::SyncOutcome;
use crate::namespace::Namespace;
use crate::orphans::{copy_session, Recovery};
use crate::pipeline::{commit, RepairError, Run, Stage};
use crate::reconcile::{ExtractFailure, Reconciler, Reconciliation};
use crate::store::Store;
use crate::EngineError;

/// A stale namespace and the sessions it contributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleNamespace {
    pub id: String,
    pub sessions_dir: PathBuf,
    /// Its on-disk ids the active namespace lacks
    pub contributes: BTreeSet<String>,
}

/// What merging one project group will do
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Project URI shared by the group
    pub identity: String,
    pub project_name: String,
    pub active: Namespace,
    /// Most recently written first
    pub stale: Vec<StaleNamespace>,
    /// Union of the stale contributions
    pub to_merge: BTreeSet<String>,
}

impl MergePlan {
    pub fn is_noop(&self) -> bool {
        self.to_merge.is_empty()
    }
}

/// What applying a plan did
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub identity: String,
    pub active: String,
    pub stage: Stage,
    pub dry_run: bool,
    /// Files copied; empty in a dry run
    pub recovery: Recovery,
    /// Index entries added for merged sessions; previews in a dry run
    pub added: Vec<SessionEntry>,
    pub failures: Vec<ExtractFailure>,
    pub cache: SyncOutcome,
    pub backup: Option<PathBuf>,
}

/// Group namespaces by project and plan a merge for every group of two or
/// more. Groups come out in URI order.
pub fn plan(all: &[Namespace]) -> Vec<MergePlan> {
    let mut groups: BTreeMap<&str, Vec<&Namespace>> = BTreeMap::new();
    for ns in all {
        if let Some(project) = &ns.project {
            groups.entry(project.uri()).or_default().push(ns);
        }
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(identity, mut members)| {
            // Newest store first; no store sorts last; ties by id.
            members.sort_by(|a, b| {
                b.store_modified
                    .cmp(&a.store_modified)
                    .then_with(|| a.id.cmp(&b.id))
            });
            let active = members[0];
            let stale: Vec<StaleNamespace> = members[1..]
                .iter()
                .map(|ns| StaleNamespace {
                    id: ns.id.clone(),
                    sessions_dir: ns.sessions_dir(),
                    contributes: ns.disk_ids.difference(&active.disk_ids).cloned().collect(),
                })
                .collect();
            let to_merge = stale
                .iter()
                .flat_map(|s| s.contributes.iter().cloned())
                .collect();

            MergePlan {
                identity: identity.to_string(),
                project_name: active.project_name(),
                active: active.clone(),
                stale,
                to_merge,
            }
        })
        .collect()
}

pub struct Merger {
    extractor: Extractor,
}

impl Merger {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Copy the plan's sessions into the active namespace, then index and
    /// cache exactly the ids that were merged.
    ///
    /// A dry run copies nothing: planned ids are extracted from their stale
    /// source and every stage runs in memory, without a backup or writes.
    pub fn apply(&self, plan: &MergePlan, dry_run: bool) -> Result<MergeOutcome, RepairError> {
        let active = &plan.active;
        let mut run = Run::new(&active.id);
        let mut outcome = MergeOutcome {
            identity: plan.identity.clone(),
            active: active.id.clone(),
            stage: Stage::Scanned,
            dry_run,
            recovery: Recovery::default(),
            added: Vec::new(),
            failures: Vec::new(),
            cache: SyncOutcome::default(),
            backup: None,
        };

        // Checked before copying so a missing store leaves the group untouched.
        let store = if dry_run {
            Store::open_read_only(&active.store_path())
        } else {
            Store::open(&active.store_path())
        }
        .map_err(|err| run.fail(err))?;
        run.advance(Stage::Scanned);
        run.advance(Stage::Diffed);
        outcome.stage = Stage::Diffed;
        if plan.is_noop() {
            return Ok(outcome);
        }

        let existing = store.read_index().map_err(|err| run.fail(err))?;
        let (extended, merged) = if dry_run {
            (self.preview(plan, existing), plan.to_merge.clone())
        } else {
            let target = active.sessions_dir();
            fs::create_dir_all(&target).map_err(|err| run.fail(EngineError::Io(err)))?;
            for stale in &plan.stale {
                for id in &stale.contributes {
                    outcome.recovery.merge(copy_session(id, &stale.sessions_dir, &target));
                }
            }
            let extended =
                Reconciler::new(&self.extractor).extend(&target, existing, &outcome.recovery.copied);
            (extended, outcome.recovery.copied.clone())
        };
        run.advance(Stage::Extracted);
        run.advance(Stage::IndexRebuilt);

        // Merged ids the index already held as orphans are back on disk now
        // and need their cache entries too.
        let mut cache = store.read_cache().map_err(|err| run.fail(err))?;
        let feed: Vec<SessionEntry> = extended.entries_for(&merged).collect();
        outcome.cache = cache.sync(&feed).map_err(|err| run.fail(err))?;
        outcome.backup = commit(&mut run, &store, &extended.index, &cache, dry_run)?;
        outcome.stage = Stage::CacheSynced;
        outcome.added = extended.added;
        outcome.failures = extended.failures;

        info!(
            component = "merge",
            event = "merge.applied",
            identity = %plan.identity,
            active = %active.id,
            dry_run,
            files_copied = outcome.recovery.files_copied,
            added = outcome.added.len(),
            cache_model_added = outcome.cache.model_added,
            copy_failures = outcome.recovery.failures.len(),
        );
        Ok(outcome)
    }

    /// Index the planned ids straight from the stale namespaces, each from
    /// the first source that holds it, the same one a real merge copies.
    fn preview(&self, plan: &MergePlan, mut index: SessionIndex) -> Reconciliation {
        let reconciler = Reconciler::new(&self.extractor);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut out = Reconciliation::default();
        for stale in &plan.stale {
            let ids: BTreeSet<String> = stale
                .contributes
                .iter()
                .filter(|id| seen.insert((*id).clone()))
                .cloned()
                .collect();
            if ids.is_empty() {
                continue;
            }
            let part = reconciler.extend(&stale.sessions_dir, index, &ids);
            index = part.index;
            out.added.extend(part.added);
            out.restored.extend(part.restored);
            out.failures.extend(part.failures);
        }
        out.added.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        out.restored.sort();
        out.index = index;
        out
    }
}
