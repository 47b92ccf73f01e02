//! Orphan recovery: find an orphaned session's record in a sibling namespace
//! and copy it back.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chatmend_extractor::record_files;
use tracing::{info, warn};

use crate::namespace::Namespace;

/// A sibling namespace that holds a record for an orphaned id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCandidate {
    pub session_id: String,
    pub source_namespace: String,
    pub source_sessions_dir: PathBuf,
    /// Both namespaces look like the same project
    pub same_project: bool,
}

/// A file that could not be copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    pub session_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: String,
}

/// Result of copying sessions into a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Ids for which at least one record file was copied
    pub copied: BTreeSet<String>,
    pub files_copied: usize,
    /// Destination files that already existed and were left alone
    pub files_skipped: usize,
    pub failures: Vec<CopyFailure>,
}

impl Recovery {
    pub fn merge(&mut self, other: Recovery) {
        self.copied.extend(other.copied);
        self.files_copied += other.files_copied;
        self.files_skipped += other.files_skipped;
        self.failures.extend(other.failures);
    }
}

/// Every sibling namespace holding `session_id` on disk, same-project
/// candidates first, scan order otherwise.
pub fn candidates(session_id: &str, target: &Namespace, all: &[Namespace]) -> Vec<OrphanCandidate> {
    let mut found: Vec<OrphanCandidate> = all
        .iter()
        .filter(|ns| ns.id != target.id && ns.disk_ids.contains(session_id))
        .map(|ns| OrphanCandidate {
            session_id: session_id.to_string(),
            source_namespace: ns.id.clone(),
            source_sessions_dir: ns.sessions_dir(),
            same_project: target.same_project(ns),
        })
        .collect();
    // Stable: ties keep scan order.
    found.sort_by_key(|c| !c.same_project);
    found
}

/// Best candidate for each of `target`'s orphans; orphans found nowhere are
/// left out.
pub fn resolve(target: &Namespace, all: &[Namespace]) -> Vec<OrphanCandidate> {
    target
        .orphaned_in_index()
        .iter()
        .filter_map(|id| candidates(id, target, all).into_iter().next())
        .collect()
}

/// Copy each candidate's record files into `target_dir`.
///
/// Sources are never modified, existing destinations never overwritten, and
/// a failed copy does not stop the rest.
pub fn recover(target_dir: &Path, chosen: &[OrphanCandidate]) -> Recovery {
    let mut recovery = Recovery::default();
    if let Err(err) = fs::create_dir_all(target_dir) {
        for candidate in chosen {
            recovery.failures.push(CopyFailure {
                session_id: candidate.session_id.clone(),
                source: candidate.source_sessions_dir.clone(),
                destination: target_dir.to_path_buf(),
                error: err.to_string(),
            });
        }
        return recovery;
    }

    for candidate in chosen {
        recovery.merge(copy_session(
            &candidate.session_id,
            &candidate.source_sessions_dir,
            target_dir,
        ));
        info!(
            component = "orphans",
            event = "orphans.recovered",
            session_id = %candidate.session_id,
            source = %candidate.source_namespace,
            same_project = candidate.same_project,
        );
    }
    recovery
}

/// Copy every record file of `session_id` from `source_dir` to `target_dir`,
/// skipping files that already exist at the destination.
pub fn copy_session(session_id: &str, source_dir: &Path, target_dir: &Path) -> Recovery {
    let mut recovery = Recovery::default();
    for record in record_files(source_dir, session_id) {
        let Some(file_name) = record.path.file_name() else {
            continue;
        };
        let destination = target_dir.join(file_name);
        match copy_new(&record.path, &destination) {
            Ok(true) => {
                recovery.files_copied += 1;
                recovery.copied.insert(session_id.to_string());
            }
            Ok(false) => recovery.files_skipped += 1,
            Err(err) => {
                warn!(
                    component = "orphans",
                    event = "orphans.copy_failed",
                    session_id = %session_id,
                    source = %record.path.display(),
                    destination = %destination.display(),
                    error = %err,
                );
                recovery.failures.push(CopyFailure {
                    session_id: session_id.to_string(),
                    source: record.path.clone(),
                    destination,
                    error: err.to_string(),
                });
            }
        }
    }
    recovery
}

/// Copy unless `destination` exists. Returns whether a copy happened.
fn copy_new(source: &Path, destination: &Path) -> io::Result<bool> {
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(destination) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err),
    };
    let copied = File::open(source).and_then(|mut src| io::copy(&mut src, &mut dest));
    if let Err(err) = copied {
        drop(dest);
        let _ = fs::remove_file(destination);
        return Err(err);
    }
    // Keep the source's modification time, like a plain `cp -p`.
    if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
        let _ = dest.set_modified(modified);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::StorageRoot;

    fn scan(dir: &crate::fixtures::NamespaceDir) -> Namespace {
        Namespace::scan(&dir.path).unwrap()
    }

    #[test]
    fn ranks_same_project_candidates_first() {
        let root = StorageRoot::new();
        let target = root.namespace("t").folder("file:///new/Foo");
        target.index(&["lost"]);
        let other = root.namespace("a").folder("file:///elsewhere/bar");
        other.snapshot("lost", "x", 1);
        let same = root.namespace("b").folder("file:///old/foo");
        same.snapshot("lost", "x", 1);

        let all = vec![scan(&other), scan(&same), scan(&target)];
        let found = candidates("lost", &all[2], &all);
        let order: Vec<(&str, bool)> = found
            .iter()
            .map(|c| (c.source_namespace.as_str(), c.same_project))
            .collect();
        assert_eq!(order, vec![("b", true), ("a", false)]);

        let best = resolve(&all[2], &all);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].source_namespace, "b");
    }

    #[test]
    fn recover_copies_without_touching_source() {
        let root = StorageRoot::new();
        let target = root.namespace("t");
        target.index(&["lost"]);
        let source = root.namespace("s");
        source.snapshot("lost", "x", 1).log("lost", "x", 1);

        let all = vec![scan(&source), scan(&target)];
        let chosen = resolve(&all[1], &all);
        let recovery = recover(&target.sessions_dir(), &chosen);

        assert_eq!(recovery.files_copied, 2);
        assert!(recovery.copied.contains("lost"));
        assert!(target.sessions_dir().join("lost.json").is_file());
        assert!(target.sessions_dir().join("lost.jsonl").is_file());
        assert!(source.sessions_dir().join("lost.json").is_file());
        assert_eq!(scan(&target).orphaned_in_index().len(), 0);
    }

    #[test]
    fn existing_destination_is_never_overwritten() {
        let root = StorageRoot::new();
        let source = root.namespace("s");
        source.snapshot("id", "from source", 1);
        let target = root.namespace("t");
        target.snapshot("id", "already here", 2);

        let recovery = copy_session("id", &source.sessions_dir(), &target.sessions_dir());
        assert_eq!(recovery.files_copied, 0);
        assert_eq!(recovery.files_skipped, 1);
        assert!(recovery.copied.is_empty());
        let kept = std::fs::read_to_string(target.sessions_dir().join("id.json")).unwrap();
        assert!(kept.contains("already here"));
    }

    #[test]
    fn copy_failures_are_collected() {
        let root = StorageRoot::new();
        let source = root.namespace("s");
        source.snapshot("a", "x", 1).snapshot("b", "y", 2);
        // A file where the target directory should be.
        let blocked = root.path().join("blocked");
        std::fs::write(&blocked, "not a dir").unwrap();

        let chosen: Vec<OrphanCandidate> = ["a", "b"]
            .iter()
            .map(|id| OrphanCandidate {
                session_id: id.to_string(),
                source_namespace: "s".into(),
                source_sessions_dir: source.sessions_dir(),
                same_project: false,
            })
            .collect();
        let recovery = recover(&blocked, &chosen);
        assert_eq!(recovery.failures.len(), 2);
        assert!(recovery.copied.is_empty());
    }
}
