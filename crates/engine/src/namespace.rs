//! Namespace scanning: what a storage namespace holds on disk, in its index,
//! and in its panel cache.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chatmend_extractor::session_id_from_path;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::store::Store;
use crate::EngineError;

pub const SESSIONS_DIR: &str = "chatSessions";
pub const STORE_FILE: &str = "state.vscdb";
pub const WORKSPACE_FILE: &str = "workspace.json";

const WORKSPACE_SUFFIX: &str = ".code-workspace";

/// The project a namespace was opened for, as recorded in `workspace.json`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectIdentity {
    /// A single folder URI
    Folder(String),
    /// A multi-root `.code-workspace` file URI
    WorkspaceFile(String),
}

impl ProjectIdentity {
    /// Read `workspace.json`. Absent or unreadable metadata means no identity.
    pub fn load(namespace_dir: &Path) -> Option<Self> {
        let raw = fs::read_to_string(namespace_dir.join(WORKSPACE_FILE)).ok()?;
        let info: Value = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(err) => {
                debug!(
                    component = "scanner",
                    event = "scanner.workspace_json_invalid",
                    path = %namespace_dir.display(),
                    error = %err,
                );
                return None;
            }
        };
        Self::from_workspace_json(&info)
    }

    pub fn from_workspace_json(info: &Value) -> Option<Self> {
        if let Some(folder) = info.get("folder") {
            let uri = match folder {
                Value::String(uri) => Some(uri.as_str()),
                Value::Object(obj) => obj.get("path").and_then(Value::as_str),
                _ => None,
            };
            return uri.filter(|u| !u.is_empty()).map(|u| Self::Folder(u.to_string()));
        }
        let workspace = info.get("workspace")?;
        let uri = match workspace {
            Value::String(uri) => Some(uri.as_str()),
            Value::Object(obj) => obj
                .get("configPath")
                .or_else(|| obj.get("path"))
                .and_then(Value::as_str),
            _ => None,
        };
        uri.filter(|u| !u.is_empty())
            .map(|u| Self::WorkspaceFile(u.to_string()))
    }

    /// The recorded URI, used verbatim as the merge grouping key.
    pub fn uri(&self) -> &str {
        match self {
            Self::Folder(uri) | Self::WorkspaceFile(uri) => uri,
        }
    }

    /// Last path component of the URI, undecoded.
    pub fn last_component(&self) -> Option<&str> {
        let path = self.uri();
        let path = path.strip_prefix("file://").unwrap_or(path);
        path.trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Human-readable project name: the percent-decoded last component,
    /// without the `.code-workspace` suffix for workspace files.
    pub fn display_name(&self) -> Option<String> {
        let last = self.last_component()?;
        let name = urlencoding::decode(last)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| last.to_string());
        let name = match self {
            Self::WorkspaceFile(_) => name
                .strip_suffix(WORKSPACE_SUFFIX)
                .map(str::to_string)
                .unwrap_or(name),
            Self::Folder(_) => name,
        };
        (!name.is_empty()).then_some(name)
    }

    /// Heuristic: same last path component, ignoring case.
    pub fn same_project(&self, other: &ProjectIdentity) -> bool {
        match (self.last_component(), other.last_component()) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => false,
        }
    }
}

/// One storage namespace, as scanned
#[derive(Debug, Clone)]
pub struct Namespace {
    pub id: String,
    pub path: PathBuf,
    pub project: Option<ProjectIdentity>,
    /// Ids with a record file under `chatSessions/`
    pub disk_ids: BTreeSet<String>,
    /// Ids with an index entry
    pub index_ids: BTreeSet<String>,
    /// Indexed ids whose entry is marked empty
    pub empty_ids: BTreeSet<String>,
    /// Local ids present in both cache lists
    pub cache_ids: BTreeSet<String>,
    /// Store modification time; `None` when there is no store
    pub store_modified: Option<SystemTime>,
}

impl Namespace {
    /// Scan one namespace directory.
    ///
    /// A missing store or session directory scans as empty; a store that
    /// exists but cannot be read is an error.
    pub fn scan(dir: &Path) -> Result<Self, EngineError> {
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut ns = Self {
            id,
            path: dir.to_path_buf(),
            project: ProjectIdentity::load(dir),
            disk_ids: disk_ids(&dir.join(SESSIONS_DIR))?,
            index_ids: BTreeSet::new(),
            empty_ids: BTreeSet::new(),
            cache_ids: BTreeSet::new(),
            store_modified: None,
        };

        let store_path = ns.store_path();
        if store_path.is_file() {
            ns.store_modified = fs::metadata(&store_path).and_then(|m| m.modified()).ok();
            let store = Store::open_read_only(&store_path)?;
            let index = store.read_index()?;
            ns.index_ids = index.ids().map(str::to_string).collect();
            ns.empty_ids = index.empty_ids().map(str::to_string).collect();
            ns.cache_ids = store.read_cache()?.cached_ids();
        }

        debug!(
            component = "scanner",
            event = "scanner.namespace_scanned",
            namespace = %ns.id,
            disk = ns.disk_ids.len(),
            index = ns.index_ids.len(),
            cache = ns.cache_ids.len(),
        );
        Ok(ns)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.path.join(SESSIONS_DIR)
    }

    pub fn store_path(&self) -> PathBuf {
        self.path.join(STORE_FILE)
    }

    pub fn has_sessions(&self) -> bool {
        !self.disk_ids.is_empty()
    }

    /// `disk - index`
    pub fn missing_from_index(&self) -> BTreeSet<String> {
        self.disk_ids.difference(&self.index_ids).cloned().collect()
    }

    /// `index - disk`
    pub fn orphaned_in_index(&self) -> BTreeSet<String> {
        self.index_ids.difference(&self.disk_ids).cloned().collect()
    }

    /// `(disk - empty) - cache`
    pub fn missing_from_cache(&self) -> BTreeSet<String> {
        self.disk_ids
            .iter()
            .filter(|id| !self.empty_ids.contains(*id) && !self.cache_ids.contains(*id))
            .cloned()
            .collect()
    }

    pub fn needs_repair(&self) -> bool {
        !self.missing_from_index().is_empty()
            || !self.orphaned_in_index().is_empty()
            || !self.missing_from_cache().is_empty()
    }

    pub fn project_name(&self) -> String {
        self.project
            .as_ref()
            .and_then(ProjectIdentity::display_name)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// `name (id) [Folder]`, for listings.
    pub fn display_name(&self) -> String {
        let kind = match &self.project {
            Some(ProjectIdentity::Folder(_)) => " [Folder]",
            Some(ProjectIdentity::WorkspaceFile(_)) => " [Workspace File]",
            None => "",
        };
        format!("{} ({}){}", self.project_name(), self.id, kind)
    }

    pub fn same_project(&self, other: &Namespace) -> bool {
        match (&self.project, &other.project) {
            (Some(a), Some(b)) => a.same_project(b),
            _ => false,
        }
    }
}

fn disk_ids(sessions_dir: &Path) -> io::Result<BTreeSet<String>> {
    let entries = match fs::read_dir(sessions_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(err) => return Err(err),
    };

    let mut ids = BTreeSet::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some((id, _format)) = session_id_from_path(&path) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Scan every namespace directory under the storage root, in name order.
///
/// Namespaces that fail to scan are logged and left out; a missing root
/// yields no namespaces.
pub fn scan_storage(config: &StorageConfig) -> Result<Vec<Namespace>, EngineError> {
    let entries = match fs::read_dir(&config.root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(
                component = "scanner",
                event = "scanner.root_missing",
                root = %config.root.display(),
                variant = ?config.variant,
            );
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut namespaces = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match Namespace::scan(&dir) {
            Ok(ns) => namespaces.push(ns),
            Err(err) => warn!(
                component = "scanner",
                event = "scanner.namespace_failed",
                path = %dir.display(),
                error = %err,
            ),
        }
    }
    Ok(namespaces)
}

/// Scan the single namespace `id` under the storage root.
pub fn find_namespace(config: &StorageConfig, id: &str) -> Result<Namespace, EngineError> {
    let dir = config.root.join(id);
    if id.is_empty() || id.contains(['/', '\\']) || !dir.is_dir() {
        return Err(EngineError::NamespaceNotFound(id.to_string()));
    }
    Namespace::scan(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::fixtures::{ids, StorageRoot};
    use chatmend_protocol::{encode_resource, INDEX_KEY};
    use serde_json::json;

    #[test]
    fn project_identity_forms() {
        let folder = ProjectIdentity::from_workspace_json(&json!({"folder": "file:///home/u/My%20App"}));
        assert_eq!(folder, Some(ProjectIdentity::Folder("file:///home/u/My%20App".into())));
        assert_eq!(folder.unwrap().display_name().as_deref(), Some("My App"));

        let nested = ProjectIdentity::from_workspace_json(&json!({"folder": {"path": "/srv/api/"}}));
        assert_eq!(nested.unwrap().display_name().as_deref(), Some("api"));

        let ws = ProjectIdentity::from_workspace_json(&json!({"workspace": "file:///w/team.code-workspace"}))
            .unwrap();
        assert!(matches!(ws, ProjectIdentity::WorkspaceFile(_)));
        assert_eq!(ws.display_name().as_deref(), Some("team"));

        assert_eq!(ProjectIdentity::from_workspace_json(&json!({"other": 1})), None);
        assert_eq!(ProjectIdentity::from_workspace_json(&json!({"folder": ""})), None);
    }

    #[test]
    fn same_project_compares_last_component_case_insensitively() {
        let a = ProjectIdentity::Folder("file:///old-machine/src/Foo".into());
        let b = ProjectIdentity::Folder("file:///Users/me/foo".into());
        let c = ProjectIdentity::Folder("file:///Users/me/bar".into());
        assert!(a.same_project(&b));
        assert!(!a.same_project(&c));
    }

    #[test]
    fn scan_reports_derived_sets() {
        let root = StorageRoot::new();
        let ns = root.namespace("abc123").folder("file:///home/u/foo");
        ns.snapshot("a", "first", 1)
            .log("b", "second", 2)
            .snapshot("b", "second (legacy)", 2)
            .empty_snapshot("e")
            .raw_record("notes.txt", "ignored");
        ns.put(
            INDEX_KEY,
            &json!({"version": 1, "entries": {
                "a": {"sessionId": "a", "title": "A", "isEmpty": false},
                "e": {"sessionId": "e", "title": "E", "isEmpty": true},
                "gone": {"sessionId": "gone", "title": "G", "isEmpty": false}
            }})
            .to_string(),
        );
        ns.cache(
            json!([{"resource": encode_resource("a")}, {"resource": "openai-codex://x"}]),
            json!([{"resource": encode_resource("a")}, {"resource": encode_resource("b")}]),
        );

        let scanned = Namespace::scan(&ns.path).unwrap();
        assert_eq!(scanned.id, "abc123");
        assert_eq!(scanned.disk_ids, ids(&["a", "b", "e"]));
        assert_eq!(scanned.missing_from_index(), ids(&["b"]));
        assert_eq!(scanned.orphaned_in_index(), ids(&["gone"]));
        // b is only in the state list, so it still counts as missing.
        assert_eq!(scanned.missing_from_cache(), ids(&["b"]));
        assert!(scanned.needs_repair());
        assert_eq!(scanned.display_name(), "foo (abc123) [Folder]");
        assert!(scanned.store_modified.is_some());
    }

    #[test]
    fn healthy_namespace_needs_no_repair() {
        let root = StorageRoot::new();
        let ns = root.namespace("ok");
        ns.snapshot("a", "hello", 1).index(&["a"]);
        ns.cache(
            json!([{"resource": encode_resource("a")}]),
            json!([{"resource": encode_resource("a")}]),
        );
        let scanned = Namespace::scan(&ns.path).unwrap();
        assert!(!scanned.needs_repair());
        assert_eq!(scanned.project_name(), "Unknown");
    }

    #[test]
    fn scan_storage_lists_namespaces_in_order() {
        let root = StorageRoot::new();
        root.namespace("b-ns");
        root.namespace("a-ns");
        std::fs::create_dir(root.path().join("no-store")).unwrap();
        std::fs::write(root.path().join("stray-file"), "x").unwrap();

        let config = StorageConfig::new(root.path(), Variant::Stable);
        let ids: Vec<String> = scan_storage(&config).unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["a-ns", "b-ns", "no-store"]);

        let missing = StorageConfig::new(root.path().join("nope"), Variant::Insiders);
        assert!(scan_storage(&missing).unwrap().is_empty());
    }

    #[test]
    fn find_namespace_rejects_unknown_ids() {
        let root = StorageRoot::new();
        root.namespace("real");
        let config = StorageConfig::new(root.path(), Variant::Stable);
        assert!(find_namespace(&config, "real").is_ok());
        assert!(matches!(
            find_namespace(&config, "missing"),
            Err(EngineError::NamespaceNotFound(_))
        ));
        assert!(matches!(
            find_namespace(&config, "../real"),
            Err(EngineError::NamespaceNotFound(_))
        ));
    }
}
