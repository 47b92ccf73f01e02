//! Storage-root fixtures for tests.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chatmend_protocol::{INDEX_KEY, MODEL_CACHE_KEY, STATE_CACHE_KEY};
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn ids(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|id| id.to_string()).collect()
}

pub fn create_store(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch("CREATE TABLE IF NOT EXISTS ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB)")
        .unwrap();
}

pub fn read_key(store: &Path, key: &str) -> Option<String> {
    let conn = Connection::open(store).unwrap();
    conn.query_row("SELECT value FROM ItemTable WHERE key = ?1", params![key], |row| {
        row.get::<_, String>(0)
    })
    .ok()
}

pub struct StorageRoot {
    pub dir: TempDir,
}

impl StorageRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Namespace directory with an empty `chatSessions/` and an empty store.
    pub fn namespace(&self, id: &str) -> NamespaceDir {
        let path = self.dir.path().join(id);
        fs::create_dir_all(path.join("chatSessions")).unwrap();
        create_store(&path.join("state.vscdb"));
        NamespaceDir { path }
    }
}

pub struct NamespaceDir {
    pub path: PathBuf,
}

impl NamespaceDir {
    pub fn sessions_dir(&self) -> PathBuf {
        self.path.join("chatSessions")
    }

    pub fn store_path(&self) -> PathBuf {
        self.path.join("state.vscdb")
    }

    pub fn folder(self, uri: &str) -> Self {
        fs::write(
            self.path.join("workspace.json"),
            json!({ "folder": uri }).to_string(),
        )
        .unwrap();
        self
    }

    pub fn workspace_file(self, uri: &str) -> Self {
        fs::write(
            self.path.join("workspace.json"),
            json!({ "workspace": uri }).to_string(),
        )
        .unwrap();
        self
    }

    /// `<id>.json` with one request.
    pub fn snapshot(&self, id: &str, text: &str, ts: i64) -> &Self {
        let record = json!({
            "initialLocation": "panel",
            "requests": [{"message": {"parts": [{"text": text}]}, "timestamp": ts}]
        });
        fs::write(self.sessions_dir().join(format!("{id}.json")), record.to_string()).unwrap();
        self
    }

    /// `<id>.json` with no requests.
    pub fn empty_snapshot(&self, id: &str) -> &Self {
        fs::write(
            self.sessions_dir().join(format!("{id}.json")),
            json!({"requests": []}).to_string(),
        )
        .unwrap();
        self
    }

    /// `<id>.jsonl` with a creation snapshot and one appended request.
    pub fn log(&self, id: &str, text: &str, ts: i64) -> &Self {
        let lines = [
            json!({"kind": 0, "v": {"creationDate": 1, "initialLocation": "panel", "requests": []}}),
            json!({"kind": 2, "k": ["requests"], "v": [{"message": {"parts": [{"text": text}]}, "timestamp": ts}]}),
        ];
        let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
        fs::write(self.sessions_dir().join(format!("{id}.jsonl")), body).unwrap();
        self
    }

    pub fn raw_record(&self, file_name: &str, body: &str) -> &Self {
        fs::write(self.sessions_dir().join(file_name), body).unwrap();
        self
    }

    /// Index whose entries are the given ids, titled after themselves.
    pub fn index(&self, ids: &[&str]) -> &Self {
        let entries: serde_json::Map<String, Value> = ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    json!({
                        "sessionId": id,
                        "title": format!("Indexed {id}"),
                        "lastMessageDate": 10,
                        "isImported": false,
                        "initialLocation": "panel",
                        "isEmpty": false
                    }),
                )
            })
            .collect();
        self.put(INDEX_KEY, &json!({"version": 1, "entries": entries}).to_string())
    }

    pub fn cache(&self, model: Value, state: Value) -> &Self {
        self.put(MODEL_CACHE_KEY, &model.to_string());
        self.put(STATE_CACHE_KEY, &state.to_string())
    }

    pub fn put(&self, key: &str, value: &str) -> &Self {
        let conn = Connection::open(self.store_path()).unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO ItemTable (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .unwrap();
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        read_key(&self.store_path(), key)
    }

    /// Set the store's modification time to `secs` after the epoch.
    pub fn store_mtime(&self, secs: u64) -> &Self {
        let file = fs::File::options()
            .write(true)
            .open(self.store_path())
            .unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
        self
    }

    pub fn index_ids(&self) -> Vec<String> {
        let raw = self.get(INDEX_KEY).unwrap_or_default();
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        value["entries"]
            .as_object()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn cache_lists(&self) -> (Vec<Value>, Vec<Value>) {
        let parse = |key| {
            self.get(key)
                .and_then(|raw| serde_json::from_str::<Vec<Value>>(&raw).ok())
                .unwrap_or_default()
        };
        (parse(MODEL_CACHE_KEY), parse(STATE_CACHE_KEY))
    }
}
