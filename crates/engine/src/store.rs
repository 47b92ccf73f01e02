//! Access to a namespace's `state.vscdb` key/value store.
//!
//! Only three keys of `ItemTable` are touched. Writes replace the whole
//! value; the index is always written before the two cache lists.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatmend_protocol::{SessionIndex, INDEX_KEY, MODEL_CACHE_KEY, STATE_CACHE_KEY};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::cache_sync::PanelCache;
use crate::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// An open `state.vscdb`
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open an existing store for reading and writing. Never creates one.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    fn open_with(path: &Path, flags: OpenFlags) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value of `key`, whether stored as TEXT or BLOB.
    pub fn read_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<SqlValue> = self
            .conn
            .query_row(
                "SELECT value FROM ItemTable WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(text)) => Ok(Some(text)),
            Some(SqlValue::Blob(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::NotUtf8 {
                    key: key.to_string(),
                }),
            Some(other) => {
                debug!(
                    component = "store",
                    event = "store.unexpected_value_type",
                    key = %key,
                    value_type = ?other.data_type(),
                );
                Ok(None)
            }
        }
    }

    pub fn write_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO ItemTable (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// The persisted index. Absent or malformed content reads as empty.
    pub fn read_index(&self) -> Result<SessionIndex, StoreError> {
        Ok(self
            .read_value(INDEX_KEY)?
            .map(|raw| SessionIndex::parse_or_empty(&raw))
            .unwrap_or_default())
    }

    pub fn read_cache(&self) -> Result<PanelCache, StoreError> {
        let model = self.read_value(MODEL_CACHE_KEY)?;
        let state = self.read_value(STATE_CACHE_KEY)?;
        Ok(PanelCache::parse(model.as_deref(), state.as_deref()))
    }

    pub fn write_index(&self, index: &SessionIndex) -> Result<(), StoreError> {
        let raw = index.to_json().map_err(|source| StoreError::Encode {
            key: INDEX_KEY,
            source,
        })?;
        self.write_value(INDEX_KEY, &raw)
    }

    /// Write both cache lists, model first.
    pub fn write_cache(&self, cache: &PanelCache) -> Result<(), StoreError> {
        let model = serde_json::to_string(&cache.model).map_err(|source| StoreError::Encode {
            key: MODEL_CACHE_KEY,
            source,
        })?;
        let state = serde_json::to_string(&cache.state).map_err(|source| StoreError::Encode {
            key: STATE_CACHE_KEY,
            source,
        })?;
        self.write_value(MODEL_CACHE_KEY, &model)?;
        self.write_value(STATE_CACHE_KEY, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use serde_json::json;

    #[test]
    fn missing_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Store::open(&dir.path().join("state.vscdb")).err().unwrap();
        assert!(matches!(err, StoreError::Missing(_)));
    }

    #[test]
    fn reads_text_and_blob_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.vscdb");
        fixtures::create_store(&path);

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
            params![INDEX_KEY, br#"{"version":1,"entries":{"a":{"title":"A"}}}"#.to_vec()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
            params![MODEL_CACHE_KEY, "[]"],
        )
        .unwrap();
        drop(conn);

        let store = Store::open_read_only(&path).unwrap();
        let index = store.read_index().unwrap();
        assert!(index.contains("a"));
        assert_eq!(store.read_value(MODEL_CACHE_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.read_value(STATE_CACHE_KEY).unwrap(), None);
    }

    #[test]
    fn absent_or_malformed_index_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.vscdb");
        fixtures::create_store(&path);

        let store = Store::open(&path).unwrap();
        assert!(store.read_index().unwrap().is_empty());

        store.write_value(INDEX_KEY, "{not json").unwrap();
        let index = store.read_index().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.version, 1);
    }

    #[test]
    fn writes_replace_whole_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.vscdb");
        fixtures::create_store(&path);
        let store = Store::open(&path).unwrap();

        let cache = PanelCache {
            model: vec![json!({"resource": "openai-codex://x"})],
            state: vec![],
        };
        store.write_cache(&cache).unwrap();
        store.write_cache(&cache).unwrap();

        assert_eq!(
            store.read_value(MODEL_CACHE_KEY).unwrap().as_deref(),
            Some(r#"[{"resource":"openai-codex://x"}]"#)
        );
        assert_eq!(store.read_value(STATE_CACHE_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.read_cache().unwrap(), cache);
    }
}
