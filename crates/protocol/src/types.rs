//! Core types shared across the protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::lenient;

/// `ItemTable` key holding the session index.
pub const INDEX_KEY: &str = "chat.ChatSessionStore.index";
/// `ItemTable` key holding the panel cache's model list.
pub const MODEL_CACHE_KEY: &str = "agentSessions.model.cache";
/// `ItemTable` key holding the panel cache's state list.
pub const STATE_CACHE_KEY: &str = "agentSessions.state.cache";

/// Title used when a session yields no usable title.
pub const UNTITLED_SESSION: &str = "Untitled Session";

/// Index format version written by chatmend.
pub const INDEX_VERSION: i64 = 1;

/// Where a chat session was started in the consumer UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatLocation {
    #[default]
    Panel,
    Terminal,
    Notebook,
    Editor,
    EditingSession,
    /// A location this build does not know about, kept verbatim.
    Other(String),
}

impl ChatLocation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Panel => "panel",
            Self::Terminal => "terminal",
            Self::Notebook => "notebook",
            Self::Editor => "editor",
            Self::EditingSession => "editing-session",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ChatLocation {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "panel" => Self::Panel,
            "terminal" => Self::Terminal,
            "notebook" => Self::Notebook,
            "editor" => Self::Editor,
            "editing-session" => Self::EditingSession,
            _ => Self::Other(raw),
        }
    }
}

impl From<ChatLocation> for String {
    fn from(location: ChatLocation) -> Self {
        match location {
            ChatLocation::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// One session as the index describes it.
///
/// Field order matches what the consumer writes, so freshly built entries
/// serialize the same way native ones do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    pub title: String,
    pub last_message_date: i64,
    pub is_imported: bool,
    pub initial_location: ChatLocation,
    pub is_empty: bool,
}

impl SessionEntry {
    /// Read the fields chatmend needs out of a stored index entry.
    ///
    /// Stored entries are kept as raw JSON so fields this build does not model
    /// survive a rewrite; this view never fails and falls back field by field.
    pub fn from_stored(session_id: &str, stored: &Value) -> Self {
        let title = stored
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNTITLED_SESSION)
            .to_string();

        Self {
            session_id: session_id.to_string(),
            title,
            last_message_date: stored
                .get("lastMessageDate")
                .and_then(lenient::as_i64)
                .unwrap_or(0),
            is_imported: stored
                .get("isImported")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            initial_location: stored
                .get("initialLocation")
                .and_then(Value::as_str)
                .map(|s| ChatLocation::from(s.to_string()))
                .unwrap_or_default(),
            is_empty: stored
                .get("isEmpty")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Stored form of the entry, fields in consumer order.
    pub fn to_value(&self) -> Value {
        json!({
            "sessionId": self.session_id,
            "title": self.title,
            "lastMessageDate": self.last_message_date,
            "isImported": self.is_imported,
            "initialLocation": self.initial_location.as_str(),
            "isEmpty": self.is_empty,
        })
    }
}

/// The persisted session index: `{"version": 1, "entries": {id: entry}}`.
///
/// Entries are ordered by id so serializing the same index twice yields the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIndex {
    #[serde(default = "default_index_version")]
    pub version: i64,
    #[serde(default)]
    pub entries: BTreeMap<String, Value>,
    /// Top-level fields written by newer consumers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_index_version() -> i64 {
    INDEX_VERSION
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl SessionIndex {
    /// Parse a stored index. Malformed or non-object content yields an empty
    /// index rather than an error.
    pub fn parse_or_empty(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Ids whose stored entry says the session has no requests.
    pub fn empty_ids(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.get("isEmpty").and_then(Value::as_bool) == Some(true))
            .map(|(id, _)| id.as_str())
    }

    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.entries
            .get(session_id)
            .map(|stored| SessionEntry::from_stored(session_id, stored))
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, entry: &SessionEntry) {
        self.entries.insert(entry.session_id.clone(), entry.to_value());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact JSON, the form the consumer stores.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Status value the panel shows for an idle, finished session.
pub const SESSION_STATUS_ACTIVE: u8 = 1;

/// Timing block of a model cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_started: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_ended: Option<i64>,
}

/// Display entry in `agentSessions.model.cache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCacheEntry {
    pub provider_type: String,
    pub provider_label: String,
    pub resource: String,
    pub icon: String,
    pub label: String,
    pub status: u8,
    pub timing: Timing,
}

impl ModelCacheEntry {
    /// Minimal entry for a locally stored session.
    pub fn local(resource: String, entry: &SessionEntry) -> Self {
        Self {
            provider_type: "local".to_string(),
            provider_label: "Local".to_string(),
            resource,
            icon: "vm".to_string(),
            label: entry.title.clone(),
            status: SESSION_STATUS_ACTIVE,
            timing: Timing {
                created: entry.last_message_date,
                last_request_started: None,
                last_request_ended: None,
            },
        }
    }
}

/// Read/archive entry in `agentSessions.state.cache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCacheEntry {
    pub resource: String,
    pub archived: bool,
    pub read: i64,
}

impl StateCacheEntry {
    pub fn local(resource: String, entry: &SessionEntry) -> Self {
        Self {
            resource,
            archived: false,
            read: entry.last_message_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str) -> SessionEntry {
        SessionEntry {
            session_id: id.to_string(),
            title: "Fix bug".to_string(),
            last_message_date: 1_700_000_000_000,
            is_imported: false,
            initial_location: ChatLocation::Panel,
            is_empty: false,
        }
    }

    #[test]
    fn session_entry_serializes_in_consumer_field_order() {
        let json = serde_json::to_string(&entry("abc")).unwrap();
        assert_eq!(
            json,
            r#"{"sessionId":"abc","title":"Fix bug","lastMessageDate":1700000000000,"isImported":false,"initialLocation":"panel","isEmpty":false}"#
        );
    }

    #[test]
    fn stored_value_matches_serialized_entry() {
        let entry = entry("abc");
        assert_eq!(entry.to_value(), serde_json::to_value(&entry).unwrap());
        assert_eq!(SessionEntry::from_stored("abc", &entry.to_value()), entry);
    }

    #[test]
    fn unknown_location_round_trips_verbatim() {
        let location: ChatLocation = serde_json::from_value(json!("sidebar-v2")).unwrap();
        assert_eq!(location, ChatLocation::Other("sidebar-v2".to_string()));
        assert_eq!(serde_json::to_value(&location).unwrap(), json!("sidebar-v2"));

        let known: ChatLocation = serde_json::from_value(json!("editing-session")).unwrap();
        assert_eq!(known, ChatLocation::EditingSession);
    }

    #[test]
    fn malformed_index_parses_as_empty() {
        for raw in ["", "not json", "[]", r#"{"entries": 4}"#] {
            let index = SessionIndex::parse_or_empty(raw);
            assert_eq!(index.version, INDEX_VERSION);
            assert!(index.is_empty(), "expected empty index for {raw:?}");
        }
    }

    #[test]
    fn index_keeps_unknown_entry_fields() {
        let raw = r#"{"version":1,"entries":{"a":{"sessionId":"a","title":"T","lastMessageDate":5,"isImported":false,"initialLocation":"panel","isEmpty":false,"hasPendingEdits":true}},"flags":3}"#;
        let index = SessionIndex::parse_or_empty(raw);
        assert_eq!(index.to_json().unwrap(), raw);
    }

    #[test]
    fn stored_entry_view_falls_back_per_field() {
        let view = SessionEntry::from_stored("x", &json!({"title": "   ", "isEmpty": true}));
        assert_eq!(view.title, UNTITLED_SESSION);
        assert_eq!(view.last_message_date, 0);
        assert!(view.is_empty);
        assert_eq!(view.initial_location, ChatLocation::Panel);
    }

    #[test]
    fn empty_ids_reads_is_empty_flag() {
        let mut index = SessionIndex::default();
        index.insert(&entry("full"));
        let mut empty = entry("blank");
        empty.is_empty = true;
        index.insert(&empty);

        let ids: Vec<&str> = index.empty_ids().collect();
        assert_eq!(ids, vec!["blank"]);
    }

    #[test]
    fn model_entry_omits_absent_request_timing() {
        let model = ModelCacheEntry::local("r".to_string(), &entry("abc"));
        let value = serde_json::to_value(&model).unwrap();
        assert_eq!(value["timing"], json!({"created": 1_700_000_000_000_i64}));
        assert_eq!(value["status"], json!(1));
        assert_eq!(value["providerType"], json!("local"));
    }
}
