//! Session record formats.
//!
//! A session lives on disk either as one JSON snapshot (`<id>.json`) or as an
//! append-only mutation log (`<id>.jsonl`), one `{"kind", "k", "v"}` object
//! per line:
//!
//! - kind 0: initial snapshot, `v` is a [`SessionSnapshot`]
//! - kind 1: scalar set, `k` is the key path, `v` the new value
//! - kind 2: array splice, `k` is the key path, `v` the appended items

use serde::Deserialize;
use serde_json::Value;

use crate::lenient;
use crate::types::ChatLocation;

/// A whole-session snapshot, either a `.json` record or the payload of a
/// kind-0 log line. Only the fields chatmend reads are modeled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(deserialize_with = "lenient::list")]
    pub requests: Vec<RequestRecord>,
    #[serde(deserialize_with = "lenient::location")]
    pub initial_location: Option<ChatLocation>,
    #[serde(deserialize_with = "lenient::text")]
    pub custom_title: Option<String>,
    #[serde(deserialize_with = "lenient::millis")]
    pub creation_date: Option<i64>,
}

/// One request/response pair
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestRecord {
    #[serde(deserialize_with = "lenient::record")]
    pub message: Option<MessageRecord>,
    #[serde(deserialize_with = "lenient::millis")]
    pub timestamp: Option<i64>,
}

impl RequestRecord {
    /// Concatenated text of the message's text-bearing parts.
    pub fn text(&self) -> Option<String> {
        let message = self.message.as_ref()?;
        let mut text = String::new();
        let mut any = false;
        for part in &message.parts {
            if let Some(fragment) = &part.text {
                text.push_str(fragment);
                any = true;
            }
        }
        any.then_some(text)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageRecord {
    #[serde(deserialize_with = "lenient::list")]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagePart {
    #[serde(deserialize_with = "lenient::text")]
    pub text: Option<String>,
}

/// Key path of a log mutation, e.g. `["requests"]` or `["requests", 3, "response"]`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(pub Vec<Value>);

impl KeyPath {
    /// True when the path is exactly the given string segments.
    pub fn is(&self, segments: &[&str]) -> bool {
        self.0.len() == segments.len()
            && self
                .0
                .iter()
                .zip(segments)
                .all(|(actual, expected)| actual.as_str() == Some(*expected))
    }

    /// True when the first segment is `root`.
    pub fn starts_with(&self, root: &str) -> bool {
        self.0.first().and_then(Value::as_str) == Some(root)
    }
}

/// One decoded line of a mutation log
#[derive(Debug, Clone)]
pub enum MutationRecord {
    Snapshot(SessionSnapshot),
    ScalarSet { key_path: KeyPath, value: Value },
    ArraySplice { key_path: KeyPath, items: Vec<Value> },
    /// A kind this build does not understand; skipped by readers.
    Unknown(i64),
}

#[derive(Deserialize)]
struct RawMutation {
    kind: i64,
    #[serde(default)]
    k: KeyPath,
    #[serde(default)]
    v: Value,
}

impl MutationRecord {
    /// Fully parse one log line.
    pub fn parse(line: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawMutation = serde_json::from_slice(line)?;
        Ok(match raw.kind {
            0 => Self::Snapshot(serde_json::from_value(raw.v)?),
            1 => Self::ScalarSet {
                key_path: raw.k,
                value: raw.v,
            },
            2 => Self::ArraySplice {
                key_path: raw.k,
                items: match raw.v {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    single => vec![single],
                },
            },
            other => Self::Unknown(other),
        })
    }

    /// Requests carried by a splice's items; items that are not request
    /// objects are skipped.
    pub fn requests(items: &[Value]) -> impl Iterator<Item = RequestRecord> + '_ {
        items
            .iter()
            .filter_map(|item| RequestRecord::deserialize(item).ok())
    }
}
