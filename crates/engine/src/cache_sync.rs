//! Panel cache synchronization.
//!
//! The panel cache is two parallel lists keyed by resource identifier. Only
//! entries whose identifier decodes as a local session are ever touched;
//! everything else is carried through in place.

use std::collections::BTreeSet;

use chatmend_protocol::{decode_resource, encode_resource, ModelCacheEntry, SessionEntry, StateCacheEntry};
use serde_json::Value;
use tracing::{debug, warn};

/// Both panel cache lists, as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelCache {
    pub model: Vec<Value>,
    pub state: Vec<Value>,
}

/// What one synchronization changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub model_added: usize,
    pub state_added: usize,
    /// Local entries dropped because their session is empty
    pub empty_pruned: usize,
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        self.model_added + self.state_added + self.empty_pruned > 0
    }
}

fn parse_list(raw: Option<&str>, which: &str) -> Vec<Value> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(list) => list,
        Err(err) => {
            warn!(
                component = "cache_sync",
                event = "cache_sync.list_unreadable",
                list = %which,
                error = %err,
            );
            Vec::new()
        }
    }
}

/// Session id behind an entry's resource, if it is a local one.
fn local_id(entry: &Value) -> Option<String> {
    entry.get("resource").and_then(Value::as_str).and_then(decode_resource)
}

fn local_ids(list: &[Value]) -> BTreeSet<String> {
    list.iter().filter_map(local_id).collect()
}

impl PanelCache {
    /// Parse stored lists; absent or non-list content reads as empty.
    pub fn parse(model: Option<&str>, state: Option<&str>) -> Self {
        Self {
            model: parse_list(model, "model"),
            state: parse_list(state, "state"),
        }
    }

    /// Local session ids present in both lists.
    pub fn cached_ids(&self) -> BTreeSet<String> {
        let state = local_ids(&self.state);
        local_ids(&self.model)
            .into_iter()
            .filter(|id| state.contains(id))
            .collect()
    }

    /// Project `entries` into both lists.
    ///
    /// Non-empty sessions missing from a list get a minimal entry appended.
    /// Empty sessions are never added, and local entries already present for
    /// them are dropped. Existing entries keep their position and content.
    pub fn sync<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a SessionEntry>,
    ) -> Result<SyncOutcome, serde_json::Error> {
        let mut outcome = SyncOutcome::default();
        let mut in_model = local_ids(&self.model);
        let mut in_state = local_ids(&self.state);
        let mut empty = BTreeSet::new();

        for entry in entries {
            if entry.is_empty {
                empty.insert(entry.session_id.clone());
                continue;
            }
            let resource = encode_resource(&entry.session_id);
            if in_model.insert(entry.session_id.clone()) {
                self.model
                    .push(serde_json::to_value(ModelCacheEntry::local(resource.clone(), entry))?);
                outcome.model_added += 1;
            }
            if in_state.insert(entry.session_id.clone()) {
                self.state
                    .push(serde_json::to_value(StateCacheEntry::local(resource, entry))?);
                outcome.state_added += 1;
            }
        }

        if !empty.is_empty() {
            let before = self.model.len() + self.state.len();
            let keep = |item: &Value| local_id(item).map_or(true, |id| !empty.contains(&id));
            self.model.retain(keep);
            self.state.retain(keep);
            outcome.empty_pruned = before - self.model.len() - self.state.len();
        }

        debug!(
            component = "cache_sync",
            event = "cache_sync.synced",
            model_added = outcome.model_added,
            state_added = outcome.state_added,
            empty_pruned = outcome.empty_pruned,
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmend_protocol::ChatLocation;
    use serde_json::json;

    fn entry(id: &str, is_empty: bool) -> SessionEntry {
        SessionEntry {
            session_id: id.to_string(),
            title: format!("Title {id}"),
            last_message_date: 1_700,
            is_imported: false,
            initial_location: ChatLocation::Panel,
            is_empty,
        }
    }

    fn foreign() -> PanelCache {
        PanelCache {
            model: vec![
                json!({"resource": "openai-codex://thread/1", "label": "codex", "status": 2}),
                json!({"label": "no resource at all"}),
            ],
            state: vec![json!({"resource": "copilotcli:/abc", "archived": true, "read": 5})],
        }
    }

    #[test]
    fn appends_minimal_entries_for_new_sessions() {
        let mut cache = PanelCache::default();
        let outcome = cache.sync([&entry("s1", false)]).unwrap();
        assert_eq!(outcome.model_added, 1);
        assert_eq!(outcome.state_added, 1);

        let resource = encode_resource("s1");
        assert_eq!(
            cache.model[0],
            json!({
                "providerType": "local",
                "providerLabel": "Local",
                "resource": resource,
                "icon": "vm",
                "label": "Title s1",
                "status": 1,
                "timing": {"created": 1_700}
            })
        );
        assert_eq!(
            cache.state[0],
            json!({"resource": resource, "archived": false, "read": 1_700})
        );
        assert_eq!(cache.cached_ids().len(), 1);
    }

    #[test]
    fn foreign_entries_pass_through_in_order() {
        let mut cache = foreign();
        let before = cache.clone();
        cache.sync([&entry("a", false), &entry("b", false)]).unwrap();

        assert_eq!(&cache.model[..2], &before.model[..]);
        assert_eq!(&cache.state[..1], &before.state[..]);
        assert_eq!(cache.model.len(), 4);
        assert_eq!(cache.state.len(), 3);
    }

    #[test]
    fn existing_local_entries_are_not_duplicated() {
        let resource = encode_resource("a");
        let mut cache = PanelCache {
            model: vec![json!({"resource": resource, "label": "custom label", "status": 0})],
            state: vec![],
        };
        let outcome = cache.sync([&entry("a", false)]).unwrap();
        assert_eq!(outcome.model_added, 0);
        assert_eq!(outcome.state_added, 1);
        assert_eq!(cache.model[0]["label"], json!("custom label"));

        let again = cache.sync([&entry("a", false)]).unwrap();
        assert!(!again.changed());
    }

    #[test]
    fn padded_resource_counts_as_present() {
        // "ab" is "YWI" unpadded; older writers stored "YWI=".
        let mut cache = PanelCache {
            model: vec![json!({"resource": "vscode-chat-session://local/YWI="})],
            state: vec![json!({"resource": "vscode-chat-session://local/YWI="})],
        };
        let outcome = cache.sync([&entry("ab", false)]).unwrap();
        assert!(!outcome.changed());
    }

    #[test]
    fn empty_sessions_never_appear() {
        let resource = encode_resource("blank");
        let mut cache = foreign();
        cache.model.push(json!({"resource": resource}));
        cache.state.push(json!({"resource": resource}));

        let outcome = cache.sync([&entry("blank", true), &entry("full", false)]).unwrap();
        assert_eq!(outcome.empty_pruned, 2);
        assert!(!cache.cached_ids().contains("blank"));
        let resources: Vec<&str> = cache
            .model
            .iter()
            .chain(&cache.state)
            .filter_map(|v| v["resource"].as_str())
            .collect();
        assert!(!resources.contains(&resource.as_str()));
        assert_eq!(cache.model.len(), 3);
    }

    #[test]
    fn unreadable_lists_parse_as_empty() {
        let cache = PanelCache::parse(Some("{\"not\": \"a list\"}"), None);
        assert_eq!(cache, PanelCache::default());
    }
}
