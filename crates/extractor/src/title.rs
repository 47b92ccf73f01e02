use chatmend_protocol::UNTITLED_SESSION;

/// Derived titles longer than this are cut and ellipsized.
pub const MAX_TITLE_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

/// Cut `text` to at most [`MAX_TITLE_CHARS`] characters, ending in `...`
/// when anything was removed.
pub fn truncate_title(text: &str) -> String {
    if text.chars().count() <= MAX_TITLE_CHARS {
        return text.to_string();
    }
    let keep = MAX_TITLE_CHARS - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Title candidates in precedence order: custom override, then the first
/// request's text, then the sentinel.
#[derive(Debug, Default)]
pub(crate) struct TitleState {
    custom: Option<String>,
    derived: Option<String>,
}

impl TitleState {
    /// A later non-blank custom title replaces an earlier one.
    pub(crate) fn offer_custom(&mut self, title: &str) {
        if !title.trim().is_empty() {
            self.custom = Some(title.to_string());
        }
    }

    /// Returns true once a derived title is held, so callers can stop looking.
    pub(crate) fn offer_derived(&mut self, text: &str) -> bool {
        if self.derived.is_none() {
            let text = text.trim();
            if !text.is_empty() {
                self.derived = Some(truncate_title(text));
            }
        }
        self.derived.is_some()
    }

    pub(crate) fn has_derived(&self) -> bool {
        self.derived.is_some()
    }

    pub(crate) fn resolve(self) -> String {
        self.custom
            .or(self.derived)
            .unwrap_or_else(|| UNTITLED_SESSION.to_string())
    }
}
