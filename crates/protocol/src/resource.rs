//! Resource identifiers: the panel cache's foreign key for a session.
//!
//! `vscode-chat-session://local/<urlsafe-base64-no-padding(session id)>`

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Prefix shared by every locally produced resource identifier.
pub const LOCAL_RESOURCE_PREFIX: &str = "vscode-chat-session://local/";

pub fn encode_resource(session_id: &str) -> String {
    format!(
        "{}{}",
        LOCAL_RESOURCE_PREFIX,
        URL_SAFE_NO_PAD.encode(session_id.as_bytes())
    )
}

/// Reverse [`encode_resource`]. Returns `None` for identifiers that belong to
/// another producer or do not decode to a UTF-8 session id.
///
/// Padding and the standard alphabet are accepted, since older writers used
/// them.
pub fn decode_resource(resource: &str) -> Option<String> {
    let encoded = resource
        .strip_prefix(LOCAL_RESOURCE_PREFIX)?
        .trim_end_matches('=');
    if encoded.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .ok()?;
    String::from_utf8(bytes).ok()
}

pub fn is_local_resource(resource: &str) -> bool {
    decode_resource(resource).is_some()
}
