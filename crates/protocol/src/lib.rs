//! chatmend Protocol
//!
//! Shared types for the values chatmend reads and writes: the session index
//! and panel cache stored in a namespace's `state.vscdb`, and the two session
//! record formats found under `chatSessions/`.

mod lenient;
pub mod record;
pub mod resource;
pub mod types;

pub use record::{KeyPath, MessagePart, MessageRecord, MutationRecord, RequestRecord, SessionSnapshot};
pub use resource::{decode_resource, encode_resource, is_local_resource, LOCAL_RESOURCE_PREFIX};
pub use types::*;
