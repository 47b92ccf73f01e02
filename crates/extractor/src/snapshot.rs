//! Whole-session JSON snapshots (`<id>.json`).

use std::io::BufRead;

use chatmend_protocol::SessionSnapshot;

use crate::{peek_first_byte, Accumulator, ExtractError, SessionMetadata};

pub(crate) fn extract<R: BufRead>(mut reader: R) -> Result<SessionMetadata, ExtractError> {
    // An empty stream falls through so the parser reports it as malformed.
    if let Some(first) = peek_first_byte(&mut reader)? {
        if first != b'{' {
            return Err(ExtractError::NotAnObject);
        }
    }

    let snapshot: SessionSnapshot = serde_json::from_reader(reader)?;
    let mut acc = Accumulator::default();
    acc.apply_snapshot(&snapshot);
    Ok(acc.finish(false))
}
