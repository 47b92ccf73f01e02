//! chatmend Extractor
//!
//! Reads one session record, in either on-disk format, and produces the
//! summary the session index stores. Failures are returned per session with a
//! typed reason; nothing here panics or aborts a caller's batch.

mod format;
mod incremental;
mod snapshot;
mod title;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chatmend_protocol::{ChatLocation, SessionEntry};
use thiserror::Error;
use tracing::debug;

pub use format::{record_files, session_id_from_path, RecordFile, RecordFormat};
pub use title::{truncate_title, MAX_TITLE_CHARS};

/// Splice records at or above this size are scanned, not parsed.
pub const DEFAULT_FULL_PARSE_MAX_BYTES: usize = 1_000_000;

/// Errors that can occur while extracting a session
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no record file found")]
    NoRecordFile,

    #[error("failed to read record: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[from] serde_json::Error),

    #[error("snapshot is not a JSON object")]
    NotAnObject,
}

/// Stable reason code for an extraction failure, for aggregation and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoRecordFile,
    Io,
    MalformedSnapshot,
    NotAnObject,
}

impl ExtractError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NoRecordFile => FailureReason::NoRecordFile,
            Self::Io(_) => FailureReason::Io,
            Self::MalformedSnapshot(_) => FailureReason::MalformedSnapshot,
            Self::NotAnObject => FailureReason::NotAnObject,
        }
    }
}

/// What a record says about its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub title: String,
    pub last_message_date: i64,
    pub initial_location: ChatLocation,
    pub is_empty: bool,
}

impl SessionMetadata {
    /// Index entry for a locally reconciled session.
    pub fn into_entry(self, session_id: &str) -> SessionEntry {
        SessionEntry {
            session_id: session_id.to_string(),
            title: self.title,
            last_message_date: self.last_message_date,
            is_imported: false,
            initial_location: self.initial_location,
            is_empty: self.is_empty,
        }
    }
}

/// Tuning for mutation-log scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Splice records at least this long are pattern-scanned instead of parsed.
    pub full_parse_max_bytes: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            full_parse_max_bytes: DEFAULT_FULL_PARSE_MAX_BYTES,
        }
    }
}

/// Metadata extractor for session records
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    limits: ScanLimits,
}

impl Extractor {
    pub fn new(limits: ScanLimits) -> Self {
        Self { limits }
    }

    /// Locate `session_id`'s record under `sessions_dir` and extract it,
    /// preferring the incremental format when both exist.
    pub fn extract(&self, sessions_dir: &Path, session_id: &str) -> Result<SessionEntry, ExtractError> {
        let record = RecordFile::locate(sessions_dir, session_id).ok_or(ExtractError::NoRecordFile)?;
        debug!(
            component = "extractor",
            event = "extractor.record_located",
            session_id = %session_id,
            format = ?record.format,
            path = %record.path.display(),
        );
        Ok(self.extract_file(&record)?.into_entry(session_id))
    }

    pub fn extract_file(&self, record: &RecordFile) -> Result<SessionMetadata, ExtractError> {
        let file = match File::open(&record.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractError::NoRecordFile)
            }
            Err(err) => return Err(err.into()),
        };
        let reader = BufReader::new(file);
        match record.format {
            RecordFormat::Snapshot => self.extract_snapshot(reader),
            RecordFormat::IncrementalLog => self.extract_log(reader),
        }
    }

    /// Extract from a whole-session JSON snapshot.
    pub fn extract_snapshot<R: BufRead>(&self, reader: R) -> Result<SessionMetadata, ExtractError> {
        snapshot::extract(reader)
    }

    /// Extract from a mutation log, streaming it line by line.
    pub fn extract_log<R: BufRead>(&self, reader: R) -> Result<SessionMetadata, ExtractError> {
        incremental::extract(reader, &self.limits)
    }

    /// Convenience for in-memory records.
    pub fn extract_log_bytes(&self, bytes: &[u8]) -> Result<SessionMetadata, ExtractError> {
        self.extract_log(bytes)
    }

    pub fn extract_snapshot_bytes(&self, bytes: &[u8]) -> Result<SessionMetadata, ExtractError> {
        self.extract_snapshot(bytes)
    }
}

/// Shared state both formats fold into.
#[derive(Debug, Default)]
struct Accumulator {
    title: title::TitleState,
    last_message_date: i64,
    creation_date: i64,
    initial_location: Option<ChatLocation>,
    has_requests: bool,
}

impl Accumulator {
    fn apply_snapshot(&mut self, snapshot: &chatmend_protocol::SessionSnapshot) {
        if let Some(created) = snapshot.creation_date {
            self.creation_date = created;
        }
        if let Some(location) = &snapshot.initial_location {
            self.initial_location = Some(location.clone());
        }
        if let Some(custom) = &snapshot.custom_title {
            self.title.offer_custom(custom);
        }
        if snapshot.requests.is_empty() {
            return;
        }

        self.has_requests = true;
        for request in &snapshot.requests {
            if let Some(text) = request.text() {
                if self.title.offer_derived(&text) {
                    break;
                }
            }
        }
        if let Some(ts) = snapshot.requests.last().and_then(|r| r.timestamp) {
            self.observe_timestamp(ts);
        }
    }

    fn observe_timestamp(&mut self, ts: i64) {
        if ts > self.last_message_date {
            self.last_message_date = ts;
        }
    }

    fn finish(self, fall_back_to_creation: bool) -> SessionMetadata {
        let last_message_date = if self.last_message_date == 0 && fall_back_to_creation {
            self.creation_date.max(0)
        } else {
            self.last_message_date
        };

        SessionMetadata {
            title: self.title.resolve(),
            last_message_date,
            initial_location: self.initial_location.unwrap_or_default(),
            is_empty: !self.has_requests,
        }
    }
}

/// Read a stream's first non-whitespace byte without consuming it.
fn peek_first_byte<R: BufRead>(reader: &mut R) -> std::io::Result<Option<u8>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(pos) => {
                let byte = buf[pos];
                reader.consume(pos);
                return Ok(Some(byte));
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}
