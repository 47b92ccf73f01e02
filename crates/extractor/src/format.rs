//! Record file discovery: which file holds a session, and in which format.

use std::path::{Path, PathBuf};

/// On-disk record format, selected per session id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFormat {
    /// `<id>.json`, one JSON object
    Snapshot,
    /// `<id>.jsonl`, one mutation per line
    IncrementalLog,
}

impl RecordFormat {
    /// Preference order when both files exist.
    pub const PREFERRED: [RecordFormat; 2] = [RecordFormat::IncrementalLog, RecordFormat::Snapshot];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Snapshot => "json",
            Self::IncrementalLog => "jsonl",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(Self::Snapshot),
            "jsonl" => Some(Self::IncrementalLog),
            _ => None,
        }
    }

    pub fn file_name(self, session_id: &str) -> String {
        format!("{}.{}", session_id, self.extension())
    }
}

/// A located session record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub path: PathBuf,
    pub format: RecordFormat,
}

impl RecordFile {
    /// Find the record to parse for `session_id`, preferring the log format.
    pub fn locate(sessions_dir: &Path, session_id: &str) -> Option<Self> {
        RecordFormat::PREFERRED.into_iter().find_map(|format| {
            let path = sessions_dir.join(format.file_name(session_id));
            path.is_file().then_some(Self { path, format })
        })
    }
}

/// Every record file that exists for `session_id`, in either format.
///
/// Copies move all of them so the destination keeps the same preference.
pub fn record_files(sessions_dir: &Path, session_id: &str) -> Vec<RecordFile> {
    RecordFormat::PREFERRED
        .into_iter()
        .filter_map(|format| {
            let path = sessions_dir.join(format.file_name(session_id));
            path.is_file().then_some(RecordFile { path, format })
        })
        .collect()
}

/// Session id and format for a file found in a sessions directory.
pub fn session_id_from_path(path: &Path) -> Option<(String, RecordFormat)> {
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(RecordFormat::from_extension)?;
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some((stem.to_string(), format))
}
