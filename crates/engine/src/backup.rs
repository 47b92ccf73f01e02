//! Timestamped store backups, taken before any write.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<store>.backup.<YYYYmmdd_HHMMSS>`
pub fn backup_name(store: &Path, at: &DateTime<Local>) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(format!(".backup.{}", at.format(TIMESTAMP_FORMAT)));
    PathBuf::from(name)
}

/// Copy `store` to a fresh backup file and return its path.
///
/// An existing backup is never overwritten: when the timestamped name is
/// taken, `.1`, `.2`, ... are tried in turn.
pub fn create_backup(store: &Path, at: &DateTime<Local>) -> io::Result<PathBuf> {
    let base = backup_name(store, at);
    let mut source = File::open(store)?;

    let mut suffix = 0u32;
    let (path, mut dest) = loop {
        let candidate = if suffix == 0 {
            base.clone()
        } else {
            let mut name = base.as_os_str().to_owned();
            name.push(format!(".{suffix}"));
            PathBuf::from(name)
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => break (candidate, file),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(err) => return Err(err),
        }
    };

    if let Err(err) = io::copy(&mut source, &mut dest).and_then(|_| dest.sync_all()) {
        let _ = fs::remove_file(&path);
        return Err(err);
    }

    info!(
        component = "backup",
        event = "backup.created",
        store = %store.display(),
        backup = %path.display(),
    );
    Ok(path)
}
