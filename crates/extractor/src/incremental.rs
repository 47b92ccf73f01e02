//! Mutation logs (`<id>.jsonl`), streamed one record per line.
//!
//! Splice records under `requests` can run to tens of megabytes. Those at or
//! above [`ScanLimits::full_parse_max_bytes`] are never structurally parsed:
//! their kind, key path, timestamps and first text are pattern-matched from
//! the raw bytes instead.

use std::io::BufRead;
use std::sync::OnceLock;

use chatmend_protocol::{KeyPath, MutationRecord};
use regex::bytes::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{Accumulator, ExtractError, ScanLimits, SessionMetadata};

/// Bytes at each end of an oversized record searched for `kind` and `k`.
const PROBE_WINDOW: usize = 512;

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""timestamp"\s*:\s*(\d+)"#).expect("valid regex"))
}

fn text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.){1,200})"#).expect("valid regex"))
}

fn kind_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""kind"\s*:\s*(\d+)"#).expect("valid regex"))
}

fn key_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""k"\s*:\s*(\[[^\[\]]{0,256}\])"#).expect("valid regex"))
}

pub(crate) fn extract<R: BufRead>(
    mut reader: R,
    limits: &ScanLimits,
) -> Result<SessionMetadata, ExtractError> {
    let mut acc = Accumulator::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        if line.len() >= limits.full_parse_max_bytes && peek_kind(line) == Some(2) {
            scan_oversized_splice(&mut acc, line, line_no);
            continue;
        }

        match MutationRecord::parse(line) {
            Ok(record) => apply(&mut acc, record, line),
            Err(err) => debug!(
                component = "extractor",
                event = "extractor.log_line_skipped",
                line = line_no,
                error = %err,
            ),
        }
    }

    Ok(acc.finish(true))
}

fn apply(acc: &mut Accumulator, record: MutationRecord, line: &[u8]) {
    match record {
        MutationRecord::Snapshot(snapshot) => acc.apply_snapshot(&snapshot),
        MutationRecord::ScalarSet { key_path, value } => {
            if key_path.is(&["customTitle"]) {
                if let Value::String(title) = &value {
                    acc.title.offer_custom(title);
                }
            } else if key_path.is(&["requests"]) {
                if let Value::Array(items) = &value {
                    apply_request_items(acc, items);
                    if let Some(ts) = MutationRecord::requests(items).last().and_then(|r| r.timestamp) {
                        acc.observe_timestamp(ts);
                    }
                }
            }
        }
        MutationRecord::ArraySplice { key_path, items } => {
            if !key_path.starts_with("requests") {
                return;
            }
            acc.has_requests = true;
            scan_timestamps(acc, line);
            if key_path.is(&["requests"]) {
                apply_request_items(acc, &items);
            }
        }
        MutationRecord::Unknown(_) => {}
    }
}

fn apply_request_items(acc: &mut Accumulator, items: &[Value]) {
    if items.is_empty() {
        return;
    }
    acc.has_requests = true;
    if acc.title.has_derived() {
        return;
    }
    for request in MutationRecord::requests(items) {
        if let Some(text) = request.text() {
            if acc.title.offer_derived(&text) {
                break;
            }
        }
    }
}

fn scan_oversized_splice(acc: &mut Accumulator, line: &[u8], line_no: usize) {
    // An unreadable key path is taken as a plain request append.
    let key_path = peek_key_path(line).unwrap_or_else(|| KeyPath(vec![Value::from("requests")]));
    debug!(
        component = "extractor",
        event = "extractor.oversized_record_scanned",
        line = line_no,
        bytes = line.len(),
    );
    if !key_path.starts_with("requests") {
        return;
    }

    acc.has_requests = true;
    scan_timestamps(acc, line);
    if key_path.is(&["requests"]) && !acc.title.has_derived() {
        if let Some(text) = first_text(line) {
            acc.title.offer_derived(&text);
        }
    }
}

fn scan_timestamps(acc: &mut Accumulator, line: &[u8]) {
    for caps in timestamp_re().captures_iter(line) {
        if let Some(ts) = parse_digits(&caps[1]) {
            acc.observe_timestamp(ts);
        }
    }
}

/// First `"text"` value in the record, capped at 200 characters.
fn first_text(line: &[u8]) -> Option<String> {
    let raw = text_re().captures(line)?.get(1)?.as_bytes();

    let mut quoted = Vec::with_capacity(raw.len() + 2);
    quoted.push(b'"');
    quoted.extend_from_slice(raw);
    quoted.push(b'"');
    // The cap can cut an escape sequence short; fall back to the raw bytes.
    match serde_json::from_slice::<String>(&quoted) {
        Ok(text) => Some(text),
        Err(_) => Some(String::from_utf8_lossy(raw).into_owned()),
    }
}

fn windows(line: &[u8]) -> [&[u8]; 2] {
    let n = PROBE_WINDOW.min(line.len());
    [&line[..n], &line[line.len() - n..]]
}

/// `kind` of an oversized record: the first match near the start, else the
/// last one near the end.
fn peek_kind(line: &[u8]) -> Option<i64> {
    let [head, tail] = windows(line);
    let head_kind = kind_re().captures_iter(head).next().and_then(|c| parse_digits(&c[1]));
    head_kind.or_else(|| kind_re().captures_iter(tail).last().and_then(|c| parse_digits(&c[1])))
}

fn parse_digits(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn peek_key_path(line: &[u8]) -> Option<KeyPath> {
    let [head, tail] = windows(line);
    [head, tail].into_iter().find_map(|window| {
        let caps = key_path_re().captures(window)?;
        serde_json::from_slice(&caps[1]).ok()
    })
}
