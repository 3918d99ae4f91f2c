use crate::classify::{AgentGroup, Classifier};
use crate::extract::{self, RawFields, PLACEHOLDER};
use crate::multiline::LogicalEntry;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One access-log request, fully extracted, classified and enriched.
///
/// Every field carries a value; `-` (or an empty map, or `Unknown`) marks a
/// value that could not be recovered from the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRecord {
    pub source_file: String,
    pub source_line: String,
    pub client_ip: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub path_clean: String,
    pub query_string: String,
    pub query_params: BTreeMap<String, Vec<String>>,
    pub status_code: String,
    pub status_class: String,
    pub bytes_sent: String,
    pub referer: String,
    pub user_agent_raw: String,
    pub user_agent_canonical: String,
    pub agent_group: AgentGroup,
    pub is_static_asset: bool,
    pub url_section: String,
    pub session_fingerprint: String,
    pub raw_entry: String,
}

pub fn status_class(status_code: &str) -> String {
    let mut chars = status_code.chars();
    match (chars.next(), status_code.len()) {
        (Some(d), 3) if status_code.chars().all(|c| c.is_ascii_digit()) => format!("{d}xx"),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Time bucket index for `ts` with a `window_secs` width, aligned to the epoch.
pub fn time_bucket(ts: Option<&DateTime<FixedOffset>>, window_secs: i64) -> Option<i64> {
    let ts = ts?;
    let secs = ts.timestamp();
    if window_secs <= 0 {
        return Some(secs);
    }
    Some(secs.div_euclid(window_secs))
}

/// Stable pseudo-session key: SHA-256 over ip, canonical UA and time bucket,
/// truncated to 16 hex characters.
pub fn session_fingerprint(client_ip: &str, canonical_ua: &str, bucket: Option<i64>) -> String {
    let bucket = bucket.map(|b| b.to_string()).unwrap_or_else(|| PLACEHOLDER.to_string());
    let mut hasher = Sha256::new();
    hasher.update(format!("{client_ip}|{canonical_ua}|{bucket}").as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Turns logical entries into records. Holds no per-run state, so assembly
/// is pure and may run on several threads at once.
pub struct RecordAssembler<'a> {
    classifier: &'a Classifier,
    session_window_secs: i64,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(classifier: &'a Classifier, session_window_secs: i64) -> Self {
        Self { classifier, session_window_secs }
    }

    /// Returns the record and whether extraction failed outright.
    pub fn assemble(&self, entry: &LogicalEntry) -> (ParsedRecord, bool) {
        let fields = extract::extract_fields(&entry.text);
        let failed = fields.is_failed();
        (self.build(entry, fields), failed)
    }

    fn build(&self, entry: &LogicalEntry, fields: RawFields) -> ParsedRecord {
        let class = self.classifier.classify(&fields.user_agent);
        let normalized = extract::normalize_path(&fields.path);
        let bucket = time_bucket(fields.timestamp.as_ref(), self.session_window_secs);
        let session_fingerprint = session_fingerprint(&fields.client_ip, &class.canonical, bucket);
        ParsedRecord {
            source_file: entry.source_file.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
            source_line: entry.source_line.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
            status_class: status_class(&fields.status_code),
            is_static_asset: extract::is_static_asset(&normalized.path_clean),
            url_section: extract::url_section(&normalized.path_clean),
            client_ip: fields.client_ip,
            timestamp: fields.timestamp,
            method: fields.method,
            path: fields.path,
            http_version: fields.http_version,
            path_clean: normalized.path_clean,
            query_string: normalized.query_string,
            query_params: normalized.query_params,
            status_code: fields.status_code,
            bytes_sent: fields.bytes_sent,
            referer: fields.referer,
            user_agent_raw: fields.user_agent,
            user_agent_canonical: class.canonical,
            agent_group: class.group,
            session_fingerprint,
            raw_entry: entry.text.clone(),
        }
    }
}
