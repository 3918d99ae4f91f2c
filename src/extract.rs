//! Tolerant field extraction for NCSA common/combined entries.
//!
//! Every field group runs a strict-to-relaxed cascade and settles on the `-`
//! placeholder when nothing matches. Extraction never fails.

use crate::parser;
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

pub const PLACEHOLDER: &str = "-";

static RE_REQ_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?P<method>[A-Z]{3,12})\s+(?P<path>[^\s"]+)(?:\s+(?P<version>HTTP/\d(?:\.\d)?))?""#).unwrap()
});

static RE_REQ_RELAXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<method>GET|POST|PUT|DELETE|HEAD|OPTIONS|PATCH|TRACE|CONNECT|PROPFIND)\s+(?P<path>/[^\s\x22]*)(?:\s+(?P<version>HTTP/\d(?:\.\d)?))?").unwrap()
});

static RE_LOOKS_LIKE_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{3,12}\s+\S+(?:\s+HTTP/\d(?:\.\d)?)?$").unwrap()
});

static RE_STATUS_BYTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)(?P<status>[1-5]\d{2})\s+(?P<bytes>-|\d+)(?:\s|"|$)"#).unwrap()
});

static RE_STATUS_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(?P<status>[1-5]\d{2})(?:\s|$)").unwrap()
});

static RE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap()
});

static RE_BRACKET_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());

static RE_IPV4_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$").unwrap()
});

static RE_IPV4_ANY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b").unwrap()
});

static RE_IPV6_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[0-9A-Fa-f]{1,4}:){7}[0-9A-Fa-f]{1,4}$|^[0-9A-Fa-f:]*::[0-9A-Fa-f:.]*$").unwrap()
});

static RE_ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/?#]*").unwrap()
});

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map",
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "bmp", "ico",
    "woff", "woff2", "ttf", "otf", "eot",
];

/// Raw field values of one logical entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields {
    pub client_ip: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub status_code: String,
    pub bytes_sent: String,
    pub referer: String,
    pub user_agent: String,
}

impl RawFields {
    pub fn has_request(&self) -> bool {
        self.method != PLACEHOLDER || self.path != PLACEHOLDER
    }

    /// True when none of timestamp, request line or status could be found.
    pub fn is_failed(&self) -> bool {
        self.timestamp.is_none() && !self.has_request() && self.status_code == PLACEHOLDER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

struct QuotedGroup<'a> {
    span: Span,
    text: &'a str,
}

pub fn extract_fields(entry: &str) -> RawFields {
    let groups = quoted_groups(entry);
    let (method, path, http_version, request_end) = extract_request(entry, &groups);
    let (status_code, bytes_sent) = extract_status_bytes(entry, &groups, request_end);
    let (referer, user_agent) = extract_referer_agent(&groups);
    RawFields {
        client_ip: extract_client_ip(entry),
        timestamp: parser::detect_timestamp_in_entry(entry),
        method,
        path,
        http_version,
        status_code,
        bytes_sent,
        referer,
        user_agent,
    }
}

/// All double-quoted substrings. An unterminated trailing quote runs to the
/// end of the entry (a UA cut off mid-export still counts).
fn quoted_groups(entry: &str) -> Vec<QuotedGroup<'_>> {
    let mut out: Vec<QuotedGroup<'_>> = RE_QUOTED
        .captures_iter(entry)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let inner = c.get(1)?;
            Some(QuotedGroup { span: Span { start: whole.start(), end: whole.end() }, text: inner.as_str() })
        })
        .collect();
    let tail_from = out.last().map(|g| g.span.end).unwrap_or(0);
    if let Some(rel) = entry[tail_from..].find('"') {
        let start = tail_from + rel;
        out.push(QuotedGroup {
            span: Span { start, end: entry.len() },
            text: entry[start + 1..].trim_end(),
        });
    }
    out
}

fn non_empty_or_placeholder(s: Option<&str>) -> String {
    match s.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Method, path and version, plus the byte offset where the request ends.
fn extract_request(entry: &str, groups: &[QuotedGroup<'_>]) -> (String, String, String, Option<usize>) {
    for re in [&*RE_REQ_STRICT, &*RE_REQ_RELAXED] {
        if let Some(c) = re.captures(entry) {
            return (
                non_empty_or_placeholder(c.name("method").map(|m| m.as_str())),
                non_empty_or_placeholder(c.name("path").map(|m| m.as_str())),
                non_empty_or_placeholder(c.name("version").map(|m| m.as_str())),
                c.get(0).map(|m| m.end()),
            );
        }
    }
    if let Some(first) = groups.first() {
        let t = first.text.trim();
        if !t.is_empty() && t != PLACEHOLDER {
            let mut parts = t.split_whitespace();
            return (
                non_empty_or_placeholder(parts.next()),
                non_empty_or_placeholder(parts.next()),
                non_empty_or_placeholder(parts.next()),
                Some(first.span.end),
            );
        }
    }
    (PLACEHOLDER.to_string(), PLACEHOLDER.to_string(), PLACEHOLDER.to_string(), None)
}

/// Blank out quoted and bracketed spans so digits inside a user-agent or a
/// timestamp cannot pass for a status code.
fn mask_spans(entry: &str, groups: &[QuotedGroup<'_>]) -> Option<String> {
    let mut bytes = entry.as_bytes().to_vec();
    let spans = groups
        .iter()
        .map(|g| g.span)
        .chain(RE_BRACKET_SPAN.find_iter(entry).map(|m| Span { start: m.start(), end: m.end() }));
    for s in spans {
        for b in &mut bytes[s.start..s.end] {
            *b = b' ';
        }
    }
    String::from_utf8(bytes).ok()
}

/// Status and bytes follow the request. The search starts after the request
/// (or after the timestamp bracket when there is none), so a numeric ident or
/// authuser is never read as a status. The whole entry is the last resort.
fn extract_status_bytes(entry: &str, groups: &[QuotedGroup<'_>], request_end: Option<usize>) -> (String, String) {
    let masked = mask_spans(entry, groups);
    let tail_from = request_end
        .or_else(|| RE_BRACKET_SPAN.find(entry).map(|m| m.end()))
        .unwrap_or(0);
    // masking is byte-for-byte, so offsets into `entry` hold in `masked`
    let tail = masked.as_deref().and_then(|m| m.get(tail_from..)).or_else(|| entry.get(tail_from..));
    let haystacks = tail.into_iter().chain(masked.as_deref()).chain(std::iter::once(entry));
    for hay in haystacks {
        if let Some(c) = RE_STATUS_BYTES.captures(hay) {
            return (
                non_empty_or_placeholder(c.name("status").map(|m| m.as_str())),
                non_empty_or_placeholder(c.name("bytes").map(|m| m.as_str())),
            );
        }
        if let Some(c) = RE_STATUS_ONLY.captures(hay) {
            return (non_empty_or_placeholder(c.name("status").map(|m| m.as_str())), PLACEHOLDER.to_string());
        }
    }
    (PLACEHOLDER.to_string(), PLACEHOLDER.to_string())
}

fn extract_referer_agent(groups: &[QuotedGroup<'_>]) -> (String, String) {
    if groups.len() >= 3 {
        return (
            non_empty_or_placeholder(groups.get(1).map(|g| g.text)),
            non_empty_or_placeholder(groups.last().map(|g| g.text)),
        );
    }
    let agent = groups
        .iter()
        .rev()
        .find(|g| !RE_LOOKS_LIKE_REQUEST.is_match(g.text.trim()))
        .map(|g| g.text);
    (PLACEHOLDER.to_string(), non_empty_or_placeholder(agent))
}

fn extract_client_ip(entry: &str) -> String {
    let trimmed = entry.trim_start();
    if let Some(first) = trimmed.split_whitespace().next() {
        if RE_IPV4_TOKEN.is_match(first) || (first.contains(':') && RE_IPV6_TOKEN.is_match(first)) {
            return first.to_string();
        }
    }
    let head = match trimmed.find('[') {
        Some(i) => &trimmed[..i],
        None => trimmed,
    };
    RE_IPV4_ANY
        .find(head)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Path split into its decoded path component and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NormalizedPath {
    pub path_clean: String,
    pub query_string: String,
    pub query_params: BTreeMap<String, Vec<String>>,
}

pub fn normalize_path(raw: &str) -> NormalizedPath {
    if raw == PLACEHOLDER || raw.is_empty() {
        return NormalizedPath {
            path_clean: PLACEHOLDER.to_string(),
            query_string: PLACEHOLDER.to_string(),
            query_params: BTreeMap::new(),
        };
    }
    let without_fragment = raw.split_once('#').map(|(p, _)| p).unwrap_or(raw);
    let (path_part, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };
    let path_part = match RE_ABSOLUTE_URL.find(path_part) {
        Some(m) if m.end() == path_part.len() => "/",
        Some(m) => &path_part[m.end()..],
        None => path_part,
    };
    let path_clean = match percent_decode_str(path_part).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path_part.to_string(),
    };
    let query_string = match query {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => PLACEHOLDER.to_string(),
    };
    NormalizedPath {
        path_clean,
        query_params: query.map(parse_query).unwrap_or_default(),
        query_string,
    }
}

/// `a=1&a=2&b` → {a: [1, 2], b: [""]}; `+` decodes to a space.
pub fn parse_query(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(k);
        if key.is_empty() {
            continue;
        }
        out.entry(key).or_default().push(decode_component(v));
    }
    out
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

pub fn is_static_asset(path_clean: &str) -> bool {
    let last = path_clean.rsplit('/').next().unwrap_or(path_clean);
    match last.rsplit_once('.') {
        Some((_, ext)) => STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// First non-empty path segment, or `-`.
pub fn url_section(path_clean: &str) -> String {
    if path_clean == PLACEHOLDER {
        return PLACEHOLDER.to_string();
    }
    path_clean
        .split('/')
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}
