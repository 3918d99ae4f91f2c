//! Byte-sample encoding detection.
//!
//! Access logs exported from Windows tooling are often UTF-16 or CP1252, and
//! older servers write Latin-1. The detector picks the candidate whose decoding
//! of a sample looks most like text; it never fails.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16LE")]
    Utf16Le,
    #[serde(rename = "UTF-16BE")]
    Utf16Be,
    #[serde(rename = "Latin-1")]
    Latin1,
    #[serde(rename = "CP1252")]
    Cp1252,
}

/// Scoring candidates in tie-break priority order.
const CANDIDATES: [Encoding; 5] = [
    Encoding::Utf8,
    Encoding::Latin1,
    Encoding::Cp1252,
    Encoding::Utf16Le,
    Encoding::Utf16Be,
];

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Latin1 => "Latin-1",
            Encoding::Cp1252 => "CP1252",
        }
    }

    /// Resolve a user-supplied label such as `utf8`, `utf-16`, `latin1` or `windows-1252`.
    pub fn from_label(label: &str) -> Option<Encoding> {
        let norm: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "utf8" => Some(Encoding::Utf8),
            "utf16" | "utf16le" => Some(Encoding::Utf16Le),
            "utf16be" => Some(Encoding::Utf16Be),
            "latin1" | "iso88591" | "l1" => Some(Encoding::Latin1),
            "cp1252" | "windows1252" => Some(Encoding::Cp1252),
            _ => None,
        }
    }

    /// The streaming decoder backing this encoding, if `encoding_rs` provides one.
    /// Latin-1 is a plain byte-to-code-point map and has none.
    pub(crate) fn rs_encoding(self) -> Option<&'static encoding_rs::Encoding> {
        match self {
            Encoding::Utf8 => Some(encoding_rs::UTF_8),
            Encoding::Utf16Le => Some(encoding_rs::UTF_16LE),
            Encoding::Utf16Be => Some(encoding_rs::UTF_16BE),
            Encoding::Cp1252 => Some(encoding_rs::WINDOWS_1252),
            Encoding::Latin1 => None,
        }
    }

    /// Decode a complete buffer, substituting U+FFFD for malformed sequences.
    pub fn decode_lossy(self, bytes: &[u8]) -> String {
        match self.rs_encoding() {
            Some(enc) => enc.decode_without_bom_handling(bytes).0.into_owned(),
            None => decode_latin1(bytes),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn detect_encoding(sample: &[u8]) -> Encoding {
    if sample.is_empty() {
        return Encoding::Utf8;
    }
    if let Some(enc) = sniff_bom(sample) {
        return enc;
    }
    if let Some(enc) = utf16_by_nuls(sample) {
        return enc;
    }
    if is_utf8_prefix(sample) {
        return Encoding::Utf8;
    }

    let mut best = Encoding::Utf8;
    let mut best_score = f64::MIN;
    for enc in CANDIDATES {
        let score = printable_ratio(&enc.decode_lossy(sample));
        // strict comparison keeps the earlier candidate on ties
        if score > best_score {
            best = enc;
            best_score = score;
        }
    }
    best
}

fn sniff_bom(sample: &[u8]) -> Option<Encoding> {
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(Encoding::Utf8)
    } else if sample.starts_with(&[0xFF, 0xFE]) {
        Some(Encoding::Utf16Le)
    } else if sample.starts_with(&[0xFE, 0xFF]) {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

/// ASCII text encoded as UTF-16 has a zero byte in every other position:
/// odd offsets for LE, even for BE. Only dense NULs (a quarter of the sample
/// or more) that sit almost entirely on one parity count; a few stray NULs in
/// a UTF-8 file are left to the scoring pass.
fn utf16_by_nuls(sample: &[u8]) -> Option<Encoding> {
    let (mut even, mut odd) = (0usize, 0usize);
    for (i, b) in sample.iter().enumerate() {
        if *b == 0 {
            if i % 2 == 0 { even += 1; } else { odd += 1; }
        }
    }
    let nuls = even + odd;
    if nuls == 0 || nuls * 4 < sample.len() {
        return None;
    }
    let dominant = even.max(odd);
    if dominant * 10 < nuls * 9 {
        return None;
    }
    Some(if even > odd { Encoding::Utf16Be } else { Encoding::Utf16Le })
}

/// Valid UTF-8, tolerating a multi-byte sequence cut off by the sample boundary.
fn is_utf8_prefix(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

fn is_printable(c: char) -> bool {
    c != char::REPLACEMENT_CHARACTER && (!c.is_control() || matches!(c, '\t' | '\n' | '\r'))
}

pub(crate) fn printable_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut printable = 0usize;
    for c in text.chars() {
        total += 1;
        if is_printable(c) {
            printable += 1;
        }
    }
    if total == 0 { 0.0 } else { printable as f64 / total as f64 }
}
