use crate::reader::DecodedLine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;

/// grep -n / grep -rn style annotation: `1423:` or `access.log:1423:`
static RE_GREP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<file>[^\s:]+):)?(?P<line>\d+):").unwrap()
});

// IPv4 + whitespace, `[DD/Mon/YYYY`, or an IPv6 client followed by ident, user and `[`.
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:\d{1,3}(?:\.\d{1,3}){3}\s|\[\d{1,2}/[A-Za-z]{3}/\d{4}|[0-9A-Fa-f]{0,4}(?::[0-9A-Fa-f]{0,4}){2,7}\s+\S+\s+\S+\s+\[)",
    )
    .unwrap()
});

/// One log record, possibly rebuilt from several physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalEntry {
    pub text: String,
    pub source_file: Option<String>,
    pub source_line: Option<String>,
    /// Physical line number where the entry starts.
    pub first_line: usize,
    pub line_count: usize,
    /// Emitted while no entry was open; the text matched no anchor.
    pub orphan: bool,
}

/// Where an anchor was found in a line, with any grep provenance peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor<'a> {
    pub body: &'a str,
    pub source_file: Option<&'a str>,
    pub source_line: Option<&'a str>,
}

/// Returns the anchored portion of `line` if it starts a new entry.
pub fn find_anchor(line: &str) -> Option<Anchor<'_>> {
    // bare anchors first: an IPv6 client would otherwise read as `file:line:`
    if RE_ANCHOR.is_match(line) {
        return Some(Anchor { body: line.trim_start(), source_file: None, source_line: None });
    }
    if let Some(caps) = RE_GREP_PREFIX.captures(line) {
        let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let rest = &line[prefix_len..];
        if RE_ANCHOR.is_match(rest) {
            return Some(Anchor {
                body: rest.trim_start(),
                source_file: caps.name("file").map(|m| m.as_str()),
                source_line: caps.name("line").map(|m| m.as_str()),
            });
        }
    }
    None
}

struct Pending {
    fragments: Vec<String>,
    source_file: Option<String>,
    source_line: Option<String>,
    first_line: usize,
}

impl Pending {
    fn into_entry(self) -> LogicalEntry {
        LogicalEntry {
            line_count: self.fragments.len(),
            text: self.fragments.join(" "),
            source_file: self.source_file,
            source_line: self.source_line,
            first_line: self.first_line,
            orphan: false,
        }
    }
}

/// Merges wrapped physical lines back into logical entries.
///
/// A line opens a new entry when it begins (after an optional grep prefix)
/// with an IPv4 address, an IPv6 client ahead of its `[` timestamp, or an NCSA
/// `[DD/Mon/YYYY` date; anything else is a
/// continuation of the open entry, or an orphan entry when none is open.
///
/// Whitespace is normalized at fragment edges: each physical line is trimmed
/// and the fragments of one entry are joined with a single space. Blank lines
/// are dropped. Every other character of the input survives in order.
#[derive(Default)]
pub struct EntryReassembler {
    pending: Option<Pending>,
}

impl EntryReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: &DecodedLine) -> Option<LogicalEntry> {
        let text = line.text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(anchor) = find_anchor(text) {
            let next = Pending {
                fragments: vec![anchor.body.to_string()],
                source_file: anchor.source_file.map(str::to_string),
                source_line: anchor.source_line.map(str::to_string),
                first_line: line.number,
            };
            return self.pending.replace(next).map(Pending::into_entry);
        }

        match self.pending.as_mut() {
            Some(p) => {
                p.fragments.push(text.to_string());
                None
            }
            None => Some(LogicalEntry {
                text: text.to_string(),
                source_file: None,
                source_line: None,
                first_line: line.number,
                line_count: 1,
                orphan: true,
            }),
        }
    }

    pub fn finish(&mut self) -> Option<LogicalEntry> {
        self.pending.take().map(Pending::into_entry)
    }
}

/// Iterator adapter turning decoded lines into logical entries.
pub struct Entries<I> {
    lines: I,
    agg: EntryReassembler,
    lines_seen: usize,
    done: bool,
}

impl<I> Entries<I>
where
    I: Iterator<Item = io::Result<DecodedLine>>,
{
    pub fn new(lines: I) -> Self {
        Self { lines, agg: EntryReassembler::new(), lines_seen: 0, done: false }
    }

    /// Physical lines consumed so far, blank ones included.
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }
}

impl<I> Iterator for Entries<I>
where
    I: Iterator<Item = io::Result<DecodedLine>>,
{
    type Item = io::Result<LogicalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    self.lines_seen += 1;
                    if let Some(e) = self.agg.push(&line) {
                        return Some(Ok(e));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.agg.finish().map(Ok);
                }
            }
        }
    }
}

/// Reassemble an in-memory list of lines; convenient for tests and small inputs.
pub fn reassemble_lines<S: AsRef<str>>(lines: &[S]) -> Vec<LogicalEntry> {
    let mut agg = EntryReassembler::new();
    let mut out = Vec::new();
    for (i, l) in lines.iter().enumerate() {
        let line = DecodedLine {
            number: i + 1,
            text: l.as_ref().to_string(),
            encoding: crate::encoding::Encoding::Utf8,
        };
        if let Some(e) = agg.push(&line) { out.push(e); }
    }
    if let Some(e) = agg.finish() { out.push(e); }
    out
}
