//! Bytes → lines → entries → records.
//!
//! `RecordStream` is the lazy path: it pulls one entry at a time and the
//! caller may stop at any point. `Pipeline::parse` materializes the whole run,
//! and `Pipeline::parse_in_chunks` assembles bounded chunks in parallel while
//! keeping input order.

use crate::classify::Classifier;
use crate::config::PipelineOpts;
use crate::diagnostics::ParseDiagnostics;
use crate::encoding::Encoding;
use crate::error::IngestError;
use crate::multiline::{Entries, LogicalEntry};
use crate::reader::{open_lines, LineReader, SampledSource};
use crate::record::{ParsedRecord, RecordAssembler};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Read;
use std::ops::ControlFlow;

#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub encoding: Encoding,
    pub records: Vec<ParsedRecord>,
    pub diagnostics: ParseDiagnostics,
}

pub struct Pipeline {
    classifier: Classifier,
    opts: PipelineOpts,
    forced_encoding: Option<Encoding>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Classifier::builtin(), PipelineOpts::default())
    }
}

impl Pipeline {
    pub fn new(classifier: Classifier, opts: PipelineOpts) -> Self {
        Self { classifier, opts, forced_encoding: None }
    }

    /// Skip detection and decode with `encoding`.
    pub fn with_encoding(mut self, encoding: Option<Encoding>) -> Self {
        self.forced_encoding = encoding;
        self
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn assembler(&self) -> RecordAssembler<'_> {
        RecordAssembler::new(&self.classifier, self.opts.session_window_secs)
    }

    pub fn stream<R: Read>(&self, src: R) -> Result<RecordStream<'_, SampledSource<R>>, IngestError> {
        let lines = open_lines(src, self.opts.sample_bytes, self.forced_encoding)?;
        Ok(RecordStream {
            encoding: lines.encoding(),
            entries: Entries::new(lines),
            assembler: self.assembler(),
            diagnostics: ParseDiagnostics::default(),
            sample_cap: self.opts.failure_samples,
            finished: false,
        })
    }

    pub fn parse<R: Read>(&self, src: R) -> Result<ParseOutcome, IngestError> {
        let mut stream = self.stream(src)?;
        let mut records = Vec::new();
        for rec in stream.by_ref() {
            records.push(rec?);
        }
        Ok(ParseOutcome { encoding: stream.encoding(), records, diagnostics: stream.into_diagnostics() })
    }

    /// Assemble entries `chunk_entries` at a time on the rayon pool and hand
    /// each ordered chunk to `on_chunk`. Records reach the callback in input
    /// order; only one chunk is held at a time. Returning `Break` stops reading.
    pub fn parse_in_chunks<R, F>(
        &self,
        src: R,
        chunk_entries: usize,
        mut on_chunk: F,
    ) -> Result<(Encoding, ParseDiagnostics), IngestError>
    where
        R: Read,
        F: FnMut(Vec<ParsedRecord>) -> ControlFlow<()>,
    {
        let lines = open_lines(src, self.opts.sample_bytes, self.forced_encoding)?;
        let encoding = lines.encoding();
        let mut entries = Entries::new(lines);
        let assembler = self.assembler();
        let mut diagnostics = ParseDiagnostics::default();
        let chunk_entries = chunk_entries.max(1);
        let mut buf: Vec<LogicalEntry> = Vec::with_capacity(chunk_entries);

        loop {
            let mut exhausted = false;
            while buf.len() < chunk_entries {
                match entries.next() {
                    Some(entry) => buf.push(entry?),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if !buf.is_empty() {
                let assembled: Vec<(ParsedRecord, bool)> =
                    buf.par_iter().map(|e| assembler.assemble(e)).collect();
                let mut records = Vec::with_capacity(assembled.len());
                for (entry, (rec, failed)) in buf.drain(..).zip(assembled) {
                    diagnostics.record_entry(&entry.text, entry.orphan, failed, self.opts.failure_samples);
                    records.push(rec);
                }
                if on_chunk(records).is_break() {
                    break;
                }
            }
            if exhausted {
                break;
            }
        }
        diagnostics.total_lines = entries.lines_seen();
        log_summary(encoding, &diagnostics);
        Ok((encoding, diagnostics))
    }
}

/// Lazy record iterator over one source.
pub struct RecordStream<'a, R> {
    encoding: Encoding,
    entries: Entries<LineReader<R>>,
    assembler: RecordAssembler<'a>,
    diagnostics: ParseDiagnostics,
    sample_cap: usize,
    finished: bool,
}

impl<'a, R: Read> RecordStream<'a, R> {
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Counters so far; complete once the iterator has returned `None`.
    pub fn diagnostics(&self) -> &ParseDiagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> ParseDiagnostics {
        self.diagnostics
    }
}

impl<'a, R: Read> Iterator for RecordStream<'a, R> {
    type Item = Result<ParsedRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.entries.next();
        self.diagnostics.total_lines = self.entries.lines_seen();
        match next {
            Some(Ok(entry)) => {
                let (rec, failed) = self.assembler.assemble(&entry);
                self.diagnostics.record_entry(&entry.text, entry.orphan, failed, self.sample_cap);
                Some(Ok(rec))
            }
            Some(Err(e)) => Some(Err(e.into())),
            None => {
                if !self.finished {
                    self.finished = true;
                    log_summary(self.encoding, &self.diagnostics);
                }
                None
            }
        }
    }
}

fn log_summary(encoding: Encoding, d: &ParseDiagnostics) {
    tracing::info!(
        encoding = encoding.name(),
        lines = d.total_lines,
        entries = d.entries,
        parsed = d.parsed,
        failed = d.failed,
        orphans = d.orphans,
        "ingestion finished"
    );
}

/// Parse a whole source with the built-in signatures and default options.
pub fn parse_reader<R: Read>(src: R) -> Result<ParseOutcome, IngestError> {
    Pipeline::default().parse(src)
}
