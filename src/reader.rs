//! Lazy decoding of a byte source into text lines.

use crate::encoding::{detect_encoding, Encoding};
use encoding_rs::CoderResult;
use std::collections::VecDeque;
use std::io::{self, Chain, Cursor, Read};

const READ_CHUNK: usize = 64 * 1024;

/// One physical line, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    pub number: usize,
    pub text: String,
    pub encoding: Encoding,
}

/// The detection sample is re-read in front of the untouched remainder.
pub type SampledSource<R> = Chain<Cursor<Vec<u8>>, R>;

enum TextDecoder {
    Stream(encoding_rs::Decoder),
    Latin1,
}

impl TextDecoder {
    fn new(encoding: Encoding) -> Self {
        match encoding.rs_encoding() {
            Some(enc) => TextDecoder::Stream(enc.new_decoder_with_bom_removal()),
            None => TextDecoder::Latin1,
        }
    }

    fn decode(&mut self, mut src: &[u8], dst: &mut String, last: bool) {
        match self {
            TextDecoder::Latin1 => dst.extend(src.iter().map(|&b| b as char)),
            TextDecoder::Stream(dec) => loop {
                let need = dec
                    .max_utf8_buffer_length(src.len())
                    .unwrap_or(src.len() * 3 + 16);
                dst.reserve(need);
                let (result, read, _replaced) = dec.decode_to_string(src, dst, last);
                src = &src[read..];
                match result {
                    CoderResult::InputEmpty => break,
                    CoderResult::OutputFull => continue,
                }
            },
        }
    }
}

/// Single-pass iterator over the decoded lines of a source.
///
/// Only the current read chunk and a partial trailing line are held in memory.
/// Malformed byte sequences decode to U+FFFD; the only error surfaced is an
/// I/O failure of the source itself.
pub struct LineReader<R> {
    inner: R,
    encoding: Encoding,
    decoder: TextDecoder,
    chunk: Vec<u8>,
    pending: String,
    ready: VecDeque<String>,
    line_no: usize,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, encoding: Encoding) -> Self {
        Self {
            inner,
            encoding,
            decoder: TextDecoder::new(encoding),
            chunk: vec![0u8; READ_CHUNK],
            pending: String::new(),
            ready: VecDeque::new(),
            line_no: 0,
            eof: false,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Physical lines handed out so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    fn split_pending(&mut self) {
        let mut start = 0;
        while let Some(rel) = self.pending[start..].find('\n') {
            let end = start + rel;
            self.ready.push_back(clean_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
    }

    fn fill(&mut self) -> io::Result<()> {
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(0) => {
                    self.decoder.decode(&[], &mut self.pending, true);
                    self.eof = true;
                    self.split_pending();
                    if !self.pending.is_empty() {
                        let tail = std::mem::take(&mut self.pending);
                        self.ready.push_back(clean_line(&tail));
                    }
                    return Ok(());
                }
                Ok(n) => {
                    self.decoder.decode(&self.chunk[..n], &mut self.pending, false);
                    self.split_pending();
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = io::Result<DecodedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(text) = self.ready.pop_front() {
                self.line_no += 1;
                return Some(Ok(DecodedLine { number: self.line_no, text, encoding: self.encoding }));
            }
            if self.eof {
                return None;
            }
            if let Err(e) = self.fill() {
                self.eof = true;
                return Some(Err(e));
            }
        }
    }
}

fn clean_line(raw: &str) -> String {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    if line.contains('\0') {
        line.chars().filter(|c| *c != '\0').collect()
    } else {
        line.to_string()
    }
}

/// Read the detection sample from `src`, pick an encoding (unless `forced`),
/// and return a reader that replays the sample before the rest of the source.
pub fn open_lines<R: Read>(
    mut src: R,
    sample_bytes: usize,
    forced: Option<Encoding>,
) -> io::Result<LineReader<SampledSource<R>>> {
    let mut sample = Vec::with_capacity(sample_bytes.min(READ_CHUNK * 4));
    (&mut src).take(sample_bytes as u64).read_to_end(&mut sample)?;
    let encoding = match forced {
        Some(enc) => enc,
        None => detect_encoding(&sample),
    };
    tracing::debug!(
        encoding = encoding.name(),
        sample_len = sample.len(),
        forced = forced.is_some(),
        "selected source encoding"
    );
    Ok(LineReader::new(Cursor::new(sample).chain(src), encoding))
}
