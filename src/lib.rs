pub mod aggregate;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod multiline;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod record;

pub use classify::{AgentGroup, Classification, Classifier, SignatureTable};
pub use diagnostics::ParseDiagnostics;
pub use encoding::Encoding;
pub use error::IngestError;
pub use pipeline::{parse_reader, ParseOutcome, Pipeline, RecordStream};
pub use record::ParsedRecord;

#[cfg(test)]
mod timestamp_tests;
