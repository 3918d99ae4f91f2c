use thiserror::Error;

/// Errors that can stop an ingestion run.
///
/// Malformed log content never produces one of these; it is absorbed as
/// placeholders and counted in the diagnostics instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("i/o error reading log source: {0}")]
    Io(#[from] std::io::Error),
    #[error("signature table parse error: {0}")]
    SignatureFile(#[from] serde_json::Error),
    #[error("invalid signature pattern {pattern:?}: {source}")]
    SignaturePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
