/// Bytes inspected by the encoding detector before the stream is decoded.
pub const DEFAULT_SAMPLE_BYTES: usize = 64 * 1024;
/// Raw entries kept for operator inspection when extraction fails.
pub const DEFAULT_FAILURE_SAMPLES: usize = 5;
/// Session fingerprint bucket width (hour-aligned).
pub const DEFAULT_SESSION_WINDOW_SECS: i64 = 3600;
/// Distinct cleaned user-agents whose classification is memoized.
pub const DEFAULT_CLASSIFIER_CACHE: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOpts {
    pub sample_bytes: usize,
    pub failure_samples: usize,
    pub session_window_secs: i64,
    pub classifier_cache: usize,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            failure_samples: DEFAULT_FAILURE_SAMPLES,
            session_window_secs: DEFAULT_SESSION_WINDOW_SECS,
            classifier_cache: DEFAULT_CLASSIFIER_CACHE,
        }
    }
}
