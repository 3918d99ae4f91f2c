use serde::{Deserialize, Serialize};

/// Counters for one ingestion run.
///
/// `failed` counts entries where timestamp, request line and status were all
/// missing; `parsed` counts every other entry, however sparse. The two always
/// add up to `entries`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostics {
    pub total_lines: usize,
    pub entries: usize,
    pub parsed: usize,
    pub failed: usize,
    pub orphans: usize,
    pub failure_samples: Vec<String>,
}

impl ParseDiagnostics {
    pub(crate) fn record_entry(&mut self, raw: &str, orphan: bool, failed: bool, sample_cap: usize) {
        self.entries += 1;
        if orphan {
            self.orphans += 1;
        }
        if failed {
            self.failed += 1;
            if self.failure_samples.len() < sample_cap {
                self.failure_samples.push(raw.to_string());
            }
            tracing::trace!(entry = raw, "no timestamp, request or status extracted");
        } else {
            self.parsed += 1;
        }
    }

    /// Share of entries that failed extraction, 0.0 for an empty run.
    pub fn failure_ratio(&self) -> f64 {
        if self.entries == 0 { 0.0 } else { self.failed as f64 / self.entries as f64 }
    }
}
