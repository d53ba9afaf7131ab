//! Running compression telemetry. Never consulted for control flow.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    pub processed: u64,
    /// Mean percentage size reduction over all processed items.
    pub average_reduction: f64,
}

impl CompressionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one successful encode into the running average.
    pub fn record(&mut self, original_size: u64, encoded_size: u64) {
        if original_size == 0 {
            return;
        }
        let pct = (original_size as f64 - encoded_size as f64) * 100.0 / original_size as f64;
        self.processed += 1;
        let n = self.processed as f64;
        self.average_reduction = (self.average_reduction * (n - 1.0) + pct) / n;
    }
}

impl std::fmt::Display for CompressionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {:.1}% average reduction",
            self.processed, self.average_reduction
        )
    }
}
