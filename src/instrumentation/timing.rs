/// Latency statistics over the API calls of one run, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSummary {
    pub calls: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl TimingSummary {
    /// `None` when no call was made.
    pub fn from_latencies(latencies: &[f64]) -> Option<Self> {
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.to_vec();
        sorted.sort_by(f64::total_cmp);

        let calls = sorted.len();
        let mid = calls / 2;
        let median = if calls % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            calls,
            mean: sorted.iter().sum::<f64>() / calls as f64,
            median,
            min: sorted[0],
            max: sorted[calls - 1],
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "API calls: {} | Latency mean: {:.2}s median: {:.2}s min: {:.2}s max: {:.2}s",
            self.calls, self.mean, self.median, self.min, self.max
        )
    }
}
