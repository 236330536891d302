//! Rank-based percentiles over duration samples.

/// Ceiling-rank percentile: sort ascending, take index `ceil(n * p / 100) - 1`
/// clamped to `[0, n - 1]`. An empty sample yields `0.0`.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[rank_index(sorted.len(), p)]
}

pub fn median(samples: &[f64]) -> f64 {
    percentile(samples, 50.0)
}

/// `None` for an empty sample, so callers can tell "no data" from a real 0.
pub fn percentile_opt(samples: &[f64], p: f64) -> Option<f64> {
    (!samples.is_empty()).then(|| percentile(samples, p))
}

fn rank_index(n: usize, p: f64) -> usize {
    let rank = (n as f64 * p / 100.0).ceil() as i64 - 1;
    rank.clamp(0, n as i64 - 1) as usize
}
