// diagnostics/quantile.rs
// Order statistics over gathered per-cell samples

/// Index of quantile `q` in a sorted sample of length `n`: `floor(q n)`,
/// clamped to the last element.
pub fn quantile_index(q: f64, n: usize) -> usize {
    debug_assert!(n > 0);
    let idx = (q * n as f64).floor();
    if idx <= 0.0 || idx.is_nan() {
        0
    } else {
        (idx as usize).min(n - 1)
    }
}

/// Value at quantile `q` of an already sorted sample; 0 when empty.
pub fn order_statistic(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        0.0
    } else {
        sorted[quantile_index(q, sorted.len())]
    }
}

pub fn sort_f64(values: &mut [f64]) {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
}

pub fn quantiles_f64(sorted: &[f64], levels: &[f64]) -> Vec<f64> {
    levels.iter().map(|&q| order_statistic(sorted, q)).collect()
}

pub fn quantiles_u32(sorted: &[u32], levels: &[f64]) -> Vec<f64> {
    levels
        .iter()
        .map(|&q| {
            if sorted.is_empty() {
                0.0
            } else {
                sorted[quantile_index(q, sorted.len())] as f64
            }
        })
        .collect()
}

/// Element at `n/2` after sorting, `None` for an empty sample.
pub fn median_u32(mut values: Vec<u32>) -> Option<u32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    Some(values[values.len() / 2])
}
