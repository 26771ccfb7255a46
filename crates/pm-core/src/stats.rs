/// Population mean/stddev and percentile-rank helpers shared by the
/// Signal Engine and the Scanner. Kept tiny and dependency-free rather than
/// pulling in a statistics crate for three functions.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `z = (mid - mean) / stddev` using population statistics over `history`.
/// Requires `history.len() >= 10`; returns `0.0` below that or when
/// `stddev < 1e-9` (flat history), per spec.md §4.5.
pub fn zscore(history: &[f64], value: f64) -> f64 {
    if history.len() < 10 {
        return 0.0;
    }
    let sigma = population_stddev(history);
    if sigma < 1e-9 {
        return 0.0;
    }
    (value - mean(history)) / sigma
}

/// Rank-percentile of `value` within `population`, in `[0, 100]`.
/// Returns `None` when the population has fewer than 50 samples (warmup).
pub fn percentile_rank(population: &[f64], value: f64) -> Option<f64> {
    if population.len() < 50 {
        return None;
    }
    let below = population.iter().filter(|&&v| v <= value).count();
    Some(100.0 * below as f64 / population.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_needs_ten_samples() {
        let hist = vec![0.4; 5];
        assert_eq!(zscore(&hist, 0.5), 0.0);
    }

    #[test]
    fn zscore_flat_history_is_zero() {
        let hist = vec![0.4; 50];
        assert_eq!(zscore(&hist, 0.44), 0.0);
    }

    #[test]
    fn zscore_nonflat_history() {
        let mut hist = vec![0.4; 49];
        hist.push(0.405);
        let z = zscore(&hist, 0.44);
        assert!(z.abs() > 3.5, "expected large z, got {z}");
    }

    #[test]
    fn percentile_requires_warmup() {
        let pop = vec![0.01; 10];
        assert_eq!(percentile_rank(&pop, 0.01), None);
    }

    #[test]
    fn percentile_rank_basic() {
        let pop: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let p = percentile_rank(&pop, 49.0).unwrap();
        assert!((p - 50.0).abs() < 1.0, "got {p}");
    }
}
