//! Descriptive statistics shared by the baseline, detectors and reports.

/// Count, mean, sample standard deviation and maximum of a series.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleStats {
    pub count: usize,
    pub mean: f64,
    /// Sample (n - 1) standard deviation; 0 when fewer than two points.
    pub std_dev: f64,
    pub max: f64,
}

impl SampleStats {
    /// Single pass over `values` (Welford's update).
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        let mut max = f64::NEG_INFINITY;

        for x in values {
            count += 1;
            let delta = x - mean;
            mean += delta / count as f64;
            m2 += delta * (x - mean);
            max = max.max(x);
        }

        if count == 0 {
            return Self::default();
        }

        let std_dev = if count > 1 {
            (m2 / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Self {
            count,
            mean,
            std_dev,
            max,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Arithmetic mean, or `None` for an empty series.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let stats = SampleStats::from_values(values);
    (!stats.is_empty()).then_some(stats.mean)
}

/// Nearest-rank percentile: sort ascending, take index `floor(n * p / 100)`
/// clamped to `[0, n - 1]`. Returns 0 for an empty series.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((sorted.len() as f64 * p / 100.0).floor().max(0.0) as usize).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stats() {
        let stats = SampleStats::from_values([1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stats.count, 5);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        // Sample variance of 1..5 is 2.5
        assert!((stats.std_dev - 2.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.max, 5.0);
    }

    #[test]
    fn test_single_point_has_zero_std() {
        let stats = SampleStats::from_values([42.0]);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_empty_series() {
        assert!(SampleStats::from_values(std::iter::empty()).is_empty());
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_p95_of_ten_samples_is_last() {
        let latencies = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        // floor(10 * 0.95) = 9
        assert_eq!(percentile(&latencies, 95.0), 1.0);
        assert_eq!(percentile(&latencies, 50.0), 0.6);
        assert_eq!(percentile(&latencies, 0.0), 0.1);
        assert_eq!(percentile(&latencies, 100.0), 1.0);
    }

    #[test]
    fn test_percentile_ignores_input_order() {
        assert_eq!(percentile(&[3.0, 1.0, 2.0], 50.0), 2.0);
    }
}
