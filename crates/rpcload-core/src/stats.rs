//! Sample summarization for latency and utilization series.
//!
//! Percentiles use nearest-rank lookup on a sorted copy of the input:
//! `index = floor(len * p)`, clamped to `len - 1`. Input order never matters.

use serde::{Deserialize, Serialize};

/// Summary statistics over a non-empty sample set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Result of summarizing a sample set.
///
/// An empty window (for example a test where every call failed) is a valid
/// outcome and is reported as [`Summary::NoData`] instead of NaN figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Summary {
    NoData,
    Measured(SummaryStats),
}

impl Summary {
    /// Returns the statistics when at least one sample was present.
    #[must_use]
    pub fn stats(&self) -> Option<&SummaryStats> {
        match self {
            Self::NoData => None,
            Self::Measured(stats) => Some(stats),
        }
    }

    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

/// Stateless summarizer for numeric sample sets.
pub struct StatisticsEngine;

impl StatisticsEngine {
    /// Summarizes `samples`, ignoring non-finite values.
    #[must_use]
    pub fn summarize(samples: &[f64]) -> Summary {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Summary::NoData;
        }

        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let avg = sum / count as f64;
        let variance = sorted.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

        Summary::Measured(SummaryStats {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg,
            p50: percentile(&sorted, 0.50),
            p90: percentile(&sorted, 0.90),
            p99: percentile(&sorted, 0.99),
            std_dev: variance.sqrt(),
        })
    }

    /// Arithmetic mean, or `None` for an empty slice.
    #[must_use]
    pub fn mean(samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Nearest-rank percentile over an already sorted, non-empty slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = ((sorted.len() as f64) * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_empty_input_is_no_data() {
        assert_eq!(StatisticsEngine::summarize(&[]), Summary::NoData);
        assert!(StatisticsEngine::summarize(&[f64::NAN]).is_no_data());
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        // 0, 100, 200, ..., 9900
        let samples: Vec<f64> = (0..100).map(|i| f64::from(i) * 100.0).collect();
        let summary = StatisticsEngine::summarize(&samples);
        let stats = summary.stats().unwrap();

        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 9900.0);
        assert_eq!(stats.p50, 5000.0);
        assert_eq!(stats.p90, 9000.0);
        assert_eq!(stats.p99, 9900.0);
    }

    #[test]
    fn test_single_sample_clamps_index() {
        let summary = StatisticsEngine::summarize(&[42.0]);
        let stats = summary.stats().unwrap();
        assert_eq!(stats.p50, 42.0);
        assert_eq!(stats.p99, 42.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_avg_and_std_dev() {
        let summary = StatisticsEngine::summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let stats = summary.stats().unwrap();
        assert_eq!(stats.avg, 5.0);
        assert_eq!(stats.std_dev, 2.0);
    }

    #[test]
    fn test_order_independent() {
        let samples: Vec<f64> = (0..257).map(|i| f64::from((i * 37) % 101)).collect();
        let mut shuffled = samples.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(7));

        assert_eq!(
            StatisticsEngine::summarize(&samples),
            StatisticsEngine::summarize(&shuffled)
        );
    }

    #[test]
    fn test_mean() {
        assert_eq!(StatisticsEngine::mean(&[]), None);
        assert_eq!(StatisticsEngine::mean(&[1.0, 3.0]), Some(2.0));
    }
}
