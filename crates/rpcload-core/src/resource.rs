use serde::{Deserialize, Serialize};

/// One snapshot of host utilization taken by the resource sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Milliseconds since the sampler started.
    pub timestamp_ms: u64,
    /// Global CPU utilization (0-100).
    pub cpu_percent: f64,
    /// Used memory as a share of total memory (0-100).
    pub memory_used_percent: f64,
    /// Completed disk reads per second since the previous snapshot.
    pub disk_read_iops: f64,
    /// Completed disk writes per second since the previous snapshot.
    pub disk_write_iops: f64,
}

impl ResourceSample {
    /// Combined read and write IOPS.
    #[must_use]
    pub fn disk_total_iops(&self) -> f64 {
        self.disk_read_iops + self.disk_write_iops
    }
}

/// Utilization at the start, end and peak of a test window.
///
/// `peak` holds the per-field maximum across the window, so its values may
/// come from different samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub start: ResourceSample,
    pub end: ResourceSample,
    pub peak: ResourceSample,
}

impl ResourceUsage {
    /// Condenses a sample window; `None` when no sample was taken.
    #[must_use]
    pub fn from_samples(samples: &[ResourceSample]) -> Option<Self> {
        let start = *samples.first()?;
        let end = *samples.last()?;

        let peak = samples.iter().skip(1).fold(start, |peak, s| ResourceSample {
            timestamp_ms: if s.cpu_percent > peak.cpu_percent {
                s.timestamp_ms
            } else {
                peak.timestamp_ms
            },
            cpu_percent: peak.cpu_percent.max(s.cpu_percent),
            memory_used_percent: peak.memory_used_percent.max(s.memory_used_percent),
            disk_read_iops: peak.disk_read_iops.max(s.disk_read_iops),
            disk_write_iops: peak.disk_write_iops.max(s.disk_write_iops),
        });

        Some(Self { start, end, peak })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, cpu: f64, mem: f64, read: f64, write: f64) -> ResourceSample {
        ResourceSample {
            timestamp_ms: ts,
            cpu_percent: cpu,
            memory_used_percent: mem,
            disk_read_iops: read,
            disk_write_iops: write,
        }
    }

    #[test]
    fn test_usage_empty_window() {
        assert!(ResourceUsage::from_samples(&[]).is_none());
    }

    #[test]
    fn test_usage_start_end_peak() {
        let samples = vec![
            sample(1000, 20.0, 40.0, 5.0, 1.0),
            sample(2000, 90.0, 35.0, 2.0, 9.0),
            sample(3000, 30.0, 60.0, 1.0, 1.0),
        ];

        let usage = ResourceUsage::from_samples(&samples).unwrap();
        assert_eq!(usage.start, samples[0]);
        assert_eq!(usage.end, samples[2]);
        assert_eq!(usage.peak.timestamp_ms, 2000);
        assert_eq!(usage.peak.cpu_percent, 90.0);
        assert_eq!(usage.peak.memory_used_percent, 60.0);
        assert_eq!(usage.peak.disk_read_iops, 5.0);
        assert_eq!(usage.peak.disk_write_iops, 9.0);
    }
}
