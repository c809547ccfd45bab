//! Periodic host resource sampling.
//!
//! The sampler ticks on its own tokio task and performs every snapshot on the
//! blocking pool, so `/proc` reads and sysinfo refreshes never stall worker
//! tasks. The first snapshot is taken one full interval after `start`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use rpcload_core::ResourceSample;

use crate::metrics;

/// Point-in-time host utilization, before it is stamped by the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceReading {
    pub cpu_percent: f64,
    pub memory_used_percent: f64,
    pub disk_read_iops: f64,
    pub disk_write_iops: f64,
}

/// Source of host utilization readings.
///
/// `read` is called from the blocking pool and may perform blocking I/O.
pub trait ResourceProbe: Send + 'static {
    fn read(&mut self) -> ResourceReading;
}

/// Probe backed by sysinfo (CPU, memory) and `/proc/diskstats` (disk IOPS).
pub struct SystemProbe {
    system: System,
    disk: DiskStats,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is computed between two refreshes; prime the first one.
        system.refresh_cpu();
        system.refresh_memory();

        let mut disk = DiskStats::new("/proc/diskstats");
        disk.rates();

        Self { system, disk }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn read(&mut self) -> ResourceReading {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let total_memory = self.system.total_memory();
        let memory_used_percent = if total_memory == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total_memory as f64 * 100.0
        };

        let (disk_read_iops, disk_write_iops) = self.disk.rates();

        ResourceReading {
            cpu_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_used_percent,
            disk_read_iops,
            disk_write_iops,
        }
    }
}

/// Completed-I/O counters from a diskstats file, turned into per-second rates.
struct DiskStats {
    path: &'static str,
    previous: Option<(u64, u64, std::time::Instant)>,
}

impl DiskStats {
    fn new(path: &'static str) -> Self {
        Self {
            path,
            previous: None,
        }
    }

    /// Read and write IOPS since the previous call; zero on the first call or
    /// when the counters are unavailable.
    fn rates(&mut self) -> (f64, f64) {
        let Some((reads, writes)) = std::fs::read_to_string(self.path)
            .ok()
            .map(|content| parse_diskstats(&content, is_whole_disk))
        else {
            return (0.0, 0.0);
        };

        let now = std::time::Instant::now();
        let rates = match self.previous {
            Some((prev_reads, prev_writes, at)) => {
                let secs = now.duration_since(at).as_secs_f64();
                if secs > 0.0 {
                    (
                        reads.saturating_sub(prev_reads) as f64 / secs,
                        writes.saturating_sub(prev_writes) as f64 / secs,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };

        self.previous = Some((reads, writes, now));
        rates
    }
}

fn is_whole_disk(name: &str) -> bool {
    !name.starts_with("loop")
        && !name.starts_with("ram")
        && Path::new("/sys/block").join(name).exists()
}

/// Sums completed reads and writes over devices accepted by `include`.
///
/// Fields per line: major, minor, name, reads completed, reads merged,
/// sectors read, ms reading, writes completed, ...
fn parse_diskstats(content: &str, include: impl Fn(&str) -> bool) -> (u64, u64) {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 || !include(fields[2]) {
                return None;
            }
            let reads = fields[3].parse::<u64>().ok()?;
            let writes = fields[7].parse::<u64>().ok()?;
            Some((reads, writes))
        })
        .fold((0, 0), |(r, w), (reads, writes)| (r + reads, w + writes))
}

/// Starts sampling sessions against a shared probe.
#[derive(Clone)]
pub struct ResourceSampler {
    probe: Arc<Mutex<dyn ResourceProbe>>,
    interval: Duration,
}

impl ResourceSampler {
    pub fn new<P: ResourceProbe>(probe: P, interval: Duration) -> Self {
        Self {
            probe: Arc::new(Mutex::new(probe)),
            interval,
        }
    }

    /// Sampler over the real host.
    pub fn system(interval: Duration) -> Self {
        Self::new(SystemProbe::new(), interval)
    }

    /// Spawns the sampling task and returns its handle.
    pub fn start(&self) -> SamplerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let probe = Arc::clone(&self.probe);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = interval_at(started + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut samples = Vec::new();

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let probe = Arc::clone(&probe);
                        let reading = match tokio::task::spawn_blocking(move || probe.lock().read()).await {
                            Ok(reading) => reading,
                            Err(e) => {
                                tracing::warn!(error = %e, "resource snapshot failed");
                                continue;
                            }
                        };

                        metrics::HOST_CPU_PERCENT.set(reading.cpu_percent);
                        metrics::HOST_MEMORY_PERCENT.set(reading.memory_used_percent);

                        samples.push(ResourceSample {
                            timestamp_ms: started.elapsed().as_millis() as u64,
                            cpu_percent: reading.cpu_percent,
                            memory_used_percent: reading.memory_used_percent,
                            disk_read_iops: reading.disk_read_iops,
                            disk_write_iops: reading.disk_write_iops,
                        });
                    }
                }
            }

            tracing::debug!(samples = samples.len(), "resource sampler stopped");
            samples
        });

        SamplerHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            collected: Vec::new(),
        }
    }
}

/// Handle to a running sampler. Dropping it stops the sampler.
pub struct SamplerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<ResourceSample>>>,
    collected: Vec<ResourceSample>,
}

impl SamplerHandle {
    /// Stops sampling and returns the samples taken, possibly none.
    ///
    /// Calling `stop` again returns the same samples.
    pub async fn stop(&mut self) -> Vec<ResourceSample> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have exited; nothing to signal then.
            let _ = stop_tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(samples) => self.collected = samples,
                Err(e) => tracing::warn!(error = %e, "resource sampler task failed"),
            }
        }

        self.collected.clone()
    }
}
