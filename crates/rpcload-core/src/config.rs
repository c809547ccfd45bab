//! Engine configuration
//!
//! Thresholds and stage parameters are plain values passed into the engine
//! components. `EngineConfig::load` layers sources with this precedence:
//! 1. Environment variables (`RPCLOAD__THRESHOLDS__CPU_PERCENT=90`)
//! 2. Config file named by the `RPCLOAD_CONFIG` env var
//! 3. ./config/rpcload.{yaml,toml,json}
//! 4. Hardcoded defaults

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};

/// Root configuration for a load-testing session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub stages: StageConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,
}

impl EngineConfig {
    /// Loads configuration from defaults, files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> LoadResult<Self> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("RPCLOAD_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder
            .add_source(File::with_name("./config/rpcload").required(false))
            .add_source(
                Environment::with_prefix("RPCLOAD")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stages.progressive_rps_levels"),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a single file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let config: Self = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn set_defaults(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let defaults = Self::default();
        builder
            // Thresholds
            .set_default("thresholds.cpu_percent", defaults.thresholds.cpu_percent)?
            .set_default("thresholds.memory_percent", defaults.thresholds.memory_percent)?
            .set_default("thresholds.disk_iops", defaults.thresholds.disk_iops)?
            .set_default(
                "thresholds.min_success_rate_percent",
                defaults.thresholds.min_success_rate_percent,
            )?
            .set_default(
                "thresholds.max_error_rate_percent",
                defaults.thresholds.max_error_rate_percent,
            )?
            .set_default("thresholds.grace_period_secs", defaults.thresholds.grace_period_secs)?
            .set_default("thresholds.cpu_spike_factor", defaults.thresholds.cpu_spike_factor)?
            .set_default(
                "thresholds.cpu_spike_share_percent",
                defaults.thresholds.cpu_spike_share_percent,
            )?
            .set_default(
                "thresholds.memory_growth_percent",
                defaults.thresholds.memory_growth_percent,
            )?
            .set_default(
                "thresholds.memory_trend_window",
                defaults.thresholds.memory_trend_window as u64,
            )?
            .set_default(
                "thresholds.tail_latency_ratio",
                defaults.thresholds.tail_latency_ratio,
            )?
            // Stages
            .set_default("stages.rpc_method", defaults.stages.rpc_method)?
            .set_default("stages.baseline_calls", defaults.stages.baseline_calls)?
            .set_default(
                "stages.progressive_rps_levels",
                defaults.stages.progressive_rps_levels,
            )?
            .set_default(
                "stages.progressive_duration_secs",
                defaults.stages.progressive_duration_secs,
            )?
            .set_default("stages.sustained_fraction", defaults.stages.sustained_fraction)?
            .set_default(
                "stages.sustained_duration_secs",
                defaults.stages.sustained_duration_secs,
            )?
            .set_default("stages.call_timeout_ms", defaults.stages.call_timeout_ms)?
            // Probe
            .set_default("probe.initial_concurrency", defaults.probe.initial_concurrency)?
            .set_default("probe.max_concurrency", defaults.probe.max_concurrency)?
            .set_default("probe.max_doublings", defaults.probe.max_doublings)?
            // Sampler
            .set_default("sampler.interval_ms", defaults.sampler.interval_ms)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Configuration`] naming the first invalid key.
    pub fn validate(&self) -> LoadResult<()> {
        self.thresholds.validate()?;

        if self.stages.progressive_rps_levels.iter().any(|&rps| rps == 0) {
            return Err(LoadError::configuration(
                "stages.progressive_rps_levels must not contain 0",
            ));
        }

        if !self
            .stages
            .progressive_rps_levels
            .windows(2)
            .all(|pair| pair[0] < pair[1])
        {
            return Err(LoadError::configuration(
                "stages.progressive_rps_levels must be strictly ascending",
            ));
        }

        if self.stages.progressive_duration_secs == 0 || self.stages.sustained_duration_secs == 0 {
            return Err(LoadError::configuration("stage durations must be > 0"));
        }

        if !(self.stages.sustained_fraction > 0.0 && self.stages.sustained_fraction <= 1.0) {
            return Err(LoadError::configuration(
                "stages.sustained_fraction must be in (0, 1]",
            ));
        }

        if self.stages.call_timeout_ms == 0 {
            return Err(LoadError::configuration("stages.call_timeout_ms must be > 0"));
        }

        if self.stages.rpc_method.trim().is_empty() {
            return Err(LoadError::configuration("stages.rpc_method must not be empty"));
        }

        if self.probe.initial_concurrency == 0
            || self.probe.max_concurrency < self.probe.initial_concurrency
        {
            return Err(LoadError::configuration(
                "probe.max_concurrency must be >= probe.initial_concurrency > 0",
            ));
        }

        if self.sampler.interval_ms == 0 {
            return Err(LoadError::configuration("sampler.interval_ms must be > 0"));
        }

        Ok(())
    }
}

/// Pass/fail thresholds shared by the coordinator, prober and analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Thresholds {
    /// Instantaneous CPU utilization that flags a CPU bottleneck.
    pub cpu_percent: f64,

    /// Memory utilization that flags a memory bottleneck.
    pub memory_percent: f64,

    /// Combined read+write IOPS that flags a disk bottleneck.
    pub disk_iops: f64,

    /// A concurrency burst passes only above this success rate.
    pub min_success_rate_percent: f64,

    /// Progressive load stops escalating above this error rate.
    pub max_error_rate_percent: f64,

    /// Seconds a worker may overrun the nominal duration.
    pub grace_period_secs: u64,

    /// A CPU sample above `factor * window average` counts as a spike.
    pub cpu_spike_factor: f64,

    /// Spikes must exceed this share of samples to be reported.
    pub cpu_spike_share_percent: f64,

    /// Trailing-vs-leading memory average growth that flags a leak.
    pub memory_growth_percent: f64,

    /// Window size for the leading/trailing memory averages.
    pub memory_trend_window: usize,

    /// p99/p50 latency ratio that flags tail latency.
    pub tail_latency_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 80.0,
            disk_iops: 1000.0,
            min_success_rate_percent: 90.0,
            max_error_rate_percent: 10.0,
            grace_period_secs: 5,
            cpu_spike_factor: 1.5,
            cpu_spike_share_percent: 10.0,
            memory_growth_percent: 10.0,
            memory_trend_window: 10,
            tail_latency_ratio: 10.0,
        }
    }
}

impl Thresholds {
    /// Grace period as a `Duration`.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    fn validate(&self) -> LoadResult<()> {
        let percents = [
            ("thresholds.cpu_percent", self.cpu_percent),
            ("thresholds.memory_percent", self.memory_percent),
            ("thresholds.min_success_rate_percent", self.min_success_rate_percent),
            ("thresholds.max_error_rate_percent", self.max_error_rate_percent),
            ("thresholds.cpu_spike_share_percent", self.cpu_spike_share_percent),
        ];
        for (key, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(LoadError::configuration(format!("{key} must be within 0-100")));
            }
        }

        if self.cpu_spike_factor <= 1.0 {
            return Err(LoadError::configuration(
                "thresholds.cpu_spike_factor must be > 1.0",
            ));
        }

        if self.memory_trend_window == 0 {
            return Err(LoadError::configuration(
                "thresholds.memory_trend_window must be > 0",
            ));
        }

        if self.disk_iops <= 0.0 || self.tail_latency_ratio <= 1.0 {
            return Err(LoadError::configuration(
                "thresholds.disk_iops must be > 0 and thresholds.tail_latency_ratio > 1.0",
            ));
        }

        Ok(())
    }
}

/// Parameters for the session stages.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StageConfig {
    /// JSON-RPC method issued by every call.
    pub rpc_method: String,

    /// Sequential calls made to measure unloaded latency.
    pub baseline_calls: u32,

    /// Ascending request rates tried by the progressive stage.
    pub progressive_rps_levels: Vec<u32>,

    /// Duration of each progressive level.
    pub progressive_duration_secs: u64,

    /// Share of discovered capacity used for the sustained stage.
    pub sustained_fraction: f64,

    /// Duration of the sustained stage.
    pub sustained_duration_secs: u64,

    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            rpc_method: "getHealth".to_string(),
            baseline_calls: 20,
            progressive_rps_levels: vec![10, 50, 100, 250, 500, 1000],
            progressive_duration_secs: 10,
            sustained_fraction: 0.7,
            sustained_duration_secs: 60,
            call_timeout_ms: 5000,
        }
    }
}

impl StageConfig {
    /// Per-call timeout as a `Duration`.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Parameters for the maximum-concurrency search.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub initial_concurrency: u32,
    pub max_concurrency: u32,
    pub max_doublings: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 50,
            max_concurrency: 5000,
            max_doublings: 10,
        }
    }
}

/// Resource sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SamplerConfig {
    /// Milliseconds between snapshots.
    pub interval_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.cpu_percent, 80.0);
        assert_eq!(config.thresholds.grace_period(), Duration::from_secs(5));
        assert_eq!(config.stages.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.sampler.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_unordered_levels() {
        let mut config = EngineConfig::default();
        config.stages.progressive_rps_levels = vec![100, 50];
        assert!(matches!(
            config.validate(),
            Err(LoadError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_thresholds() {
        let mut config = EngineConfig::default();
        config.thresholds.cpu_percent = 120.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.thresholds.cpu_spike_factor = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_probe_bounds() {
        let mut config = EngineConfig::default();
        config.probe.max_concurrency = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("rpcload-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[thresholds]\ncpu_percent = 70.0\n\n[stages]\nprogressive_rps_levels = [5, 15]\n",
        )
        .unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.thresholds.cpu_percent, 70.0);
        assert_eq!(config.thresholds.memory_percent, 80.0);
        assert_eq!(config.stages.progressive_rps_levels, vec![5, 15]);
        assert_eq!(config.stages.baseline_calls, 20);
    }
}
