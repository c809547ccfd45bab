//! Analyzer findings and derived recommendations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource dimension a bottleneck is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Cpu,
    Memory,
    DiskIo,
    Network,
}

impl ResourceType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::DiskIo => "disk_io",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A resource dimension identified as constraining throughput.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub resource_type: ResourceType,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

impl Bottleneck {
    #[must_use]
    pub fn new(
        resource_type: ResourceType,
        severity: Severity,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            severity,
            description: description.into(),
            recommendation: recommendation.into(),
        }
    }
}

/// Optimization guidance derived once a session completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Severity,
    /// Dimension the advice targets, if it concerns a single resource.
    pub resource_type: Option<ResourceType>,
    pub message: String,
}

/// One burst attempted by the concurrency prober.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeStep {
    pub concurrency: u32,
    pub succeeded: u32,
    /// Share of successful calls (0-100).
    pub success_rate_percent: f64,
    pub passed: bool,
}

/// Result of the maximum-concurrency search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyProbeResult {
    /// Highest level that passed, or 0 if none did.
    pub max_concurrency: u32,
    pub method: String,
    pub steps: Vec<ProbeStep>,
}

impl ConcurrencyProbeResult {
    pub const METHOD: &'static str = "doubling-search";

    #[must_use]
    pub fn new(max_concurrency: u32, steps: Vec<ProbeStep>) -> Self {
        Self {
            max_concurrency,
            method: Self::METHOD.to_string(),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_serde_names() {
        let bottleneck = Bottleneck::new(ResourceType::DiskIo, Severity::Medium, "d", "r");
        let json = serde_json::to_value(&bottleneck).unwrap();
        assert_eq!(json["resource_type"], "disk_io");
        assert_eq!(json["severity"], "medium");
    }
}
