use thiserror::Error;

/// Canonical error type for load-testing operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A single RPC call failed or timed out.
    ///
    /// Workers fold this into a failed `CallOutcome`; it never escapes a
    /// running test.
    #[error("network error: {message}")]
    Network {
        /// Human-readable description of the failure.
        message: String,
    },

    /// A whole stage produced no usable result (e.g. every worker crashed).
    #[error("execution error in {stage}: {message}")]
    Execution {
        /// Name of the stage that failed (e.g. `"load_test"`).
        stage: &'static str,
        /// Human-readable details.
        message: String,
    },

    /// The caller supplied invalid load parameters or configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable explanation of the invalid value.
        message: String,
    },

    /// Configuration sources could not be read or deserialized.
    #[error("config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl LoadError {
    /// Creates a `Network` variant.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an `Execution` variant.
    #[must_use]
    pub fn execution(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Execution {
            stage,
            message: message.into(),
        }
    }

    /// Creates a `Configuration` variant.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` when the error should abort a whole session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::ConfigSource(_))
    }
}

/// Convenient result alias for load-testing operations.
pub type LoadResult<T> = Result<T, LoadError>;
