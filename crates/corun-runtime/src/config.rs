//! Executor configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use corun_runtime::config::ExecutorConfig;
//!
//! // Defaults with env overrides
//! let config = ExecutorConfig::from_env();
//!
//! // Or customize programmatically
//! let config = ExecutorConfig::new()
//!     .queue_capacity(64)
//!     .thread_name("stream-io");
//! ```

use corun_core::constants::MAX_QUEUE_CAPACITY;
use corun_core::env::{env_get, env_get_opt};
use corun_core::RuntimeError;

/// Library defaults
pub mod defaults {
    pub const QUEUE_CAPACITY: usize = 16;
    pub const THREAD_NAME: &str = "corun-executor";
    pub const SUBMIT_SPINS: u32 = 64;
    pub const MIN_STACK_SIZE: usize = 16 * 1024;
}

/// Executor configuration with builder pattern
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Work queue capacity
    pub queue_capacity: usize,
    /// Worker thread name
    pub thread_name: String,
    /// Worker thread stack size, `None` for the platform default
    pub stack_size: Option<usize>,
    /// Busy spins on a full queue before `submit` starts yielding
    pub submit_spins: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecutorConfig {
    /// Create config from defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `CORUN_QUEUE_CAPACITY` - Work queue capacity
    /// - `CORUN_THREAD_NAME` - Worker thread name
    /// - `CORUN_STACK_SIZE` - Worker stack size in bytes
    /// - `CORUN_SUBMIT_SPINS` - Spins before a blocked submit yields
    pub fn from_env() -> Self {
        Self {
            queue_capacity: env_get("CORUN_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
            thread_name: env_get("CORUN_THREAD_NAME", defaults::THREAD_NAME.to_string()),
            stack_size: env_get_opt("CORUN_STACK_SIZE"),
            submit_spins: env_get("CORUN_SUBMIT_SPINS", defaults::SUBMIT_SPINS),
        }
    }

    /// Create config with explicit defaults (no env override)
    pub fn new() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            thread_name: defaults::THREAD_NAME.to_string(),
            stack_size: None,
            submit_spins: defaults::SUBMIT_SPINS,
        }
    }

    // Builder methods

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn submit_spins(mut self, spins: u32) -> Self {
        self.submit_spins = spins;
        self
    }

    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("queue_capacity must be > 0"));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidValue("queue_capacity must be <= 1048576"));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name must not be empty"));
        }
        if matches!(self.stack_size, Some(size) if size < defaults::MIN_STACK_SIZE) {
            return Err(ConfigError::InvalidValue("stack_size must be >= 16KB"));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for RuntimeError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => RuntimeError::InvalidConfig(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExecutorConfig::new();
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.thread_name, "corun-executor");
        assert!(config.stack_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .queue_capacity(3)
            .thread_name("io")
            .stack_size(256 * 1024)
            .submit_spins(0);

        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.thread_name, "io");
        assert_eq!(config.stack_size, Some(256 * 1024));
        assert_eq!(config.submit_spins, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(ExecutorConfig::new().queue_capacity(0).validate().is_err());
        assert!(ExecutorConfig::new().queue_capacity(MAX_QUEUE_CAPACITY + 1).validate().is_err());
        assert!(ExecutorConfig::new().thread_name("").validate().is_err());
        assert_eq!(
            ExecutorConfig::new().stack_size(1024).validate(),
            Err(ConfigError::InvalidValue("stack_size must be >= 16KB"))
        );
    }

    #[test]
    fn test_error_maps_to_runtime_error() {
        let err: RuntimeError = ConfigError::InvalidValue("queue_capacity must be > 0").into();
        assert_eq!(err.to_string(), "invalid config: queue_capacity must be > 0");
    }
}
