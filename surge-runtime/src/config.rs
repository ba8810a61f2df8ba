//! Session configuration
//!
//! Loaded from environment variables:
//!
//! ```bash
//! # Terminal batch records kept for observation (default: 16)
//! export SURGE_RETAINED_RUNS=16
//!
//! # Buffer of each live event subscription (default: 256)
//! export SURGE_EVENT_CAPACITY=256
//! ```

use crate::{Error, Result};
use std::env;

const DEFAULT_RETAINED_RUNS: usize = 16;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration for a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How many finished batch records stay observable
    pub retained_runs: usize,
    /// How far a live event subscriber may lag before missing events
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retained_runs: DEFAULT_RETAINED_RUNS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SURGE_RETAINED_RUNS`: finished batches kept (default: 16)
    /// - `SURGE_EVENT_CAPACITY`: subscription buffer size (default: 256)
    pub fn from_env() -> Result<Self> {
        let config = Self {
            retained_runs: read_usize("SURGE_RETAINED_RUNS", DEFAULT_RETAINED_RUNS)?,
            event_capacity: read_usize("SURGE_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retained_runs == 0 {
            return Err(Error::InvalidConfiguration(
                "retained_runs must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_usize(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            Error::InvalidConfiguration(format!(
                "{} must be a non-negative integer, got '{}'",
                name, raw
            ))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.retained_runs, 16);
        assert_eq!(config.event_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero() {
        let config = SessionConfig {
            retained_runs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            event_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_usize_default_when_unset() {
        let value = read_usize("SURGE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
