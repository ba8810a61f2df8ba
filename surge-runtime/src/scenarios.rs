//! Preset workloads

use crate::batch::{BatchConfig, ResourceIdentity, DEFAULT_LATENCY};
use std::fmt;
use std::str::FromStr;

/// Canned batch shapes for demonstrating the effect of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Five tasks all requesting resource 1
    SameResource,
    /// Ten tasks cycling over resources 1 to 3
    RoundRobin,
}

impl Scenario {
    pub fn task_count(self) -> i64 {
        match self {
            Scenario::SameResource => 5,
            Scenario::RoundRobin => 10,
        }
    }

    pub fn identity(self) -> ResourceIdentity {
        match self {
            Scenario::SameResource => ResourceIdentity::Fixed(1),
            Scenario::RoundRobin => ResourceIdentity::RoundRobin { ids: 3 },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Scenario::SameResource => "same resource requested by every task",
            Scenario::RoundRobin => "requests cycling over three resources",
        }
    }

    /// Batch configuration for this scenario with `permits` permits
    pub fn config(self, permits: i64) -> BatchConfig {
        BatchConfig::new(self.task_count(), permits)
            .with_latency(DEFAULT_LATENCY)
            .with_identity(self.identity())
            .with_label(self.label())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::SameResource => f.write_str("same-resource"),
            Scenario::RoundRobin => f.write_str("round-robin"),
        }
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same-resource" => Ok(Scenario::SameResource),
            "round-robin" => Ok(Scenario::RoundRobin),
            other => Err(format!(
                "unknown scenario '{}' (expected same-resource or round-robin)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_resource() {
        let config = Scenario::SameResource.config(0);
        assert_eq!(config.task_count, 5);
        assert!(!config.is_bounded());
        assert!((0..5).all(|i| config.identity.resource_for(i) == 1));
        assert_eq!(config.latency, DEFAULT_LATENCY);
    }

    #[test]
    fn test_round_robin() {
        let config = Scenario::RoundRobin.config(3);
        assert_eq!(config.task_count, 10);
        assert_eq!(config.permits, 3);

        let ids: Vec<u64> = (0..10).map(|i| config.identity.resource_for(i)).collect();
        assert_eq!(ids, vec![2, 3, 1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("round-robin".parse::<Scenario>(), Ok(Scenario::RoundRobin));
        assert_eq!(
            Scenario::SameResource.to_string().parse::<Scenario>(),
            Ok(Scenario::SameResource)
        );
        assert!("bogus".parse::<Scenario>().is_err());
    }
}
