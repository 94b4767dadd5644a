//! Environment profiles
//!
//! Each deployment environment carries a fixed set of defaults. The lookup
//! is an exhaustive `match`, so adding an `Environment` variant without a
//! profile row does not compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
    Testing,
    Nonprod,
}

impl Environment {
    /// Every environment, in declaration order
    pub const ALL: [Environment; 5] = [
        Environment::Production,
        Environment::Staging,
        Environment::Development,
        Environment::Testing,
        Environment::Nonprod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Nonprod => "nonprod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Defaults for this environment
    pub fn profile(&self) -> EnvironmentProfile {
        match self {
            Environment::Production => EnvironmentProfile {
                log_retention_days: 90,
                backup_retention_days: 30,
                monitoring_interval: 60,
                enable_ha: true,
                instance_monitoring: true,
            },
            Environment::Staging => EnvironmentProfile {
                log_retention_days: 30,
                backup_retention_days: 7,
                monitoring_interval: 60,
                enable_ha: true,
                instance_monitoring: true,
            },
            Environment::Development => EnvironmentProfile {
                log_retention_days: 7,
                backup_retention_days: 1,
                monitoring_interval: 300,
                enable_ha: false,
                instance_monitoring: false,
            },
            Environment::Testing => EnvironmentProfile {
                log_retention_days: 3,
                backup_retention_days: 1,
                monitoring_interval: 300,
                enable_ha: false,
                instance_monitoring: false,
            },
            Environment::Nonprod => EnvironmentProfile {
                log_retention_days: 14,
                backup_retention_days: 3,
                monitoring_interval: 300,
                enable_ha: false,
                instance_monitoring: true,
            },
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| {
                let expected: Vec<&str> = Environment::ALL.iter().map(|e| e.as_str()).collect();
                format!(
                    "Unknown environment '{}', expected one of: {}",
                    s,
                    expected.join(", ")
                )
            })
    }
}

/// Fixed per-environment defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    pub log_retention_days: u32,
    pub backup_retention_days: u32,
    /// Detailed monitoring interval in seconds
    pub monitoring_interval: u32,
    pub enable_ha: bool,
    pub instance_monitoring: bool,
}

/// The full profile table, one row per environment
pub fn profile_table() -> Vec<(Environment, EnvironmentProfile)> {
    Environment::ALL
        .into_iter()
        .map(|env| (env, env.profile()))
        .collect()
}
