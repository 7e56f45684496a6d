//! Node configuration for the `shardlease-demo` binary.
//!
//! Configuration is loaded in layers with the following precedence (lowest to highest):
//! 1. Environment variables (SHARDLEASE_*)
//! 2. TOML configuration file
//! 3. Command-line arguments
//!
//! This means CLI args override TOML config, which overrides environment variables.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use shardlease_election::ElectionConfig;
use shardlease_election::GroupConfig;
use shardlease_election::constants::DEFAULT_LEASE_DURATION_MS;
use shardlease_election::constants::DEFAULT_MAX_LEASES_PER_GROUP;
use shardlease_election::constants::DEFAULT_RENEW_DEADLINE_MS;
use shardlease_election::constants::DEFAULT_RETRY_PERIOD_MS;
use shardlease_election::constants::DEFAULT_SHUTDOWN_GRACE_MS;
use shardlease_election::validate_name;
use snafu::ResultExt;
use snafu::Snafu;

/// Maximum simulated contenders in one demo run.
pub const MAX_CONTENDERS: usize = 64;

/// Settings for one node (or, in the demo, a set of simulated contenders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Holder identity. The demo appends `-{index}` per contender.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Lease ids to contend for.
    #[serde(default = "default_leases")]
    pub leases: Vec<String>,

    /// Election timings shared by every lease.
    #[serde(default)]
    pub election: ElectionConfig,

    /// How long shutdown waits for releases before aborting electors.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Cap on electors per group.
    #[serde(default = "default_max_leases")]
    pub max_leases: usize,

    /// Number of simulated processes in the demo.
    #[serde(default = "default_contenders")]
    pub contenders: usize,

    /// Demo run time.
    #[serde(default = "default_run_for_ms")]
    pub run_for_ms: u64,

    /// If set, the first contender loses its store connection after this long.
    #[serde(default)]
    pub crash_after_ms: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            leases: default_leases(),
            election: ElectionConfig::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_leases: default_max_leases(),
            contenders: default_contenders(),
            run_for_ms: default_run_for_ms(),
            crash_after_ms: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        toml::from_str(&content).context(ParseTomlSnafu { path })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables follow the pattern SHARDLEASE_<FIELD_NAME>. Election timings
    /// drop the `election.` prefix (SHARDLEASE_LEASE_DURATION_MS). Lists are
    /// comma-separated.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());
        let list = |key: &str| {
            lookup(key)
                .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let leases = list("SHARDLEASE_LEASES");
        Self {
            identity: lookup("SHARDLEASE_IDENTITY").unwrap_or_else(default_identity),
            leases: if leases.is_empty() { default_leases() } else { leases },
            election: ElectionConfig {
                lease_duration_ms: parse("SHARDLEASE_LEASE_DURATION_MS").unwrap_or(DEFAULT_LEASE_DURATION_MS),
                renew_deadline_ms: parse("SHARDLEASE_RENEW_DEADLINE_MS").unwrap_or(DEFAULT_RENEW_DEADLINE_MS),
                retry_period_ms: parse("SHARDLEASE_RETRY_PERIOD_MS").unwrap_or(DEFAULT_RETRY_PERIOD_MS),
                max_backoff_ms: parse("SHARDLEASE_MAX_BACKOFF_MS"),
            },
            shutdown_grace_ms: parse("SHARDLEASE_SHUTDOWN_GRACE_MS").unwrap_or_else(default_shutdown_grace_ms),
            max_leases: parse("SHARDLEASE_MAX_LEASES").map(|n| n as usize).unwrap_or_else(default_max_leases),
            contenders: parse("SHARDLEASE_CONTENDERS").map(|n| n as usize).unwrap_or_else(default_contenders),
            run_for_ms: parse("SHARDLEASE_RUN_FOR_MS").unwrap_or_else(default_run_for_ms),
            crash_after_ms: parse("SHARDLEASE_CRASH_AFTER_MS"),
        }
    }

    /// Merge configuration from another source.
    ///
    /// Fields in `other` that are `Some` or non-default override fields in `self`.
    pub fn merge(&mut self, other: Self) {
        if other.identity != default_identity() {
            self.identity = other.identity;
        }
        if other.leases != default_leases() {
            self.leases = other.leases;
        }
        if other.election.lease_duration_ms != DEFAULT_LEASE_DURATION_MS {
            self.election.lease_duration_ms = other.election.lease_duration_ms;
        }
        if other.election.renew_deadline_ms != DEFAULT_RENEW_DEADLINE_MS {
            self.election.renew_deadline_ms = other.election.renew_deadline_ms;
        }
        if other.election.retry_period_ms != DEFAULT_RETRY_PERIOD_MS {
            self.election.retry_period_ms = other.election.retry_period_ms;
        }
        if other.election.max_backoff_ms.is_some() {
            self.election.max_backoff_ms = other.election.max_backoff_ms;
        }
        if other.shutdown_grace_ms != default_shutdown_grace_ms() {
            self.shutdown_grace_ms = other.shutdown_grace_ms;
        }
        if other.max_leases != default_max_leases() {
            self.max_leases = other.max_leases;
        }
        if other.contenders != default_contenders() {
            self.contenders = other.contenders;
        }
        if other.run_for_ms != default_run_for_ms() {
            self.run_for_ms = other.run_for_ms;
        }
        if other.crash_after_ms.is_some() {
            self.crash_after_ms = other.crash_after_ms;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.group_config().validate().map_err(|e| ConfigError::Validation { message: e.to_string() })?;
        validate_name("identity", &self.identity).map_err(|e| ConfigError::Validation { message: e.to_string() })?;

        if self.leases.is_empty() {
            return Err(ConfigError::Validation {
                message: "at least one lease id is required".into(),
            });
        }
        if self.leases.len() > self.max_leases {
            return Err(ConfigError::Validation {
                message: format!("{} leases exceed max_leases ({})", self.leases.len(), self.max_leases),
            });
        }
        let mut seen = BTreeSet::new();
        for lease in &self.leases {
            validate_name("lease id", lease).map_err(|e| ConfigError::Validation { message: e.to_string() })?;
            if !seen.insert(lease.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("lease id '{lease}' is listed twice"),
                });
            }
        }

        if self.contenders == 0 || self.contenders > MAX_CONTENDERS {
            return Err(ConfigError::Validation {
                message: format!("contenders must be between 1 and {MAX_CONTENDERS}, got {}", self.contenders),
            });
        }
        if self.run_for_ms == 0 {
            return Err(ConfigError::Validation {
                message: "run_for_ms must be non-zero".into(),
            });
        }

        Ok(())
    }

    /// Group settings derived from this configuration.
    pub fn group_config(&self) -> GroupConfig {
        GroupConfig {
            election: self.election.clone(),
            shutdown_grace_ms: self.shutdown_grace_ms,
            max_leases: self.max_leases,
        }
    }

    /// Identity of the demo contender at `index`.
    pub fn contender_identity(&self, index: usize) -> String {
        format!("{}-{index}", self.identity)
    }
}

// Default value functions
fn default_identity() -> String {
    "shardlease".into()
}

fn default_leases() -> Vec<String> {
    vec!["partition-0".into(), "partition-1".into(), "partition-2".into()]
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

fn default_max_leases() -> usize {
    DEFAULT_MAX_LEASES_PER_GROUP
}

fn default_contenders() -> usize {
    3
}

fn default_run_for_ms() -> u64 {
    60_000
}

/// Configuration loading and parsing errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config file {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("configuration validation failed: {message}"))]
    Validation { message: String },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.contender_identity(2), "shardlease-2");
        assert_eq!(config.group_config().election, ElectionConfig::default());
    }

    #[test]
    fn test_from_lookup() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("SHARDLEASE_IDENTITY", "worker"),
            ("SHARDLEASE_LEASES", "a, b,,c"),
            ("SHARDLEASE_LEASE_DURATION_MS", "3000"),
            ("SHARDLEASE_RENEW_DEADLINE_MS", "2000"),
            ("SHARDLEASE_CRASH_AFTER_MS", "500"),
            ("SHARDLEASE_CONTENDERS", "not a number"),
        ]));
        assert_eq!(config.identity, "worker");
        assert_eq!(config.leases, vec!["a", "b", "c"]);
        assert_eq!(config.election.lease_duration_ms, 3000);
        assert_eq!(config.election.renew_deadline_ms, 2000);
        assert_eq!(config.election.retry_period_ms, DEFAULT_RETRY_PERIOD_MS);
        assert_eq!(config.crash_after_ms, Some(500));
        assert_eq!(config.contenders, default_contenders());
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(NodeConfig::from_lookup(|_| None), NodeConfig::default());
    }

    #[test]
    fn test_merge() {
        let mut base = NodeConfig::from_lookup(lookup(&[
            ("SHARDLEASE_IDENTITY", "from-env"),
            ("SHARDLEASE_RETRY_PERIOD_MS", "500"),
        ]));
        let toml_layer: NodeConfig = toml::from_str(
            r#"
            identity = "from-toml"
            contenders = 5

            [election]
            lease_duration_ms = 4000
            renew_deadline_ms = 3000
            "#,
        )
        .unwrap();

        base.merge(toml_layer);
        assert_eq!(base.identity, "from-toml");
        assert_eq!(base.contenders, 5);
        assert_eq!(base.election.lease_duration_ms, 4000);
        assert_eq!(base.election.renew_deadline_ms, 3000);
        // Defaults in the higher layer do not clobber the lower one.
        assert_eq!(base.election.retry_period_ms, 500);
        assert_eq!(base.leases, default_leases());
    }

    #[test]
    fn test_validation_rejects_unsafe_timings() {
        let config = NodeConfig {
            election: ElectionConfig::new(1000, 1000, 200),
            ..NodeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("renew_deadline_ms (1000) must be less than lease_duration_ms (1000)"));
    }

    #[test]
    fn test_validation_rejects_bad_leases() {
        let duplicate = NodeConfig {
            leases: vec!["a".into(), "a".into()],
            ..NodeConfig::default()
        };
        assert!(duplicate.validate().unwrap_err().to_string().contains("listed twice"));

        let empty_id = NodeConfig {
            leases: vec!["".into()],
            ..NodeConfig::default()
        };
        assert!(empty_id.validate().is_err());

        let over_cap = NodeConfig {
            leases: vec!["a".into(), "b".into()],
            max_leases: 1,
            ..NodeConfig::default()
        };
        assert!(over_cap.validate().is_err());
    }

    #[test]
    fn test_validation_contenders() {
        for contenders in [0, MAX_CONTENDERS + 1] {
            let config = NodeConfig {
                contenders,
                ..NodeConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }
}
