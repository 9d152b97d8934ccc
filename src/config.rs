//! Configuration
//!
//! Liveness window, store connection and agent settings. Loaded from a YAML
//! file with serde defaults for everything, then overridden from the CLI.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Liveness Configuration
// =============================================================================

/// Largest TTL whose millisecond value fits in an `i64`
pub const MAX_TTL_SECS: u64 = i64::MAX as u64 / 1000;

/// Liveness window and registry key naming
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Nominal heartbeat interval in seconds; nodes expire after twice this
    pub ttl_secs: u64,
    /// Prefix of every derived registry key
    pub key_prefix: String,
    /// Suffix of every derived registry key
    pub key_suffix: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            key_prefix: "phonon_".to_string(),
            key_suffix: ".nodelist".to_string(),
        }
    }
}

impl LivenessConfig {
    /// Config with a specific TTL and default key naming
    pub fn with_ttl_secs(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            ..Default::default()
        }
    }

    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// TTL in milliseconds
    #[inline]
    pub fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// Reject TTLs that would make every heartbeat look expired or none
    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(Error::Configuration("liveness.ttl_secs must be positive".into()));
        }
        if self.ttl_secs > MAX_TTL_SECS {
            return Err(Error::Configuration(format!(
                "liveness.ttl_secs ({}) exceeds the maximum of {}",
                self.ttl_secs, MAX_TTL_SECS
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Shared store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Hosts to connect to; more than one enables key sharding
    pub hosts: Vec<String>,
    /// Port used for hosts given without one
    pub port: u16,
    /// Database index
    pub db: u8,
    /// Connect with TLS
    pub tls: bool,
    /// Name of the environment variable holding the auth token
    pub auth_token_env: String,
    /// Connections per host
    pub pool_size: usize,
    /// Give up connecting after this many seconds
    pub connect_timeout_secs: u64,
    /// Fail a command that gets no reply within this many seconds
    pub command_timeout_secs: u64,
    /// Explicit node id for this process
    pub node_id: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 6379,
            db: 0,
            tls: false,
            auth_token_env: "LIVENESS_STORE_TOKEN".to_string(),
            pool_size: 4,
            connect_timeout_secs: 30,
            command_timeout_secs: 10,
            node_id: None,
        }
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

/// Settings for the heartbeat/sweep agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between heartbeat/sweep ticks; 0 means use the TTL
    pub heartbeat_interval_secs: u64,
    /// Remove this node from every registry on shutdown
    pub deregister_on_shutdown: bool,
    /// Health server bind address
    pub health_addr: String,
    /// Metrics server bind address
    pub metrics_addr: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 0,
            deregister_on_shutdown: true,
            health_addr: "0.0.0.0:8081".to_string(),
            metrics_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AgentConfig {
    /// Effective interval between ticks
    pub fn heartbeat_interval(&self, liveness: &LivenessConfig) -> Duration {
        if self.heartbeat_interval_secs == 0 {
            liveness.ttl()
        } else {
            Duration::from_secs(self.heartbeat_interval_secs)
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub liveness: LivenessConfig,
    pub store: StoreConfig,
    pub agent: AgentConfig,
}

impl AppConfig {
    /// Parse a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity checks serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.liveness.validate()?;
        if self.liveness.key_prefix.is_empty() && self.liveness.key_suffix.is_empty() {
            return Err(Error::Configuration(
                "liveness.key_prefix and liveness.key_suffix cannot both be empty".into(),
            ));
        }
        if self.store.hosts.is_empty() {
            return Err(Error::Configuration("store.hosts must name at least one host".into()));
        }
        if self.store.pool_size == 0 {
            return Err(Error::Configuration("store.pool_size must be positive".into()));
        }
        if self.store.command_timeout_secs == 0 {
            return Err(Error::Configuration(
                "store.command_timeout_secs must be positive".into(),
            ));
        }
        if self.agent.heartbeat_interval_secs > self.liveness.ttl_secs {
            return Err(Error::Configuration(format!(
                "agent.heartbeat_interval_secs ({}) exceeds liveness.ttl_secs ({})",
                self.agent.heartbeat_interval_secs, self.liveness.ttl_secs
            )));
        }
        Ok(())
    }
}

/// Load and validate a YAML configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    AppConfig::from_yaml(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.liveness.ttl_secs, 1800);
        assert_eq!(config.liveness.ttl_ms(), 1_800_000);
        assert_eq!(config.store.hosts, vec!["localhost".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("liveness:\n  ttl_secs: 5\n").unwrap();
        assert_eq!(config.liveness.ttl_secs, 5);
        assert_eq!(config.liveness.key_prefix, "phonon_");
        assert_eq!(config.store.port, 6379);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = AppConfig::from_yaml("liveness:\n  ttl_secs: 0\n");
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let liveness = LivenessConfig::with_ttl_secs(u64::MAX);
        assert_eq!(liveness.ttl_ms(), i64::MAX);
        assert_matches!(liveness.validate(), Err(Error::Configuration(_)));

        let yaml = format!("liveness:\n  ttl_secs: {}\n", MAX_TTL_SECS + 1);
        assert_matches!(AppConfig::from_yaml(&yaml), Err(Error::Configuration(_)));

        let largest = LivenessConfig::with_ttl_secs(MAX_TTL_SECS);
        assert!(largest.validate().is_ok());
        assert!(largest.ttl_ms() > 0);
    }

    #[test]
    fn test_command_timeout() {
        assert_eq!(StoreConfig::default().command_timeout_secs, 10);
        let config = AppConfig::from_yaml("store:\n  command_timeout_secs: 3\n").unwrap();
        assert_eq!(config.store.command_timeout_secs, 3);
        assert_matches!(
            AppConfig::from_yaml("store:\n  command_timeout_secs: 0\n"),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_interval_longer_than_ttl_rejected() {
        let yaml = "liveness:\n  ttl_secs: 10\nagent:\n  heartbeat_interval_secs: 20\n";
        assert_matches!(AppConfig::from_yaml(yaml), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_heartbeat_interval_defaults_to_ttl() {
        let liveness = LivenessConfig::with_ttl_secs(12);
        let agent = AgentConfig::default();
        assert_eq!(agent.heartbeat_interval(&liveness), Duration::from_secs(12));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "store:\n  hosts: [\"cache-a\", \"cache-b\"]\n  db: 2\n  node_id: worker-7"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.store.hosts.len(), 2);
        assert_eq!(config.store.db, 2);
        assert_eq!(config.store.node_id.as_deref(), Some("worker-7"));
    }

    #[test]
    fn test_load_missing_file() {
        assert_matches!(
            load_config("/nonexistent/liveness.yaml"),
            Err(Error::Configuration(_))
        );
    }
}
