// src/config.rs
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: General,
    pub interfaces: Interfaces,
    pub cache: Cache,
    pub channels: Channels,
    pub snapshot: SnapshotCfg,
    #[serde(default)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    #[serde(default)]
    pub json_logs: bool,
    /// Liveness line cadence, seconds (tier 1).
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,
    /// Full-stats line cadence, seconds (tier 2).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_liveness_interval_secs() -> u64 {
    10
}
fn default_stats_interval_secs() -> u64 {
    60
}

/// Which interfaces the attachment supervisor attaches to.
/// `names` is empty and `auto` true by default: enumerate every
/// non-loopback, up interface at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Interfaces {
    #[serde(default = "default_auto")]
    pub auto: bool,
    #[serde(default)]
    pub names: Vec<String>,
}

fn default_auto() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
    /// Maximum number of device records held in memory ("LRU cache
    /// size never exceeds bound").
    pub device_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channels {
    #[serde(default = "default_new_device_capacity")]
    pub new_device_capacity: usize,
    #[serde(default = "default_new_pattern_capacity")]
    pub new_pattern_capacity: usize,
}

fn default_new_device_capacity() -> usize {
    crate::notify::NEW_DEVICE_CAPACITY
}
fn default_new_pattern_capacity() -> usize {
    crate::notify::NEW_PATTERN_CAPACITY
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            new_device_capacity: default_new_device_capacity(),
            new_pattern_capacity: default_new_pattern_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotCfg {
    /// Snapshot file path (e.g. "/var/lib/cerberus/devices.jsonl").
    pub path: String,
    /// Periodic flush cadence, seconds ("every 30 seconds" by default).
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: u64,
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub enable: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self { enable: true }
    }
}

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.device_capacity == 0 {
            anyhow::bail!("cache.device_capacity must be > 0");
        }
        if self.channels.new_device_capacity == 0 {
            anyhow::bail!("channels.new_device_capacity must be > 0");
        }
        if self.channels.new_pattern_capacity == 0 {
            anyhow::bail!("channels.new_pattern_capacity must be > 0");
        }
        if self.snapshot.path.trim().is_empty() {
            anyhow::bail!("snapshot.path must be non-empty");
        }
        if self.snapshot.interval_secs == 0 {
            anyhow::bail!("snapshot.interval_secs must be > 0");
        }
        if self.general.liveness_interval_secs == 0 {
            anyhow::bail!("general.liveness_interval_secs must be > 0");
        }
        if self.general.stats_interval_secs == 0 {
            anyhow::bail!("general.stats_interval_secs must be > 0");
        }
        if !self.interfaces.auto && self.interfaces.names.is_empty() {
            anyhow::bail!("interfaces.auto = false requires at least one name in interfaces.names");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let toml = r#"
            [general]
            [interfaces]
            [cache]
            device_capacity = 1000
            [channels]
            [snapshot]
            path = "/tmp/cerberus/devices.jsonl"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        cfg.validate().unwrap();
        assert!(cfg.interfaces.auto);
        assert_eq!(cfg.general.liveness_interval_secs, 10);
        assert_eq!(cfg.snapshot.interval_secs, 30);
    }

    #[test]
    fn zero_device_capacity_rejected() {
        let toml = r#"
            [general]
            [interfaces]
            [cache]
            device_capacity = 0
            [channels]
            [snapshot]
            path = "/tmp/x.jsonl"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_interfaces_without_names_rejected() {
        let toml = r#"
            [general]
            [interfaces]
            auto = false
            [cache]
            device_capacity = 10
            [channels]
            [snapshot]
            path = "/tmp/x.jsonl"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
