//! Configuration for the Hexis effect engine.
//!
//! Maps directly to the `[engine]` tables of `hexis.toml`. Every field has
//! a serde default so a partial file (or an empty one) is always valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::Heartbeat;

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Scheduler and command-cascade limits.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Heartbeat periods.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Named numeric tunables read by effects (durations, thresholds).
    #[serde(default)]
    pub tunables: BTreeMap<String, f64>,
}

impl EngineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `HexisError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::HexisError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Read a numeric tunable, falling back to `default` when unset.
    #[must_use]
    pub fn tunable(&self, key: &str, default: f64) -> f64 {
        self.tunables.get(key).copied().unwrap_or(default)
    }

    /// Read a tunable expressed in seconds as a [`Duration`].
    ///
    /// Negative and NaN values collapse to zero; values too large for a
    /// `Duration` (including infinity) saturate at [`Duration::MAX`].
    #[must_use]
    pub fn tunable_secs(&self, key: &str, default_secs: f64) -> Duration {
        self.tunable_secs_scaled(key, default_secs, 1.0)
    }

    /// Like [`Self::tunable_secs`], with the tunable multiplied by `factor`
    /// first (minutes, per-point rates).
    #[must_use]
    pub fn tunable_secs_scaled(&self, key: &str, default: f64, factor: f64) -> Duration {
        let secs = self.tunable(key, default) * factor;
        if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Scheduler limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum hook-issued commands applied in one flush before the rest
    /// are dropped as a runaway cascade.
    #[serde(default = "default_max_commands")]
    pub max_commands_per_flush: usize,
    /// Stale heap entries tolerated (beyond live ones) before compaction.
    #[serde(default = "default_compaction_slack")]
    pub compaction_slack: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_commands_per_flush: default_max_commands(),
            compaction_slack: default_compaction_slack(),
        }
    }
}

/// Heartbeat periods in milliseconds of world time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Period of [`Heartbeat::TenSeconds`].
    #[serde(default = "default_ten_seconds")]
    pub ten_seconds_ms: u64,
    /// Period of [`Heartbeat::Minute`].
    #[serde(default = "default_minute")]
    pub minute_ms: u64,
    /// Period of [`Heartbeat::Hour`].
    #[serde(default = "default_hour")]
    pub hour_ms: u64,
    /// Most beats of one kind delivered by a single pulse. A stalled tick
    /// catches up at most this far; older boundaries are dropped.
    #[serde(default = "default_max_catch_up")]
    pub max_catch_up: u32,
}

impl HeartbeatConfig {
    /// Period of the given heartbeat.
    #[must_use]
    pub const fn period_ms(&self, beat: Heartbeat) -> u64 {
        match beat {
            Heartbeat::TenSeconds => self.ten_seconds_ms,
            Heartbeat::Minute => self.minute_ms,
            Heartbeat::Hour => self.hour_ms,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ten_seconds_ms: default_ten_seconds(),
            minute_ms: default_minute(),
            hour_ms: default_hour(),
            max_catch_up: default_max_catch_up(),
        }
    }
}

/// Persistence settings for the effect store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable `SQLite` write-ahead logging.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store a CRC-32 of every record and verify it on load.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Number of rotating backups to keep.
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
            backup_count: default_backup_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_commands() -> usize {
    10_000
}
fn default_compaction_slack() -> usize {
    1024
}
fn default_ten_seconds() -> u64 {
    10_000
}
fn default_minute() -> u64 {
    60_000
}
fn default_hour() -> u64 {
    3_600_000
}
fn default_max_catch_up() -> u32 {
    60
}
fn default_backup_count() -> usize {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.heartbeat.period_ms(Heartbeat::Minute), 60_000);
        assert_eq!(config.scheduler.max_commands_per_flush, 10_000);
        assert!(config.persistence.wal_mode);
        assert!(config.tunables.is_empty());
    }

    #[test]
    fn config_from_empty_toml() {
        let config = EngineConfig::from_toml("").expect("empty TOML should parse with defaults");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, LogFormat::Pretty);
    }

    #[test]
    fn config_from_partial_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[heartbeat]
ten_seconds_ms = 5000

[tunables]
bleeding_tick_seconds = 4.5
"#;
        let config = EngineConfig::from_toml(toml).expect("partial TOML should parse");
        assert_eq!(config.general.log_format, LogFormat::Json);
        assert_eq!(config.heartbeat.ten_seconds_ms, 5000);
        assert_eq!(config.heartbeat.minute_ms, 60_000);
        assert_eq!(
            config.tunable_secs("bleeding_tick_seconds", 10.0),
            Duration::from_millis(4500)
        );
        assert!((config.tunable("missing", 2.5) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_tunable_duration_is_zero() {
        let mut config = EngineConfig::default();
        config.tunables.insert("oops".to_string(), -3.0);
        assert_eq!(config.tunable_secs("oops", 1.0), Duration::ZERO);
    }

    #[test]
    fn oversized_tunable_duration_saturates() {
        let toml = r#"
[tunables]
forever = inf
huge = 1e300
undefined = nan
"#;
        let config = EngineConfig::from_toml(toml).expect("special floats are valid TOML");
        assert_eq!(config.tunable_secs("forever", 1.0), Duration::MAX);
        assert_eq!(config.tunable_secs("huge", 1.0), Duration::MAX);
        assert_eq!(config.tunable_secs("undefined", 1.0), Duration::ZERO);
        assert_eq!(config.tunable_secs_scaled("huge", 1.0, 60.0), Duration::MAX);
        assert_eq!(config.tunable_secs_scaled("missing", 2.0, 60.0), Duration::from_secs(120));
    }

    #[test]
    fn catch_up_cap_defaults_and_parses() {
        assert_eq!(EngineConfig::default().heartbeat.max_catch_up, 60);
        let config = EngineConfig::from_toml("[heartbeat]\nmax_catch_up = 5").expect("parse");
        assert_eq!(config.heartbeat.max_catch_up, 5);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml("[heartbeat\nminute_ms = ").expect_err("must fail");
        assert!(matches!(err, crate::HexisError::Config(_)));
    }
}
