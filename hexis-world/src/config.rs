//! World-level configuration for a Hexis game server.
//!
//! Wraps the engine's [`EngineConfig`] with server profiles and the driver's
//! timing knobs. Loadable from TOML; every field has a default.

use std::path::Path;
use std::time::Duration;

use hexis_core::{EngineConfig, HexisError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Server Profiles
// ---------------------------------------------------------------------------

/// Deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerProfile {
    /// A builder's local server: slow pulse, frequent saves, verbose logs.
    Development,
    /// A typical live world.
    #[default]
    Standard,
    /// Thousands of online owners: bigger cascade limits, sparse saves.
    Large,
}

impl ServerProfile {
    /// Get a human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Development => "Development: 250ms pulse, 30s autosave, debug logging",
            Self::Standard => "Standard: 100ms pulse, 5min autosave",
            Self::Large => "Large: 100ms pulse, 10min autosave, no snapshot board",
        }
    }
}

// ---------------------------------------------------------------------------
// World Configuration
// ---------------------------------------------------------------------------

/// Configuration for the world driver and the engine it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Deployment profile these values were tuned for.
    #[serde(default)]
    pub profile: ServerProfile,
    /// Real time between world pulses.
    #[serde(default = "default_pulse_interval_ms")]
    pub pulse_interval_ms: u64,
    /// Per-pulse processing budget used by the monitor.
    #[serde(default = "default_pulse_budget_ms")]
    pub pulse_budget_ms: f64,
    /// Real time between autosaves; 0 disables periodic saves.
    #[serde(default = "default_autosave_interval_seconds")]
    pub autosave_interval_seconds: u64,
    /// Whether the driver publishes owner snapshots after each pulse.
    #[serde(default = "default_true")]
    pub snapshot_enabled: bool,
}

impl WorldConfig {
    /// Create a config tuned for the given profile.
    #[must_use]
    pub fn for_profile(profile: ServerProfile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };

        match profile {
            ServerProfile::Development => {
                config.engine.general.log_level = "debug".to_string();
                config.pulse_interval_ms = 250;
                config.pulse_budget_ms = 50.0;
                config.autosave_interval_seconds = 30;
            }
            ServerProfile::Standard => {
                // Default values are tuned for Standard
            }
            ServerProfile::Large => {
                config.engine.scheduler.max_commands_per_flush = 50_000;
                config.engine.scheduler.compaction_slack = 8192;
                config.pulse_budget_ms = 40.0;
                config.autosave_interval_seconds = 600;
                config.snapshot_enabled = false;
            }
        }

        config
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `HexisError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> hexis_core::Result<Self> {
        toml::from_str(toml_str).map_err(|e| HexisError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> hexis_core::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Pulse period as a [`Duration`], never zero.
    #[must_use]
    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms.max(1))
    }

    /// Autosave period, if periodic saves are enabled.
    #[must_use]
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_interval_seconds > 0)
            .then(|| Duration::from_secs(self.autosave_interval_seconds))
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            profile: ServerProfile::Standard,
            pulse_interval_ms: default_pulse_interval_ms(),
            pulse_budget_ms: default_pulse_budget_ms(),
            autosave_interval_seconds: default_autosave_interval_seconds(),
            snapshot_enabled: true,
        }
    }
}

fn default_pulse_interval_ms() -> u64 {
    100
}

fn default_pulse_budget_ms() -> f64 {
    20.0
}

fn default_autosave_interval_seconds() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
