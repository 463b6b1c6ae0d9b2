//! Configuration management for daybook.
//!
//! Settings live in a TOML file, by default
//! `<config_dir>/daybook/config.toml`. A missing file means defaults.
//!
//! ```toml
//! [timeline]
//! afternoon_start_hour = 12
//! evening_start_hour = 17
//! carry_over_days = 1
//! dedupe_events = true
//!
//! [store]
//! path = "/var/lib/daybook/daybook.db"
//! enforce_unique_instances = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DaybookError, Result};
use crate::timeline::SectionBounds;

/// Longest carry-over window accepted, in days.
pub const MAX_CARRY_OVER_DAYS: u32 = 7;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaybookConfig {
    pub timeline: TimelineConfig,
    pub store: StoreConfig,
}

/// Timeline aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// First hour (0-23) of the afternoon section.
    pub afternoon_start_hour: u32,
    /// First hour (0-23) of the evening section.
    pub evening_start_hour: u32,
    /// How many days back to look for deferrals landing on the requested date.
    pub carry_over_days: u32,
    /// Drop calendar events sharing title and start time.
    pub dedupe_events: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            afternoon_start_hour: 12,
            evening_start_hour: 17,
            carry_over_days: 1,
            dedupe_events: true,
        }
    }
}

impl TimelineConfig {
    #[must_use]
    pub fn section_bounds(&self) -> SectionBounds {
        SectionBounds::new(self.afternoon_start_hour, self.evening_start_hour)
    }
}

/// Store backend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to `<data_dir>/daybook/daybook.db`.
    pub path: Option<PathBuf>,
    /// Add a unique index on (user, kind, entity, date).
    pub enforce_unique_instances: bool,
}

impl DaybookConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            DaybookError::Toml(inner) => {
                DaybookError::config_with_path(inner.to_string(), path.to_path_buf())
            }
            other => other,
        })
    }

    /// Load from the default location.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DaybookConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config_dir>/daybook/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("daybook").join("config.toml"))
    }

    /// Database file to open.
    pub fn database_path(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("daybook").join("daybook.db"))
                .unwrap_or_else(|| PathBuf::from("daybook.db"))
        })
    }

    /// Check value ranges and ordering.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeline;
        if t.afternoon_start_hour > 23 {
            return Err(DaybookError::invalid_config(
                "timeline.afternoon_start_hour",
                format!("{} is not an hour of the day", t.afternoon_start_hour),
            ));
        }
        if t.evening_start_hour > 23 {
            return Err(DaybookError::invalid_config(
                "timeline.evening_start_hour",
                format!("{} is not an hour of the day", t.evening_start_hour),
            ));
        }
        if t.evening_start_hour <= t.afternoon_start_hour {
            return Err(DaybookError::invalid_config(
                "timeline.evening_start_hour",
                format!(
                    "must be after afternoon_start_hour ({} <= {})",
                    t.evening_start_hour, t.afternoon_start_hour
                ),
            ));
        }
        if t.carry_over_days > MAX_CARRY_OVER_DAYS {
            return Err(DaybookError::invalid_config(
                "timeline.carry_over_days",
                format!("{} exceeds {}", t.carry_over_days, MAX_CARRY_OVER_DAYS),
            ));
        }
        Ok(())
    }
}
