use std::env;
use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How event timestamps are turned into local wall-clock time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimezonePolicy {
    /// Use the offset recorded on each timestamp.
    #[default]
    EventOffset,
    /// Shift every timestamp into one organization-wide offset.
    Organization { utc_offset_minutes: i32 },
}

impl TimezonePolicy {
    pub fn fixed_offset(&self) -> Option<FixedOffset> {
        match self {
            TimezonePolicy::EventOffset => None,
            TimezonePolicy::Organization { utc_offset_minutes } => {
                FixedOffset::east_opt(utc_offset_minutes * 60)
            }
        }
    }
}

/// Tunables for the scoring curves and the working-hours calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub business_start_hour: u32,
    pub business_end_hour: u32,
    pub timezone: TimezonePolicy,
    /// After-hours percentage that saturates the factor.
    pub after_hours_saturation_pct: f64,
    /// Weekend percentage that saturates the factor.
    pub weekend_saturation_pct: f64,
    pub response_pressure_floor_minutes: f64,
    pub response_pressure_ceiling_minutes: f64,
    /// Severity-weighted points per week treated as a full incident load.
    pub incident_load_ceiling_per_week: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            business_start_hour: 9,
            business_end_hour: 18,
            timezone: TimezonePolicy::EventOffset,
            after_hours_saturation_pct: 50.0,
            weekend_saturation_pct: 40.0,
            response_pressure_floor_minutes: 5.0,
            response_pressure_ceiling_minutes: 60.0,
            incident_load_ceiling_per_week: 10.0,
        }
    }
}

impl ScoringConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: ScoringConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business_start_hour >= self.business_end_hour || self.business_end_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "business hours {}..{} must satisfy start < end <= 24",
                self.business_start_hour, self.business_end_hour
            )));
        }
        if self.timezone.fixed_offset().is_none() && self.timezone != TimezonePolicy::EventOffset
        {
            return Err(ConfigError::Invalid(
                "organization utc_offset_minutes must be within +/-24h".to_string(),
            ));
        }
        for (name, value) in [
            ("after_hours_saturation_pct", self.after_hours_saturation_pct),
            ("weekend_saturation_pct", self.weekend_saturation_pct),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within (0, 100], got {value}"
                )));
            }
        }
        if !(self.response_pressure_floor_minutes >= 0.0
            && self.response_pressure_floor_minutes < self.response_pressure_ceiling_minutes)
        {
            return Err(ConfigError::Invalid(format!(
                "response pressure floor {} must be below ceiling {}",
                self.response_pressure_floor_minutes, self.response_pressure_ceiling_minutes
            )));
        }
        if !(self.incident_load_ceiling_per_week > 0.0
            && self.incident_load_ceiling_per_week.is_finite())
        {
            return Err(ConfigError::Invalid(
                "incident_load_ceiling_per_week must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            log_level: env::var("BURNOUT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
