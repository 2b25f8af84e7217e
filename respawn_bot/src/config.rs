//! JSON configuration file. Every field is optional.

use std::{collections::HashSet, fs, path::{Path, PathBuf}, time::Duration};

use serde::Deserialize;

use crate::{
    commands::CommandParser,
    engine::{
        schedule::{default_warnings, MAX_COOLDOWN_HOURS},
        EngineSettings, StalePolicy, WarningThreshold, DEFAULT_COOLDOWN_HOURS,
    },
    error::ConfigError,
    render::Render,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub prefix: String,
    pub default_cooldown_hours: f64,
    pub warnings: Vec<WarningThreshold>,
    pub stale_policy: StalePolicy,
    /// `0` turns periodic status posts off.
    pub status_interval_minutes: u64,
    /// Prepended to warning and spawn alerts; `null` or `""` for none.
    pub mention: Option<String>,
    pub kill_emoji: String,
    pub reset_emoji: String,
    pub data_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            default_cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            warnings: default_warnings(),
            stale_policy: StalePolicy::Announce,
            status_interval_minutes: 60,
            mention: Some("@everyone".to_string()),
            kill_emoji: "💀".to_string(),
            reset_emoji: "🔄".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl BotConfig {
    /// Read, parse and validate `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: BotConfig =
            serde_json::from_str(data).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("'prefix' cannot be empty.".into()));
        }
        let hours = self.default_cooldown_hours;
        if !hours.is_finite() || hours <= 0.0 || hours > MAX_COOLDOWN_HOURS {
            return Err(ConfigError::Invalid(format!(
                "'default_cooldown_hours' must be between 0 and {MAX_COOLDOWN_HOURS}, got {hours}."
            )));
        }

        let mut seen = HashSet::new();
        for warning in &self.warnings {
            if warning.minutes == 0 {
                return Err(ConfigError::Invalid(
                    "warning 'minutes' must be greater than zero.".into(),
                ));
            }
            if !seen.insert(warning.minutes) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate warning at {} minutes.",
                    warning.minutes
                )));
            }
        }

        if self.kill_emoji.trim().is_empty() || self.reset_emoji.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "'kill_emoji' and 'reset_emoji' cannot be empty.".into(),
            ));
        }
        if self.kill_emoji == self.reset_emoji {
            return Err(ConfigError::Invalid(
                "'kill_emoji' and 'reset_emoji' must differ.".into(),
            ));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            warnings: self.warnings.clone(),
            default_cooldown_hours: self.default_cooldown_hours,
            stale_policy: self.stale_policy,
        }
    }

    pub fn render(&self) -> Render {
        Render {
            prefix: self.prefix.clone(),
            mention: self.mention.clone().filter(|m| !m.trim().is_empty()),
            kill_emoji: self.kill_emoji.clone(),
            reset_emoji: self.reset_emoji.clone(),
        }
    }

    pub fn parser(&self) -> Result<CommandParser, ConfigError> {
        CommandParser::new(self.prefix.clone())
            .map_err(|e| ConfigError::Invalid(format!("command patterns: {e}")))
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_minutes > 0)
            .then(|| Duration::from_secs(self.status_interval_minutes * 60))
    }
}
