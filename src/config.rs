//! Configuration and settings management
//!
//! Loads settings from environment variables and optional config files.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of admin user IDs (detailed `/stats` access)
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    /// Bot display name
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Whether `/start` runs the progressive-reveal animation
    #[serde(default = "default_enable_animations")]
    pub enable_animations: bool,

    /// Per-user request limit within one rate window
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Rate window length, seconds
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Maximum entries in the rendered-message cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Age after which a stuck onboarding session is reclaimed, seconds
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Interval between stale-session sweeps, seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Pause between animation stages, milliseconds
    #[serde(default = "default_stage_delay_ms")]
    pub stage_delay_ms: u64,
}

fn default_bot_name() -> String {
    "Utility Bot".to_string()
}

const fn default_enable_animations() -> bool {
    true
}

const fn default_rate_limit_per_minute() -> u32 {
    30
}

const fn default_rate_window_secs() -> u64 {
    60
}

const fn default_cache_capacity() -> usize {
    128
}

const fn default_session_timeout_secs() -> u64 {
    600
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_stage_delay_ms() -> u64 {
    800
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is invalid
    /// (`cache_capacity` must be at least 1).
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Message(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the set of admin user IDs
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        self.admin_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rate window length as a [`Duration`]
    #[must_use]
    pub const fn rate_period(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Session timeout as a [`Duration`]
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Sweep interval as a [`Duration`]
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Stage delay as a [`Duration`]
    #[must_use]
    pub const fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            admin_ids_str: None,
            bot_name: default_bot_name(),
            enable_animations: true,
            rate_limit_per_minute: 30,
            rate_window_secs: 60,
            cache_capacity: 128,
            session_timeout_secs: 600,
            sweep_interval_secs: 60,
            stage_delay_ms: 800,
        }
    }

    #[test]
    fn admin_list_parsing() {
        let mut settings = base_settings();

        // Comma
        settings.admin_ids_str = Some("123,456".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&123));
        assert!(admins.contains(&456));
        assert_eq!(admins.len(), 2);

        // Space
        settings.admin_ids_str = Some("111 222".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&111));
        assert!(admins.contains(&222));
        assert_eq!(admins.len(), 2);

        // Semicolon and mixed
        settings.admin_ids_str = Some("333; 444, 555".to_string());
        let admins = settings.admin_ids();
        assert_eq!(admins.len(), 3);

        // Bad tokens are skipped
        settings.admin_ids_str = Some("abc, 777".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&777));
        assert_eq!(admins.len(), 1);
    }

    #[test]
    fn zero_cache_capacity_fails_validation() {
        let mut settings = base_settings();
        settings.cache_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn duration_accessors() {
        let settings = base_settings();
        assert_eq!(settings.rate_period(), Duration::from_secs(60));
        assert_eq!(settings.session_timeout(), Duration::from_secs(600));
        assert_eq!(settings.stage_delay(), Duration::from_millis(800));
    }
}
