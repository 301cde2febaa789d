//! Configuration types.
//!
//! Loaded from `~/.schedulemate/config.json`. Every field has a serde default,
//! so a missing or partial file still yields a runnable config.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// SQLite file; defaults to `~/.schedulemate/schedulemate.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub schedules: Schedules,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

fn default_session_ttl_days() -> i64 {
    crate::auth::DEFAULT_SESSION_TTL_DAYS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            email: EmailConfig::default(),
            schedules: Schedules::default(),
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    /// SendGrid API key. Without one, emails are logged instead of sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_from_address() -> String {
    "no-reply@schedulemate.app".to_string()
}

fn default_api_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from_address: default_from_address(),
            api_url: default_api_url(),
        }
    }
}

/// Cron schedules for the notification triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "ScheduleEntry::default_meeting_started")]
    pub meeting_started: ScheduleEntry,
    #[serde(default = "ScheduleEntry::default_day_before_reminder")]
    pub day_before_reminder: ScheduleEntry,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            meeting_started: ScheduleEntry::default_meeting_started(),
            day_before_reminder: ScheduleEntry::default_day_before_reminder(),
        }
    }
}

/// A single schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    /// Five-field cron expression.
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    /// Starting-now scan: every minute
    pub fn default_meeting_started() -> Self {
        Self {
            enabled: true,
            cron: "* * * * *".to_string(),
            timezone: "UTC".to_string(),
        }
    }

    /// Day-before reminder: 7 PM daily
    pub fn default_day_before_reminder() -> Self {
        Self {
            enabled: true,
            cron: "0 19 * * *".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Get the canonical config file path (~/.schedulemate/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".schedulemate").join("config.json"))
}

/// Load config from disk, falling back to defaults when the file is absent,
/// then apply environment overrides.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    let config = if path.exists() {
        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
        parse_config(&content)?
    } else {
        log::info!("No config at {}, using defaults", path.display());
        Config::default()
    };
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

pub fn parse_config(content: &str) -> Result<Config, String> {
    serde_json::from_str(content).map_err(|e| format!("Invalid config: {}", e))
}

/// `SENDGRID_API_KEY`, `EMAIL_USER` and `SCHEDULEMATE_DB` win over the file.
pub fn apply_env_overrides(mut config: Config, env: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(key) = env("SENDGRID_API_KEY").filter(|v| !v.trim().is_empty()) {
        config.email.api_key = Some(key);
    }
    if let Some(from) = env("EMAIL_USER").filter(|v| !v.trim().is_empty()) {
        config.email.from_address = from;
    }
    if let Some(db) = env("SCHEDULEMATE_DB").filter(|v| !v.trim().is_empty()) {
        config.database_path = Some(db);
    }
    config
}
