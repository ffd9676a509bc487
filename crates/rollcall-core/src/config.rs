//! Rollcall configuration system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RollcallError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    #[serde(default = "default_school_name")]
    pub school_name: String,
    /// SQLite database path; defaults to ~/.rollcall/rollcall.db.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sms: SmsConfig,
}

fn default_school_name() -> String {
    "Attendance Office".into()
}

impl Default for RollcallConfig {
    fn default() -> Self {
        Self {
            school_name: default_school_name(),
            database_path: None,
            scheduler: SchedulerConfig::default(),
            dispatch: DispatchConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

impl RollcallConfig {
    /// Load config from the default path (~/.rollcall/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RollcallError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RollcallError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RollcallError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rollcall")
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| Self::home_dir().join("rollcall.db"))
    }
}

/// Scheduler driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-entry checks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: default_tick_secs() }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bounded worker pool size for recipient fan-out.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-provider-call timeout.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Optional overall batch deadline; in-flight sends finish, no new
    /// sends start once it expires.
    #[serde(default)]
    pub batch_deadline_secs: Option<u64>,
}

fn default_workers() -> usize {
    8
}
fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            send_timeout_secs: default_send_timeout_secs(),
            batch_deadline_secs: None,
        }
    }
}

/// SMTP settings for the email provider. Empty host means the channel is
/// not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            from_name: None,
        }
    }
}

/// Twilio-compatible REST settings for the SMS provider. Empty account SID
/// means the channel is not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
    #[serde(default = "default_sms_api_base")]
    pub api_base: String,
}

fn default_sms_api_base() -> String {
    "https://api.twilio.com".into()
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_sms_api_base(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RollcallConfig::default();
        assert_eq!(cfg.scheduler.tick_secs, 60);
        assert_eq!(cfg.dispatch.workers, 8);
        assert_eq!(cfg.email.smtp_port, 587);
        assert!(cfg.dispatch.batch_deadline_secs.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: RollcallConfig = toml::from_str(
            r#"
            school_name = "Hillside Primary"

            [email]
            smtp_host = "smtp.example.com"
            from_address = "office@hillside.example"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.school_name, "Hillside Primary");
        assert_eq!(cfg.email.smtp_host, "smtp.example.com");
        assert_eq!(cfg.email.smtp_port, 587);
        assert_eq!(cfg.sms.api_base, "https://api.twilio.com");
    }
}
