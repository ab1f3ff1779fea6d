//! Worker configuration
//!
//! Settings are read from `WORKER_*` environment variables, e.g.
//! `WORKER_DATABASE_URL` or `WORKER_WHATSAPP_API_URL`. Every field has a
//! default except the WhatsApp gateway, which must be configured before the
//! worker will start.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use core_kernel::{TemporalError, Timezone};
use domain_billing::SchedulerConfig;
use infra_db::DatabaseConfig;

use crate::whatsapp::WhatsAppConfig;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Timezone(#[from] TemporalError),

    #[error("Invalid setting {key}: {message}")]
    Invalid {
        key: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub database_connect_timeout_secs: u64,
    /// IANA name of the business timezone
    pub timezone: String,
    pub reminder_interval_secs: u64,
    /// First local hour in which reminders may be sent
    pub business_hours_start: u32,
    /// Local hour at which sending stops
    pub business_hours_end: u32,
    /// Ignore the business-hours window
    pub send_around_the_clock: bool,
    pub status_interval_secs: u64,
    /// Upper bound on a single gateway call
    pub notifier_timeout_secs: u64,
    pub whatsapp_api_url: String,
    pub whatsapp_api_token: String,
    pub whatsapp_sender: String,
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/crm".to_string(),
            database_max_connections: 10,
            database_min_connections: 1,
            database_connect_timeout_secs: 30,
            timezone: "UTC".to_string(),
            reminder_interval_secs: 60 * 60,
            business_hours_start: 9,
            business_hours_end: 18,
            send_around_the_clock: false,
            status_interval_secs: 6 * 60 * 60,
            notifier_timeout_secs: 5,
            whatsapp_api_url: String::new(),
            whatsapp_api_token: String::new(),
            whatsapp_sender: String::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from `WORKER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::with_prefix("WORKER"))
    }

    /// Loads configuration from an explicit environment source
    pub fn from_source(source: config::Environment) -> Result<Self, ConfigError> {
        let config: WorkerConfig = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_min_connections > self.database_max_connections {
            return Err(ConfigError::invalid(
                "database_min_connections",
                "must not exceed database_max_connections",
            ));
        }
        if self.reminder_interval_secs == 0 {
            return Err(ConfigError::invalid("reminder_interval_secs", "must be positive"));
        }
        if self.status_interval_secs == 0 {
            return Err(ConfigError::invalid("status_interval_secs", "must be positive"));
        }
        if self.notifier_timeout_secs == 0 {
            return Err(ConfigError::invalid("notifier_timeout_secs", "must be positive"));
        }
        if self.business_hours_start > 23 || self.business_hours_end > 24 {
            return Err(ConfigError::invalid("business_hours", "hours must be within 0-24"));
        }
        if !self.send_around_the_clock && self.business_hours_start == self.business_hours_end {
            return Err(ConfigError::invalid("business_hours", "window is empty"));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Timezone, ConfigError> {
        Ok(self.timezone.parse::<Timezone>()?)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.database_max_connections)
            .min_connections(self.database_min_connections)
            .connect_timeout(Duration::from_secs(self.database_connect_timeout_secs))
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let business_hours = if self.send_around_the_clock {
            None
        } else {
            Some((self.business_hours_start, self.business_hours_end))
        };
        Ok(SchedulerConfig {
            reminder_interval: Duration::from_secs(self.reminder_interval_secs),
            business_hours,
            status_interval: Duration::from_secs(self.status_interval_secs),
            timezone: self.timezone()?,
        })
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs)
    }

    pub fn whatsapp_config(&self) -> Result<WhatsAppConfig, ConfigError> {
        if self.whatsapp_api_url.trim().is_empty() {
            return Err(ConfigError::invalid("whatsapp_api_url", "is required"));
        }
        Ok(WhatsAppConfig {
            api_url: self.whatsapp_api_url.trim().to_string(),
            api_token: self.whatsapp_api_token.clone(),
            sender: self.whatsapp_sender.clone(),
            timeout: self.notifier_timeout(),
        })
    }
}
