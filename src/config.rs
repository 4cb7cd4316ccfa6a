use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::diff::DiffPolicy;
use crate::error::Error;
use crate::telephony::DEFAULT_API_BASE_URL;

pub const APP_DIR: &str = "restock-watch";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub twilio: Option<TwilioConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    pub product_code: String,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    pub retrial_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub diff_policy: DiffPolicy,
    #[serde(default = "default_true")]
    pub countdown: bool,
}

#[derive(Debug, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: String,
    pub to_number: String,
    pub twiml_url: String,
    pub call_timeout_secs: u64,
    pub grace_period_secs: u64,
    #[serde(default = "default_true")]
    pub sms: bool,
    #[serde(default = "default_true")]
    pub voice: bool,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub password: Option<String>,
    pub recipients: Vec<String>,
}

fn default_endpoint_url() -> String {
    "https://www.apple.com/shop/retail/pickup-message".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// `$XDG_CONFIG_HOME/restock-watch/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Reads, completes from the environment and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, a required
    /// secret is missing from both file and environment, or a value is invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// # Errors
    ///
    /// Same as [`Config::load`] minus the file access.
    pub fn from_toml_str(content: &str) -> Result<Config, Error> {
        let mut config: Config = toml::from_str(content)?;

        // secrets left out of the file come from the environment
        if let Some(twilio) = config.twilio.as_mut().filter(|t| t.sms || t.voice) {
            if twilio.account_sid.is_none() {
                twilio.account_sid = Some(dotenvy::var("TWILIO_ACCOUNT_SID")?);
            }
            if twilio.auth_token.is_none() {
                twilio.auth_token = Some(dotenvy::var("TWILIO_AUTH_TOKEN")?);
            }
        }
        if let Some(email) = config.email.as_mut() {
            if email.password.is_none() {
                email.password = Some(dotenvy::var("SMTP_PASSWORD")?);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        let monitor = &self.monitor;
        if monitor.product_code.trim().is_empty() {
            return Err(Error::Config("product_code must not be empty".to_string()));
        }
        url::Url::parse(&monitor.endpoint_url)?;
        if monitor.retrial_interval_secs == 0 {
            return Err(Error::Config(
                "retrial_interval_secs must be greater than zero".to_string(),
            ));
        }
        if monitor.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if let Some(twilio) = &self.twilio {
            if twilio.voice && twilio.call_timeout_secs == 0 {
                return Err(Error::Config(
                    "call_timeout_secs must be greater than zero".to_string(),
                ));
            }
            url::Url::parse(&twilio.api_base_url)?;
        }

        if let Some(email) = &self.email {
            if email.recipients.is_empty() {
                return Err(Error::Config(
                    "email.recipients must list at least one address".to_string(),
                ));
            }
        }

        Ok(())
    }
}
