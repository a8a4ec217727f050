//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILIE_CONFIG` (environment variable)
//! 2. `~/.config/mailie/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailie\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{ClientConfig, TlsMode};
use crate::error::{MailieError, Result};
use crate::model::policy::Policy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Default SMTP connection.
    pub smtp: SmtpConfig,
    /// Defaults applied to composed messages.
    pub message: MessageConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the directory holding the log file.
    pub cache_dir: Option<PathBuf>,
}

/// Default SMTP connection, overridden by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// "none", "starttls" or "tls".
    pub tls: TlsMode,
    /// Socket timeout in seconds.
    pub timeout_secs: u64,
    /// Name announced in EHLO (defaults to the machine's hostname).
    pub local_hostname: Option<String>,
    /// Login user; the password is never stored here.
    pub username: Option<String>,
}

/// Message defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub policy: Policy,
    pub charset: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            tls: TlsMode::None,
            timeout_secs: 30,
            local_hostname: None,
            username: None,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            policy: Policy::Default,
            charset: crate::message::DEFAULT_CHARSET.to_string(),
        }
    }
}

impl SmtpConfig {
    /// Connection settings for a dispatch client.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(&self.host, self.port)
            .tls_mode(self.tls)
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(name) = &self.local_hostname {
            client = client.local_hostname(name);
        }
        client
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> Result<()> {
    let path = config_file_path()
        .ok_or_else(|| MailieError::Config("Could not determine config file path".into()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MailieError::io(parent, e))?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| MailieError::Config(e.to_string()))?;
    std::fs::write(&path, contents).map_err(|e| MailieError::io(&path, e))?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILIE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailie").join("config.toml"))
}

/// Return the cache directory used for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailie")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailie.log")
}
