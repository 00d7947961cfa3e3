//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/oooweek/config.toml` by default. Every key is optional:
//!
//! ```toml
//! weeks = 8
//! min_duration = "24h"
//! timezone = "Europe/Paris"
//! secrets_path = "/home/me/.local/share/oooweek/secrets.json"
//! callback_timeout_secs = 300
//! request_timeout_secs = 30
//! ```
//!
//! Command-line flags (and their environment variables) take precedence over
//! the file, which takes precedence over built-in defaults.
//!
//! Secrets go to the OS keyring unless `secrets_path` names a file store.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use chrono_tz::Tz;
use oooweek_core::{parse_duration, resolve_timezone};
use oooweek_providers::google::GoogleConfig;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{ClientError, ClientResult};

/// Weeks shown after the current one when nothing else is configured.
pub const DEFAULT_WEEKS: u32 = 8;

/// Largest accepted `weeks` value, about ten years.
pub const MAX_WEEKS: u32 = 520;

/// Minimum OOO length when nothing else is configured.
pub const DEFAULT_MIN_DURATION: &str = "24h";

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the oooweek client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Weeks to show after the current one.
    pub weeks: Option<u32>,

    /// Minimum OOO length, e.g. `"48h"`.
    pub min_duration: Option<String>,

    /// IANA timezone name.
    pub timezone: Option<String>,

    /// Secret store file to use instead of the OS keyring.
    pub secrets_path: Option<PathBuf>,

    /// Seconds to wait for the browser to complete authorization.
    pub callback_timeout_secs: Option<u64>,

    /// Timeout for each HTTP request, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Loads configuration from the default path. A missing file yields the
    /// defaults.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oooweek")
    }
}

// ---------------------------------------------------------------------------
// Settings (CLI merged over config.toml)
// ---------------------------------------------------------------------------

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub group: Option<String>,
    pub weeks: u32,
    pub min_duration: Duration,
    pub timezone: Tz,
    /// File store location; `None` selects the OS keyring.
    pub secrets_path: Option<PathBuf>,
    pub callback_timeout: StdDuration,
    pub request_timeout: StdDuration,
}

impl Settings {
    /// Merges command-line values over the configuration file.
    pub fn resolve(cli: &Cli, config: &ClientConfig) -> ClientResult<Self> {
        let min_duration = match (cli.min_duration, config.min_duration.as_deref()) {
            (Some(duration), _) => duration,
            (None, Some(raw)) => parse_duration(raw)
                .map_err(|e| ClientError::Config(format!("min_duration: {}", e)))?,
            (None, None) => parse_duration(DEFAULT_MIN_DURATION)
                .map_err(|e| ClientError::Config(e.to_string()))?,
        };

        let timezone_name = cli
            .timezone
            .as_deref()
            .or(config.timezone.as_deref())
            .filter(|name| !name.trim().is_empty());
        let timezone =
            resolve_timezone(timezone_name).map_err(|e| ClientError::Config(e.to_string()))?;

        let weeks = cli.weeks.or(config.weeks).unwrap_or(DEFAULT_WEEKS);
        if weeks > MAX_WEEKS {
            return Err(ClientError::Config(format!(
                "weeks must be at most {}, got {}",
                MAX_WEEKS, weeks
            )));
        }

        let callback_timeout = config
            .callback_timeout_secs
            .unwrap_or(GoogleConfig::DEFAULT_CALLBACK_TIMEOUT_SECS);
        let request_timeout = config
            .request_timeout_secs
            .unwrap_or(GoogleConfig::DEFAULT_TIMEOUT_SECS);
        if callback_timeout == 0 || request_timeout == 0 {
            return Err(ClientError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            group: cli.group.clone(),
            weeks,
            min_duration,
            timezone,
            secrets_path: config.secrets_path.clone(),
            callback_timeout: StdDuration::from_secs(callback_timeout),
            request_timeout: StdDuration::from_secs(request_timeout),
        })
    }

    /// Provider configuration derived from these settings.
    pub fn google_config(&self) -> GoogleConfig {
        GoogleConfig::default()
            .with_timeout(self.request_timeout)
            .with_callback_timeout(self.callback_timeout)
    }
}
