use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Refresh interval for healthy feeds; every consecutive error adds
    /// another one of these before the next attempt.
    #[serde(default = "default_base_interval")]
    pub base_interval_hours: u32,

    /// Only items published within this many days are served at random.
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,

    /// Feeds with at least this many consecutive errors are hidden from
    /// random selection.
    #[serde(default = "default_quarantine_threshold")]
    pub quarantine_threshold: u32,

    /// Drop items linking to other hosts (link blogs, syndicated posts).
    #[serde(default = "default_true")]
    pub same_domain_only: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_site_title")]
    pub site_title: String,

    #[serde(default = "default_site_url")]
    pub site_url: String,

    #[serde(default = "default_campaign_source")]
    pub campaign_source: String,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feed-roulette");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("feeds.db").to_string_lossy().to_string()
}

fn default_cache_dir() -> String {
    data_dir().join("rss").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Ten years.
const MAX_INTERVAL_HOURS: u32 = 24 * 365 * 10;
/// A century.
const MAX_LOOKBACK_DAYS: u32 = 365 * 100;

fn default_base_interval() -> u32 {
    24
}

fn default_lookback() -> u32 {
    182
}

fn default_quarantine_threshold() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_timeout() -> u64 {
    25
}

fn default_site_title() -> String {
    "feed-roulette".to_string()
}

fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_campaign_source() -> String {
    "feed-roulette".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_dir: default_cache_dir(),
            bind_addr: default_bind_addr(),
            base_interval_hours: default_base_interval(),
            lookback_days: default_lookback(),
            quarantine_threshold: default_quarantine_threshold(),
            same_domain_only: default_true(),
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
            site_title: default_site_title(),
            site_url: default_site_url(),
            campaign_source: default_campaign_source(),
        }
    }
}

impl Config {
    /// Load the config from `path`, or from the default location. A missing
    /// file is created with default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feed-roulette")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.base_interval_hours == 0 {
            return Err(AppError::Config(
                "base_interval_hours must be at least 1".to_string(),
            ));
        }
        if self.base_interval_hours > MAX_INTERVAL_HOURS {
            return Err(AppError::Config(format!(
                "base_interval_hours must be at most {MAX_INTERVAL_HOURS}"
            )));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(AppError::Config(format!(
                "lookback_days must be at most {MAX_LOOKBACK_DAYS}"
            )));
        }
        if self.quarantine_threshold == 0 {
            return Err(AppError::Config(
                "quarantine_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.base_interval_hours))
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.lookback_days))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
