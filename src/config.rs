use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration, read from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lamr: LamrConfig,
    pub portal: PortalConfig,
    pub soap: SoapConfig,
}

impl Config {
    /// Load configuration from `path`, or from the user config directory when
    /// no path is given. Falls back to defaults if no file exists there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `~/.config/wokharvest/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wokharvest").join("config.toml"))
}

/// Settings for the batch citation (LAMR) service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LamrConfig {
    pub url: String,
    pub app_id: String,
    pub env_id: String,
    pub partner_email: String,
    /// Papers per request; the service rejects larger requests
    pub request_limit: usize,
    pub max_workers: usize,
    pub retry: RetryConfig,
}

impl Default for LamrConfig {
    fn default() -> Self {
        Self {
            url: "https://ws.isiknowledge.com/cps/xrpc".to_string(),
            app_id: "wokharvest".to_string(),
            env_id: "default".to_string(),
            partner_email: "user@example.com".to_string(),
            request_limit: 50,
            max_workers: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl LamrConfig {
    /// Value of the `src` attribute identifying the caller to the service
    pub fn source_attribute(&self) -> String {
        format!(
            "app.id={},env.id={},partner.email={}",
            self.app_id, self.env_id, self.partner_email
        )
    }
}

/// Retry behaviour for groups that fail with a transient transport error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per group including the first; `None` retries forever
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No backoff and unbounded attempts, matching the service's original client
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before releasing a group that failed on attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Settings for the interactive search portal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub root_url: String,
    pub search_url: String,
    pub summary_url: String,
    pub user_agent: String,
    /// Queries allowed per session before it is torn down and recreated
    pub query_reset: u32,
    pub page_size: u32,
    /// Result lists longer than this are cut to their first page
    pub max_pages: u32,
    pub jitter_probability: f64,
    pub max_jitter_ms: u64,
    pub reset_backoff_min_ms: u64,
    pub reset_backoff_spread_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            root_url: "http://www.webofknowledge.com".to_string(),
            search_url: "http://apps.webofknowledge.com/UA_GeneralSearch.do".to_string(),
            summary_url: "http://apps.webofknowledge.com/summary.do".to_string(),
            user_agent: "Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 5.1)".to_string(),
            query_reset: 40,
            page_size: 50,
            max_pages: 10,
            jitter_probability: 0.25,
            max_jitter_ms: 500,
            reset_backoff_min_ms: 500,
            reset_backoff_spread_ms: 5_000,
        }
    }
}

impl PortalConfig {
    /// Same endpoints with every delay switched off
    pub fn without_delays(mut self) -> Self {
        self.jitter_probability = 0.0;
        self.max_jitter_ms = 0;
        self.reset_backoff_min_ms = 0;
        self.reset_backoff_spread_ms = 0;
        self
    }
}

/// Endpoints of the SOAP lite search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapConfig {
    pub auth_url: String,
    pub search_url: String,
}

impl Default for SoapConfig {
    fn default() -> Self {
        Self {
            auth_url: "http://search.isiknowledge.com/esti/wokmws/ws/WOKMWSAuthenticate"
                .to_string(),
            search_url: "http://search.isiknowledge.com/esti/wokmws/ws/WokSearchLite"
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
                [lamr]
                partner_email = "me@example.org"
                max_workers = 4

                [lamr.retry]
                max_attempts = 3

                [portal]
                query_reset = 20
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.lamr.max_workers, 4);
        assert_eq!(config.lamr.request_limit, 50);
        assert_eq!(config.lamr.retry.max_attempts, Some(3));
        assert_eq!(config.lamr.retry.initial_backoff_ms, 500);
        assert_eq!(config.portal.query_reset, 20);
        assert_eq!(config.portal.max_pages, 10);
        assert!(config
            .lamr
            .source_attribute()
            .ends_with("partner.email=me@example.org"));
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[lamr\nurl = 1").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: Some(4),
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
            multiplier: 2.0,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(250));
        assert!(!retry.exhausted(3));
        assert!(retry.exhausted(4));
        assert!(!RetryConfig::unbounded().exhausted(u32::MAX));
    }
}
