//! Configuration management for threadwatch.
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! environment variables, command-line flags. Environment and flags are
//! bound together by clap and arrive here as [`Overrides`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::notifier::NotificationDispatcher;
use crate::scrapers::BrowserEngineConfig;
use crate::utils::{Backoff, RetryPolicy};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILENAME: &str = "threadwatch.toml";

/// Default ledger location.
pub const DEFAULT_DATABASE_PATH: &str = "./data/comments.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (set it in the config file or via {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
    },
    #[error("invalid URL for `{key}` ({value:?}): {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How pages are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEngine {
    /// Plain HTTP GET. Collapsed replies are not expanded.
    #[default]
    Http,
    /// Headless Chrome with reply expansion.
    Browser,
}

impl FetchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchEngine::Http => "http",
            FetchEngine::Browser => "browser",
        }
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub engine: FetchEngine,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub attempts: u32,
    /// Exponential backoff base: the wait after attempt n is base × 2^n.
    pub backoff_base_ms: u64,
    /// Page fetches in flight at once.
    pub concurrency: usize,
    /// `None` for the default desktop UA, `"impersonate"` for a random real
    /// browser UA, anything else is sent verbatim.
    pub user_agent: Option<String>,
    pub browser: BrowserEngineConfig,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            engine: FetchEngine::Http,
            timeout_secs: 15,
            attempts: 3,
            backoff_base_ms: 1000,
            concurrency: 2,
            user_agent: None,
            browser: BrowserEngineConfig::default(),
        }
    }
}

impl FetchSettings {
    /// Time allowed for one fetch attempt.
    ///
    /// A browser attempt gets at least the browser's own attempt budget, so
    /// the retry timer never cancels a render that is still within bounds.
    pub fn attempt_timeout(&self) -> Duration {
        let timeout = Duration::from_secs(self.timeout_secs);
        match self.engine {
            FetchEngine::Http => timeout,
            FetchEngine::Browser => timeout.max(self.browser.attempt_budget()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempts,
            self.attempt_timeout(),
            Backoff::Exponential(Duration::from_millis(self.backoff_base_ms)),
        )
    }
}

/// `[notify]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub timeout_secs: u64,
    pub attempts: u32,
    /// Linear backoff unit: the wait after attempt n is n × unit.
    pub retry_unit_ms: u64,
    /// Maximum description length in characters.
    pub description_limit: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            attempts: 2,
            retry_unit_ms: 2000,
            description_limit: 300,
        }
    }
}

impl NotifySettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.attempts,
            Duration::from_secs(self.timeout_secs),
            Backoff::Linear(Duration::from_millis(self.retry_unit_ms)),
        )
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.retry_policy(), self.description_limit)
    }
}

/// Configuration file contents. Every top-level key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target_url: Option<String>,
    pub webhook_url: Option<String>,
    pub interval_minutes: Option<u64>,
    pub database_path: Option<String>,
    pub pages: Option<u32>,
    pub retention_days: Option<u32>,
    pub fetch: FetchSettings,
    pub notify: NotifySettings,

    /// File this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit` if given, else from `./threadwatch.toml` if it
    /// exists, else defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from_path(path).await,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILENAME);
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    Self::load_from_path(path).await
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific TOML file.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Values from environment variables and command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_url: Option<String>,
    pub webhook_url: Option<String>,
    pub interval_minutes: Option<u64>,
    pub database_path: Option<String>,
    pub pages: Option<u32>,
    pub retention_days: Option<u32>,
}

/// The URLs a validated `watch` run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub target_url: String,
    pub webhook_url: String,
}

/// Fully merged application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_url: Option<String>,
    pub webhook_url: Option<String>,
    pub interval_minutes: u64,
    pub database_path: PathBuf,
    pub pages: u32,
    pub retention_days: Option<u32>,
    pub fetch: FetchSettings,
    pub notify: NotifySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(Config::default(), &Overrides::default())
    }
}

impl Settings {
    /// Merge a loaded config file with overrides.
    pub fn resolve(config: Config, overrides: &Overrides) -> Self {
        let base_dir = config.base_dir();

        let database_path = match (&overrides.database_path, &config.database_path) {
            (Some(path), _) => expand_path(path),
            (None, Some(path)) => resolve_path(path, &base_dir),
            (None, None) => PathBuf::from(DEFAULT_DATABASE_PATH),
        };

        Self {
            target_url: overrides.target_url.clone().or(config.target_url),
            webhook_url: overrides.webhook_url.clone().or(config.webhook_url),
            interval_minutes: overrides
                .interval_minutes
                .or(config.interval_minutes)
                .unwrap_or(1),
            database_path,
            pages: overrides.pages.or(config.pages).unwrap_or(1),
            retention_days: overrides.retention_days.or(config.retention_days),
            fetch: config.fetch,
            notify: config.notify,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Validate everything the `watch` command needs and return the two
    /// required URLs.
    pub fn validate_for_watch(&self) -> Result<WatchTarget, ConfigError> {
        let target = self.target_url.as_deref().ok_or(ConfigError::Missing {
            key: "target_url",
            env: "TARGET_URL",
        })?;
        validate_url("target_url", target)?;

        let webhook = self.webhook_url.as_deref().ok_or(ConfigError::Missing {
            key: "webhook_url",
            env: "DISCORD_WEBHOOK_URL",
        })?;
        validate_url("webhook_url", webhook)?;

        if self.interval_minutes < 1 {
            return Err(ConfigError::Invalid {
                key: "interval_minutes",
                message: "must be at least 1".to_string(),
            });
        }
        if self.pages < 1 {
            return Err(ConfigError::Invalid {
                key: "pages",
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch.attempts < 1 || self.notify.attempts < 1 {
            return Err(ConfigError::Invalid {
                key: "attempts",
                message: "fetch.attempts and notify.attempts must be at least 1".to_string(),
            });
        }
        if self.notify.description_limit < 4 {
            return Err(ConfigError::Invalid {
                key: "notify.description_limit",
                message: "must leave room for text and the ellipsis".to_string(),
            });
        }

        Ok(WatchTarget {
            target_url: target.to_string(),
            webhook_url: webhook.to_string(),
        })
    }
}

/// Parse and check that a URL is http(s).
pub fn validate_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            key,
            value: value.to_string(),
            reason: format!("unsupported scheme {:?}", other),
        }),
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Resolve a path from the config file.
/// - Absolute paths are returned as-is
/// - Paths starting with ~ are expanded
/// - Relative paths are resolved relative to `base_dir`
fn resolve_path(path: &str, base_dir: &Path) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}
