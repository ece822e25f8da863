use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::{FetchOptions, RetryPolicy, DEFAULT_API_BASE};
use crate::credentials::DEFAULT_TOKEN_URL;
use crate::duration::{deserialize_duration, serialize_duration};
use crate::normalize::ValidationMode;

/// Environment variable holding the OAuth client id (the app key).
pub const APP_KEY_ENV: &str = "APP_KEY";
/// Environment variable holding the OAuth client secret.
pub const APP_SECRET_ENV: &str = "APP_SECRET";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_refresh_margin() -> Duration {
    Duration::from_secs(60)
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(500)
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout, applied by the HTTP client.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub request_timeout: Duration,

    /// Refresh the access token when it has less than this left.
    #[serde(
        default = "default_refresh_margin",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub refresh_margin: Duration,

    /// Attempts per request for rate-limited, 5xx and network failures.
    pub max_retries: u32,

    #[serde(
        default = "default_retry_base_delay",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            refresh_margin: default_refresh_margin(),
            max_retries: 3,
            retry_base_delay: default_retry_base_delay(),
        }
    }
}

/// Transaction fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Longest span one transactions request may cover.
    pub max_span_days: u32,
    pub sub_range_retries: u32,
    pub concurrency: usize,
    pub validation: ValidationMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let options = FetchOptions::default();
        Self {
            max_span_days: options.max_span_days,
            sub_range_retries: options.sub_range_retries,
            concurrency: options.concurrency,
            validation: ValidationMode::default(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// OAuth client registration. `APP_KEY` / `APP_SECRET` take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,

    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub client_secret: Option<SecretString>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Token pair file. If relative, resolved from the config file location.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub oauth: OAuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_url: default_token_url(),
            token_file: default_token_file(),
            client: ClientConfig::default(),
            fetch: FetchConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_token_file(&self, config_dir: &Path) -> PathBuf {
        if self.token_file.is_absolute() {
            self.token_file.clone()
        } else {
            config_dir.join(&self.token_file)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.client.max_retries.max(1),
            base_delay: self.client.retry_base_delay,
            ..RetryPolicy::default()
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_span_days: self.fetch.max_span_days.max(1),
            sub_range_retries: self.fetch.sub_range_retries,
            concurrency: self.fetch.concurrency.max(1),
            ..FetchOptions::default()
        }
    }

    /// OAuth client id and secret, from the environment first and the
    /// `[oauth]` table second.
    pub fn client_credentials(&self) -> Result<(String, SecretString)> {
        self.client_credentials_from(|name| std::env::var(name).ok())
    }

    fn client_credentials_from(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(String, SecretString)> {
        let non_empty = |v: String| {
            let v = v.trim().to_string();
            (!v.is_empty()).then_some(v)
        };

        let client_id = env(APP_KEY_ENV)
            .and_then(non_empty)
            .or_else(|| self.oauth.client_id.clone())
            .with_context(|| format!("{APP_KEY_ENV} is not set and [oauth] client_id is missing"))?;
        let client_secret = env(APP_SECRET_ENV)
            .and_then(non_empty)
            .map(SecretString::from)
            .or_else(|| self.oauth.client_secret.clone())
            .with_context(|| {
                format!("{APP_SECRET_ENV} is not set and [oauth] client_secret is missing")
            })?;

        Ok((client_id, client_secret))
    }
}

/// Loaded configuration with the token file path resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: PathBuf,
    pub token_file: PathBuf,
    pub config: Config,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./schwab-history.toml` if it exists in current directory
/// 2. `~/.local/share/schwab-history/schwab-history.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("schwab-history.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("schwab-history").join("schwab-history.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load config, falling back to defaults when the file doesn't exist.
    ///
    /// A relative `token_file` is resolved against the config file's
    /// directory, existing or not.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let config = Config::load_or_default(&config_path)?;
        let token_file = config.resolve_token_file(config_dir);

        Ok(Self {
            config_path,
            token_file,
            config,
        })
    }
}
