use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_USERNAME: &str = "User";
const DEFAULT_MODEL: &str = "gemma3:1b";

const ENV_BACKEND_URL: &str = "BARD_BACKEND_URL";
const ENV_USERNAME: &str = "BARD_USERNAME";
const ENV_DEFAULT_MODEL: &str = "BARD_DEFAULT_MODEL";
const ENV_LOG_LEVEL: &str = "BARD_LOG_LEVEL";
const ENV_REFRESH_INTERVAL: &str = "BARD_REFRESH_INTERVAL_SECS";

/// Errors raised while loading, validating, or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} configuration: {message}")]
    Parse {
        format: ConfigFormat,
        message: String,
    },

    #[error("failed to render {format} configuration: {message}")]
    Render {
        format: ConfigFormat,
        message: String,
    },

    #[error("unsupported configuration format {0:?}; use yaml, json, or toml")]
    UnsupportedFormat(String),

    #[error("invalid {var} value {value:?}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Serialisation formats accepted for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Resolves a format from a name or file extension (`yaml`, `yml`, `json`, `toml`).
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedFormat`] for anything else.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(name.to_string())),
        }
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::from_name(extension)
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Output format for log lines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Values supplied on the command line. They take precedence over everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub username: Option<String>,
    pub default_model: Option<String>,
}

/// The main configuration structure for the Bard client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat backend.
    pub backend_url: String,

    /// Display name used as the thread owner. Stands in for identity.
    pub username: String,

    /// Model selected when none is given explicitly.
    pub default_model: String,

    /// Longest message, in characters, the client will submit.
    pub max_message_length: usize,

    /// Number of threads kept from the server's list.
    pub thread_list_limit: usize,

    /// Seconds between background thread list refreshes.
    pub refresh_interval_secs: u64,

    /// Timeout, in seconds, for read requests. The completion stream is not bounded.
    pub request_timeout_secs: u64,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ClientConfig {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            max_message_length: 4000,
            thread_list_limit: 15,
            refresh_interval_secs: 5,
            request_timeout_secs: 30,
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a `.yaml`, `.yml`, `.json`, or `.toml` file.
    /// * `overrides` - Command-line values that win over every other source.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, an environment variable
    /// is malformed, or the resolved configuration fails [`ClientConfig::validate`].
    pub fn load_config(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::with_defaults(),
        };

        // Environment variables only fill values the file left at their defaults.
        config.apply_env_overrides()?;

        if let Some(url) = &overrides.backend_url {
            config.backend_url.clone_from(url);
        }
        if let Some(username) = &overrides.username {
            config.username.clone_from(username);
        }
        if let Some(model) = &overrides.default_model {
            config.default_model.clone_from(model);
        }

        config.validate().map_err(ConfigError::Invalid)?;
        debug!(backend_url = %config.backend_url, username = %config.username, "configuration loaded");
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, format)
    }

    /// Parses a configuration document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let parsed = match format {
            ConfigFormat::Yaml => serde_yml::from_str(content).map_err(|err| err.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|err| err.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|err| err.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse { format, message })
    }

    /// Serialises the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Render`] if the serializer rejects the value.
    pub fn render(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        let rendered = match format {
            ConfigFormat::Yaml => serde_yml::to_string(self).map_err(|err| err.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|err| err.to_string()),
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|err| err.to_string()),
        };
        rendered.map_err(|message| ConfigError::Render { format, message })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.backend_url == defaults.backend_url
            && let Ok(url) = env::var(ENV_BACKEND_URL)
        {
            self.backend_url = url;
        }
        if self.username == defaults.username
            && let Ok(username) = env::var(ENV_USERNAME)
        {
            self.username = username;
        }
        if self.default_model == defaults.default_model
            && let Ok(model) = env::var(ENV_DEFAULT_MODEL)
        {
            self.default_model = model;
        }
        if self.logging.level == defaults.logging.level
            && let Ok(level) = env::var(ENV_LOG_LEVEL)
        {
            self.logging.level = level;
        }
        if self.refresh_interval_secs == defaults.refresh_interval_secs
            && let Ok(raw) = env::var(ENV_REFRESH_INTERVAL)
        {
            self.refresh_interval_secs =
                raw.trim()
                    .parse()
                    .map_err(|err: std::num::ParseIntError| ConfigError::InvalidEnv {
                        var: ENV_REFRESH_INTERVAL,
                        value: raw.clone(),
                        reason: err.to_string(),
                    })?;
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns every problem found, one message per field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(err) = Url::parse(&self.backend_url) {
            errors.push(format!("Invalid backend URL {:?}: {err}", self.backend_url));
        }
        if self.username.trim().is_empty() {
            errors.push("Username must not be empty.".to_string());
        }
        if self.max_message_length == 0 {
            errors.push("Maximum message length must be greater than 0.".to_string());
        }
        if self.thread_list_limit == 0 {
            errors.push("Thread list limit must be greater than 0.".to_string());
        }
        if self.refresh_interval_secs == 0 {
            errors.push("Refresh interval must be greater than 0 seconds.".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("Request timeout must be greater than 0 seconds.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The backend base URL.
    ///
    /// # Errors
    /// Returns the parse error if the URL is malformed.
    pub fn backend_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.backend_url)
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
