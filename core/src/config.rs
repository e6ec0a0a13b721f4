//! Layered configuration
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`STEPWISE_CONFIG_PATH`, an explicit path, or `stepwise.toml`
//!    in the working directory if present)
//! 3. `STEPWISE_*` environment variables, `__` between levels
//!    (`STEPWISE_EXECUTOR__MAX_ITERATIONS=50`)
//! 4. explicit builder overrides
//!
//! A `.env` file is loaded into the environment first.

use std::path::{Path, PathBuf};

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type SourceBuilder = ::config::ConfigBuilder<::config::builder::DefaultState>;

pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
const ENV_PREFIX: &str = "STEPWISE";
const CONFIG_PATH_VAR: &str = "STEPWISE_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Executor limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Ceiling for `while` loops that do not set their own
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Batch size for `foreach`/`map_reduce` steps that do not set their own
    /// (unset means the whole item list at once)
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_concurrency: None,
        }
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` wins when set
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: default_ansi(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Config {
    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a TOML document layered over the defaults (no file or env lookup)
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = with_defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_iterations must be > 0".to_string(),
            ));
        }
        if self.executor.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "executor.max_concurrency must be > 0".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn with_defaults() -> Result<SourceBuilder, ConfigError> {
    Ok(::config::Config::builder()
        .set_default("executor.max_iterations", DEFAULT_MAX_ITERATIONS as i64)?
        .set_default("logging.filter", default_log_filter())?
        .set_default("logging.ansi", default_ansi())?)
}

/// Builder for [`Config`] with explicit overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_iterations: Option<usize>,
    max_concurrency: Option<usize>,
    log_filter: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_iterations(mut self, max: Option<usize>) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn max_concurrency(mut self, max: Option<usize>) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let path = self
            .config_path
            .or_else(|| std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from));

        let mut builder = with_defaults()?;
        builder = match &path {
            Some(path) => builder.add_source(file_source(path).required(true)),
            None => builder.add_source(File::with_name("stepwise").required(false)),
        };
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(max) = self.max_iterations {
            builder = builder.set_override("executor.max_iterations", max as i64)?;
        }
        if let Some(max) = self.max_concurrency {
            builder = builder.set_override("executor.max_concurrency", max as i64)?;
        }
        if let Some(filter) = self.log_filter {
            builder = builder.set_override("logging.filter", filter)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            path = ?path,
            max_iterations = config.executor.max_iterations,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn file_source(path: &Path) -> File<::config::FileSourceFile, FileFormat> {
    File::from(path).format(FileFormat::Toml)
}
