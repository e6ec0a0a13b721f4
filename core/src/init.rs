//! Initialization for Stepwise
//!
//! Loads configuration and installs the tracing subscriber. Hosts call this
//! once at startup; building an [`Executor`](crate::executor::Executor) does not
//! require it.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepwise_core::init::InitBuilder;
//!
//! // Defaults: stepwise.toml if present, STEPWISE_* env vars, RUST_LOG
//! InitBuilder::new().init()?;
//!
//! // Explicit config file, quieter logging
//! InitBuilder::new()
//!     .config_path("/etc/stepwise/stepwise.toml")
//!     .log_filter("warn")
//!     .init()?;
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Global initialization state
static INIT_STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug)]
struct InitState {
    config: Config,
}

/// Options for initializing Stepwise
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Config file path (overrides default search)
    pub config_path: Option<String>,

    /// Log filter directives (overrides `logging.filter`)
    pub log_filter: Option<String>,

    /// Whether to install a global tracing subscriber
    pub install_subscriber: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            log_filter: None,
            install_subscriber: true,
        }
    }
}

/// Builder for constructing InitOptions
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self {
            options: InitOptions::default(),
        }
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Set the log filter
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.options.log_filter = Some(filter.into());
        self
    }

    /// Set whether to install the tracing subscriber (hosts with their own
    /// subscriber turn this off)
    pub fn install_subscriber(mut self, install: bool) -> Self {
        self.options.install_subscriber = install;
        self
    }

    pub fn init(self) -> Result<()> {
        initialize(self.options)
    }
}

impl Default for InitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize Stepwise with the given options
///
/// Calling this more than once is safe; later calls are no-ops.
pub fn initialize(options: InitOptions) -> Result<()> {
    if INIT_STATE.get().is_some() {
        return Ok(());
    }

    let config = Config::builder()
        .config_path(options.config_path.map(PathBuf::from))
        .log_filter(options.log_filter)
        .build()
        .context("Failed to load configuration")?;

    if options.install_subscriber {
        install_subscriber(&config).context("Failed to install tracing subscriber")?;
    }

    tracing::info!(
        max_iterations = config.executor.max_iterations,
        max_concurrency = ?config.executor.max_concurrency,
        "stepwise initialized"
    );

    INIT_STATE
        .set(InitState { config })
        .map_err(|_| anyhow!("Initialization already completed"))?;

    Ok(())
}

fn install_subscriber(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.logging.ansi)
        .try_init()
        .map_err(|e| anyhow!("{}", e))
}

/// Check if Stepwise has been initialized
pub fn is_initialized() -> bool {
    INIT_STATE.get().is_some()
}

/// The loaded configuration, or the defaults before initialization
pub fn config() -> Config {
    INIT_STATE
        .get()
        .map(|state| state.config.clone())
        .unwrap_or_default()
}
