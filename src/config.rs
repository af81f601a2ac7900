//! Service configuration.
//!
//! Configuration is read from a YAML file, then selected values can be
//! overridden from `UROBOROS_*` environment variables and finally from
//! command-line flags. Every section has defaults except the Stash
//! credentials, which must be provided.
//!
//! ```yaml
//! web:
//!   listen: "0.0.0.0:80"
//!   basic_url: "http://uroboros.example.com"
//! tasks:
//!   threads: 4
//!   queue_capacity: 1024
//!   step_timeout_secs: 1800
//! stash:
//!   address: "https://git.example.com"
//!   username: "uroboros"
//!   password: "secret"
//! linters:
//!   gofmt: "test -z \"$(gofmt -s -l .)\""
//!   govet: "go vet ./..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::DEFAULT_QUEUE_CAPACITY;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/uroboros/uroboros.yaml";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("can't read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("can't parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Socket address the HTTP server binds to.
    pub listen: String,
    /// Externally reachable URL of this service, used in badges and comments.
    pub basic_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:80".to_string(),
            basic_url: "http://localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Number of workers.
    pub threads: usize,
    /// Tasks that may wait for a worker before submissions are refused.
    pub queue_capacity: usize,
    /// Upper bound for every external command. Unset means no limit.
    pub step_timeout_secs: Option<u64>,
    /// Parent directory for build workspaces. Defaults to the system temp dir.
    pub workspace_root: Option<PathBuf>,
    /// How long shutdown waits for running tasks.
    pub shutdown_timeout_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            step_timeout_secs: None,
            workspace_root: None,
            shutdown_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    pub address: String,
    pub username: String,
    pub password: String,
}

/// Commands used when the project has no Makefile target for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub dependencies: Vec<String>,
    pub build: Vec<String>,
    pub test: Vec<String>,
    pub make_build: Vec<String>,
    pub make_test: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            dependencies: argv(&["go", "get", "-v", "-d"]),
            build: argv(&["go", "build", "-gcflags", "-e"]),
            test: argv(&["go", "test", "-gcflags", "-e"]),
            make_build: argv(&["make", "build"]),
            make_test: argv(&["make", "test"]),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub tasks: TasksConfig,
    pub stash: StashConfig,
    pub toolchain: ToolchainConfig,
    /// Lint commands by name, run through `sh -c` in name order.
    pub linters: BTreeMap<String, String>,
}

impl Config {
    /// Loads and validates configuration from a YAML file, applying
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file can't be read or parsed, or if the
    /// result fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses configuration from YAML without validating it.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // an empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `UROBOROS_LISTEN`: HTTP listen address
    /// - `UROBOROS_BASIC_URL`: external URL of the service
    /// - `UROBOROS_THREADS`: number of workers
    /// - `UROBOROS_STASH_ADDRESS`, `UROBOROS_STASH_USERNAME`,
    ///   `UROBOROS_STASH_PASSWORD`: Stash credentials
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("UROBOROS_LISTEN") {
            self.web.listen = val;
        }

        if let Some(val) = lookup("UROBOROS_BASIC_URL") {
            self.web.basic_url = val;
        }

        if let Some(val) = lookup("UROBOROS_THREADS") {
            self.tasks.threads = parse_env_value(&val, "UROBOROS_THREADS")?;
        }

        if let Some(val) = lookup("UROBOROS_STASH_ADDRESS") {
            self.stash.address = val;
        }

        if let Some(val) = lookup("UROBOROS_STASH_USERNAME") {
            self.stash.username = val;
        }

        if let Some(val) = lookup("UROBOROS_STASH_PASSWORD") {
            self.stash.password = val;
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "web.listen cannot be empty".to_string(),
            ));
        }

        if !(self.web.basic_url.starts_with("http://") || self.web.basic_url.starts_with("https://"))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "web.basic_url must be an http(s) URL, got '{}'",
                self.web.basic_url
            )));
        }

        if self.tasks.threads == 0 {
            return Err(ConfigError::ValidationFailed(
                "tasks.threads must be greater than 0".to_string(),
            ));
        }

        if self.tasks.queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "tasks.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.tasks.step_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "tasks.step_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        for (key, value) in [
            ("stash.address", &self.stash.address),
            ("stash.username", &self.stash.username),
            ("stash.password", &self.stash.password),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationFailed(format!("{key} is required")));
            }
        }

        let toolchain = [
            ("toolchain.dependencies", &self.toolchain.dependencies),
            ("toolchain.build", &self.toolchain.build),
            ("toolchain.test", &self.toolchain.test),
            ("toolchain.make_build", &self.toolchain.make_build),
            ("toolchain.make_test", &self.toolchain.make_test),
        ];
        for (key, command) in toolchain {
            if command.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{key} cannot be empty"
                )));
            }
        }

        if let Some((name, _)) = self.linters.iter().find(|(_, cmd)| cmd.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(format!(
                "linter '{name}' has an empty command"
            )));
        }

        Ok(())
    }

    /// Per-command timeout, if configured.
    pub fn step_timeout(&self) -> Option<Duration> {
        self.tasks.step_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.tasks.shutdown_timeout_secs)
    }

    /// Builder method to set the listen address.
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.web.listen = listen.into();
        self
    }

    /// Builder method to set the external URL.
    pub fn with_basic_url(mut self, url: impl Into<String>) -> Self {
        self.web.basic_url = url.into();
        self
    }

    /// Builder method to set the number of workers.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.tasks.threads = threads;
        self
    }

    /// Builder method to set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.tasks.queue_capacity = capacity;
        self
    }

    /// Builder method to set the Stash server and credentials.
    pub fn with_stash(
        mut self,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.stash = StashConfig {
            address: address.into(),
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Builder method to add a linter.
    pub fn with_linter(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.linters.insert(name.into(), command.into());
        self
    }
}

/// Parses an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
