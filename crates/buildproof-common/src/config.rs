//! Harness configuration model.
//!
//! A single [`HarnessConfig`] is built per test binary and handed to the
//! harness constructor; nothing reads configuration from global state after
//! that point.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BuildproofError, Result};
use crate::retry::RetryPolicy;

/// Root configuration for a buildproof harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Image builder CLI (name on `PATH` or absolute path).
    pub pack_binary: PathBuf,
    /// Container runtime CLI.
    pub docker_binary: PathBuf,
    /// Buildpacks used when a build request selects none.
    pub buildpacks: Vec<String>,
    /// Builder image used when a build request does not override it.
    pub builder: Option<String>,
    /// Whether builds disable colored output.
    pub no_color: bool,
    /// Default policy for HTTP probes and log waits.
    pub poll: RetryPolicy,
    /// Budget for resolving published ports after a container starts.
    pub port_timeout: Duration,
    /// Host used to reach published ports.
    pub probe_host: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            pack_binary: PathBuf::from(constants::DEFAULT_PACK_BINARY),
            docker_binary: PathBuf::from(constants::DEFAULT_DOCKER_BINARY),
            buildpacks: Vec::new(),
            builder: None,
            no_color: true,
            poll: RetryPolicy::default(),
            port_timeout: Duration::from_millis(constants::DEFAULT_PORT_TIMEOUT_MS),
            probe_host: constants::DEFAULT_PROBE_HOST.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildproofError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded harness config");
        Ok(config)
    }

    /// Builds a configuration from defaults overlaid with `BUILDPROOF_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a key lookup, typically the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout override is not a whole number.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(pack) = lookup(constants::ENV_PACK) {
            self.pack_binary = PathBuf::from(pack);
        }
        if let Some(docker) = lookup(constants::ENV_DOCKER) {
            self.docker_binary = PathBuf::from(docker);
        }
        if let Some(list) = lookup(constants::ENV_BUILDPACKS) {
            self.buildpacks = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(builder) = lookup(constants::ENV_BUILDER) {
            self.builder = Some(builder).filter(|b| !b.trim().is_empty());
        }
        if let Some(raw) = lookup(constants::ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| BuildproofError::Config {
                message: format!("{} must be a whole number of seconds, got {raw:?}", constants::ENV_TIMEOUT_SECS),
            })?;
            self.poll = self.poll.with_timeout(Duration::from_secs(secs));
            self.port_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}
