//! Container run options and the handle returned for a started container.

use std::collections::BTreeMap;
use std::time::Instant;

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::types::ContainerId;

/// Declarative options for starting a container.
///
/// Environment variables are kept sorted so identical options always produce
/// identical runtime invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Environment variables passed to the container process.
    pub env: BTreeMap<String, String>,
    /// Container ports to publish on ephemeral host ports.
    pub publish: Vec<u16>,
    /// Whether every exposed port is published as well.
    pub publish_all: bool,
    /// Volume mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    /// Entrypoint override (e.g. a Procfile process type).
    pub entrypoint: Option<String>,
    /// Arguments passed after the image.
    pub command: Vec<String>,
}

impl RunOptions {
    /// Creates empty run options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Adds several environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Publishes a container port.
    #[must_use]
    pub fn publish(mut self, port: u16) -> Self {
        if !self.publish.contains(&port) {
            self.publish.push(port);
        }
        self
    }

    /// Publishes every exposed port.
    #[must_use]
    pub const fn publish_all(mut self) -> Self {
        self.publish_all = true;
        self
    }

    /// Mounts a volume.
    #[must_use]
    pub fn volume(mut self, spec: impl Into<String>) -> Self {
        self.volumes.push(spec.into());
        self
    }

    /// Overrides the image entrypoint.
    #[must_use]
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Sets arguments passed after the image.
    #[must_use]
    pub fn command(mut self, args: Vec<String>) -> Self {
        self.command = args;
        self
    }
}

/// A container started by the lifecycle manager.
///
/// Host ports are resolved before the handle is handed out, so a handle's
/// port map is always complete for every published port.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Runtime identifier.
    pub id: ContainerId,
    /// Image the container was started from.
    pub image: String,
    /// Container port to host port bindings.
    pub ports: BTreeMap<u16, u16>,
    /// When the runtime accepted the container.
    pub started_at: Instant,
    removed: bool,
}

impl ContainerHandle {
    /// Creates a handle for a freshly started container.
    #[must_use]
    pub fn new(id: ContainerId, image: impl Into<String>, ports: BTreeMap<u16, u16>) -> Self {
        Self {
            id,
            image: image.into(),
            ports,
            started_at: Instant::now(),
            removed: false,
        }
    }

    /// Returns the host port bound to `container_port`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the port was not published.
    pub fn host_port(&self, container_port: u16) -> Result<u16> {
        self.ports
            .get(&container_port)
            .copied()
            .ok_or_else(|| BuildproofError::NotFound {
                kind: "port binding",
                id: format!("{}:{container_port}", self.id.short()),
            })
    }

    /// Returns whether the container has been removed.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) const fn mark_removed(&mut self) {
        self.removed = true;
    }
}
