//! Container runtime abstraction.
//!
//! The harness consumes the runtime through [`ContainerRuntime`] only; the
//! Docker CLI implementation lives in [`docker`]. Every removal operation is
//! idempotent: removing something that no longer exists succeeds.

pub mod docker;

use std::collections::BTreeMap;

use buildproof_common::error::Result;
use buildproof_common::types::{ContainerId, ImageId};

use crate::container::RunOptions;

/// Image details reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Content-derived identity.
    pub id: ImageId,
    /// Image labels.
    pub labels: BTreeMap<String, String>,
    /// Creation timestamp as reported (RFC 3339).
    pub created: Option<String>,
}

/// Container details reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Runtime status (`created`, `running`, `exited`, ...).
    pub status: String,
    /// Whether the container process is running.
    pub running: bool,
    /// Exit code of the main process, meaningful once exited.
    pub exit_code: i64,
    /// Container port to host port bindings currently published.
    pub ports: BTreeMap<u16, u16>,
}

impl ContainerInfo {
    /// Returns whether the container stopped on its own.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        !self.running && matches!(self.status.as_str(), "exited" | "dead")
    }
}

/// Client contract for the container runtime daemon.
pub trait ContainerRuntime: Send + Sync {
    /// Starts a detached container and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns `Runtime` if the container cannot be started.
    fn run(&self, image: &str, options: &RunOptions) -> Result<ContainerId>;

    /// Inspects a container's state and port bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist or the output is
    /// malformed.
    fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo>;

    /// Returns the container's combined log output.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be retrieved.
    fn logs(&self, id: &ContainerId) -> Result<String>;

    /// Force-removes a container and its anonymous volumes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the runtime fails for a reason other than
    /// the container being absent.
    fn remove_container(&self, id: &ContainerId) -> Result<()>;

    /// Inspects an image by name or identity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image does not exist.
    fn inspect_image(&self, reference: &str) -> Result<ImageInfo>;

    /// Force-removes an image.
    ///
    /// # Errors
    ///
    /// Returns an error only if the runtime fails for a reason other than
    /// the image being absent.
    fn remove_image(&self, reference: &str) -> Result<()>;

    /// Removes named volumes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the runtime fails for a reason other than
    /// a volume being absent.
    fn remove_volumes(&self, names: &[String]) -> Result<()>;

    /// Pulls an image from its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    fn pull(&self, image: &str) -> Result<()>;

    /// Returns whether the runtime is reachable.
    fn is_available(&self) -> bool;
}

/// Returns whether runtime output reports a missing object.
#[must_use]
pub fn is_not_found(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("no such container")
        || lower.contains("no such image")
        || lower.contains("no such volume")
        || lower.contains("no such object")
        || (lower.contains("image") && lower.contains("not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages_are_recognized() {
        assert!(is_not_found("Error response from daemon: No such container: abc"));
        assert!(is_not_found("Error: No such image: sha256:deadbeef"));
        assert!(is_not_found("Error response from daemon: get pack-cache-x.build: no such volume"));
        assert!(!is_not_found("Error response from daemon: conflict: unable to remove repository reference"));
    }

    #[test]
    fn exited_container_detection() {
        let info = ContainerInfo {
            status: "exited".into(),
            running: false,
            exit_code: 1,
            ports: BTreeMap::new(),
        };
        assert!(info.has_exited());
        let starting = ContainerInfo {
            status: "created".into(),
            running: false,
            exit_code: 0,
            ports: BTreeMap::new(),
        };
        assert!(!starting.has_exited());
    }
}
