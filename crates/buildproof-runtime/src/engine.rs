//! Container lifecycle manager.
//!
//! Starts containers, resolves their published ports, exposes their logs and
//! removes them. A handle is only returned once every published port has a
//! host binding, so callers can never probe a container too early.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::retry::{Attempt, RetryPolicy, poll_until};
use buildproof_common::transcript::{LineMatcher, LogTranscript};
use buildproof_common::types::ContainerId;

use crate::backend::ContainerRuntime;
use crate::container::{ContainerHandle, RunOptions};

/// Coordinates container operations against a runtime.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    port_policy: RetryPolicy,
}

impl ContainerManager {
    /// Creates a manager that resolves ports within `port_timeout`.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, port_timeout: Duration) -> Self {
        Self {
            runtime,
            port_policy: RetryPolicy {
                timeout: port_timeout,
                ..RetryPolicy::default()
            },
        }
    }

    /// Overrides the port resolution polling policy.
    #[must_use]
    pub const fn with_port_policy(mut self, policy: RetryPolicy) -> Self {
        self.port_policy = policy;
        self
    }

    /// Returns the underlying runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Starts a container and waits for its published ports to bind.
    ///
    /// If port resolution fails the container is removed before the error
    /// is returned, so a failed `run` never leaks a container.
    ///
    /// # Errors
    ///
    /// Returns `Runtime` if the container cannot start or exits before
    /// binding, or `PortResolutionTimeout` if a port never binds.
    pub fn run(&self, image: &str, options: &RunOptions) -> Result<ContainerHandle> {
        let id = self.runtime.run(image, options)?;
        match self.resolve_ports(&id, &options.publish) {
            Ok(ports) => {
                tracing::info!(id = %id.short(), image, ?ports, "container ready");
                Ok(ContainerHandle::new(id, image, ports))
            }
            Err(e) => {
                if let Err(cleanup) = self.runtime.remove_container(&id) {
                    tracing::warn!(id = %id.short(), error = %cleanup, "failed to remove unresolved container");
                }
                Err(e)
            }
        }
    }

    fn resolve_ports(&self, id: &ContainerId, wanted: &[u16]) -> Result<BTreeMap<u16, u16>> {
        if wanted.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut missing_port = wanted[0];
        let resolved = poll_until(
            &self.port_policy,
            || {
                let info = self.runtime.inspect_container(id)?;
                if info.has_exited() {
                    let logs = self.runtime.logs(id).unwrap_or_default();
                    return Err(BuildproofError::Runtime {
                        operation: format!(
                            "keep container {} running (exited with code {})",
                            id.short(),
                            info.exit_code
                        ),
                        output: logs,
                    });
                }
                match wanted.iter().find(|p| !info.ports.contains_key(*p)) {
                    None => Ok(Attempt::Ready(info.ports)),
                    Some(&port) => {
                        missing_port = port;
                        Ok(Attempt::Pending(format!("port {port} not bound (status {})", info.status)))
                    }
                }
            },
            |expired| BuildproofError::PortResolutionTimeout {
                container: id.to_string(),
                port: 0,
                timeout: expired.timeout,
            },
        );
        resolved.map_err(|e| match e {
            BuildproofError::PortResolutionTimeout { container, timeout, .. } => {
                BuildproofError::PortResolutionTimeout {
                    container,
                    port: missing_port,
                    timeout,
                }
            }
            other => other,
        })
    }

    /// Returns the container's current logs.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be retrieved.
    pub fn logs(&self, handle: &ContainerHandle) -> Result<LogTranscript> {
        crate::logs::read_logs(self.runtime.as_ref(), &handle.id)
    }

    /// Waits until the container's logs contain a line matching `matcher`.
    ///
    /// # Errors
    ///
    /// Returns `LogWaitTimeout` if no such line appears in time.
    pub fn wait_for_logs(
        &self,
        handle: &ContainerHandle,
        matcher: &LineMatcher,
        policy: &RetryPolicy,
    ) -> Result<LogTranscript> {
        crate::logs::wait_for_line(self.runtime.as_ref(), &handle.id, matcher, policy)
    }

    /// Removes the container. Calling this on a removed handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime refuses the removal for a reason
    /// other than the container being absent.
    pub fn remove(&self, handle: &mut ContainerHandle) -> Result<()> {
        if handle.is_removed() {
            return Ok(());
        }
        self.runtime.remove_container(&handle.id)?;
        handle.mark_removed();
        Ok(())
    }
}
