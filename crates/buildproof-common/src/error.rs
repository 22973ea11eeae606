//! Unified error types for the buildproof workspace.
//!
//! Every failure carries the diagnostic context a scenario needs to explain
//! itself: the captured process output, the build transcript, or the last
//! probe response seen before a timeout.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BuildproofError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An external tool exited unsuccessfully.
    #[error("`{command}` exited with status {exit_code}:\n{output}")]
    Process {
        /// Rendered command line.
        command: String,
        /// Exit code, `-1` when the process was killed by a signal.
        exit_code: i32,
        /// Combined stdout and stderr captured before exit.
        output: String,
    },

    /// The image build failed or its result could not be inspected.
    #[error("failed to build {image}: {reason}\n\nOutput:\n{transcript}")]
    Build {
        /// Image name passed to the builder.
        image: String,
        /// What went wrong.
        reason: String,
        /// Full build transcript.
        transcript: String,
    },

    /// The container runtime rejected an operation.
    #[error("container runtime failed to {operation}:\n{output}")]
    Runtime {
        /// Operation that failed (e.g. `run image foo`).
        operation: String,
        /// Output returned by the runtime.
        output: String,
    },

    /// A published port never received a host binding.
    #[error("container {container} did not bind port {port} within {timeout:?}")]
    PortResolutionTimeout {
        /// Container identifier.
        container: String,
        /// Container-side port that was requested.
        port: u16,
        /// Polling budget that elapsed.
        timeout: Duration,
    },

    /// An HTTP probe never satisfied its predicate.
    #[error("probe of {url} not satisfied within {timeout:?}: {last}")]
    ProbeTimeout {
        /// URL that was probed.
        url: String,
        /// Polling budget that elapsed.
        timeout: Duration,
        /// Last failure or response body observed.
        last: String,
    },

    /// Container logs never produced a matching line.
    #[error("logs of container {container} never matched {expectation} within {timeout:?}\n\nLogs:\n{logs}")]
    LogWaitTimeout {
        /// Container identifier.
        container: String,
        /// Description of the expected line.
        expectation: String,
        /// Polling budget that elapsed.
        timeout: Duration,
        /// Last logs fetched.
        logs: String,
    },

    /// A transcript assertion did not hold.
    #[error("expected transcript to {expectation}\n\nTranscript:\n{transcript}")]
    LogAssertion {
        /// Description of the failed expectation.
        expectation: String,
        /// Transcript the assertion ran against.
        transcript: String,
    },

    /// Two builds of the same input produced different images.
    #[error("build is not reproducible: first image {first}, second image {second}")]
    ReproducibilityViolation {
        /// Identity of the first build.
        first: String,
        /// Identity of the rebuild.
        second: String,
    },

    /// An expected artifact does not exist.
    #[error("artifact missing: {path}")]
    ArtifactMissing {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// An artifact exists but its content is wrong.
    #[error("artifact {path} does not match: {message}")]
    ArtifactMismatch {
        /// Offending artifact.
        path: PathBuf,
        /// Description of the mismatch.
        message: String,
    },

    /// A generated resource name is already held by another scenario.
    #[error("resource name already in use: {name}")]
    NameCollision {
        /// The colliding name.
        name: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BuildproofError {
    /// Returns true when the error is one of the bounded-polling timeouts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::PortResolutionTimeout { .. } | Self::ProbeTimeout { .. } | Self::LogWaitTimeout { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BuildproofError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_surfaces_output() {
        let err = BuildproofError::Process {
            command: "pack build app".into(),
            exit_code: 1,
            output: "ERROR: no buildpacks participating".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("status 1"));
        assert!(rendered.contains("no buildpacks participating"));
    }

    #[test]
    fn timeouts_are_distinguishable() {
        let probe = BuildproofError::ProbeTimeout {
            url: "http://localhost:1".into(),
            timeout: Duration::from_secs(1),
            last: "connection refused".into(),
        };
        let build = BuildproofError::Build {
            image: "x".into(),
            reason: "y".into(),
            transcript: String::new(),
        };
        assert!(probe.is_timeout());
        assert!(!build.is_timeout());
    }
}
