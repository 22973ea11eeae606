//! Container log retrieval and waiting.

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::retry::{Attempt, RetryPolicy, poll_until};
use buildproof_common::transcript::{LineMatcher, LogTranscript};
use buildproof_common::types::ContainerId;

use crate::backend::ContainerRuntime;

/// Fetches a container's logs as a transcript.
///
/// # Errors
///
/// Returns an error if the runtime cannot produce the logs.
pub fn read_logs(runtime: &dyn ContainerRuntime, id: &ContainerId) -> Result<LogTranscript> {
    let raw = runtime.logs(id)?;
    Ok(LogTranscript::from_output(&raw))
}

/// Polls a container's logs until a line satisfies `matcher`.
///
/// Returns the transcript that contained the match.
///
/// # Errors
///
/// Returns `LogWaitTimeout` with the last logs seen when the policy's budget
/// elapses, or the runtime's error if logs cannot be fetched at all.
pub fn wait_for_line(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    matcher: &LineMatcher,
    policy: &RetryPolicy,
) -> Result<LogTranscript> {
    tracing::debug!(id = %id.short(), expectation = %matcher, "waiting for container log line");
    let mut last = LogTranscript::default();
    let found = poll_until(
        policy,
        || {
            let transcript = read_logs(runtime, id)?;
            if transcript.contains_line(matcher) {
                return Ok(Attempt::Ready(transcript));
            }
            let observed = format!("{} lines, none matching", transcript.len());
            last = transcript;
            Ok(Attempt::Pending(observed))
        },
        |expired| BuildproofError::LogWaitTimeout {
            container: id.to_string(),
            expectation: matcher.to_string(),
            timeout: expired.timeout,
            logs: String::new(),
        },
    );
    found.map_err(|e| match e {
        BuildproofError::LogWaitTimeout {
            container,
            expectation,
            timeout,
            ..
        } => BuildproofError::LogWaitTimeout {
            container,
            expectation,
            timeout,
            logs: last.to_string(),
        },
        other => other,
    })
}
