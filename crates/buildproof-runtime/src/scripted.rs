//! Scripted [`Executor`] for exercising tool drivers without the tools.
//!
//! Replies are keyed by a leading argument prefix (`["image", "inspect"]`)
//! and consumed in order; the last reply for a prefix repeats forever.
//! Every invocation is recorded so tests can assert on exact command lines.

use std::collections::VecDeque;
use std::sync::Mutex;

use buildproof_common::error::{BuildproofError, Result};

use crate::process::{Executor, Invocation};

/// Canned result for a scripted invocation.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful exit with this output.
    Output(String),
    /// Non-zero exit with this code and output.
    Fail {
        /// Exit code to report.
        exit_code: i32,
        /// Output to report.
        output: String,
    },
}

impl Reply {
    /// Successful reply.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self::Output(output.into())
    }

    /// Failing reply with exit code 1.
    #[must_use]
    pub fn fail(output: impl Into<String>) -> Self {
        Self::Fail {
            exit_code: 1,
            output: output.into(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    replies: VecDeque<Reply>,
}

/// Executor that answers from a script and records every call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    /// Creates an executor with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `reply` for invocations whose arguments start with `prefix`.
    #[must_use]
    pub fn on(self, prefix: &[&str], reply: Reply) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            let prefix: Vec<String> = prefix.iter().map(ToString::to_string).collect();
            if let Some(rule) = rules.iter_mut().find(|r| r.prefix == prefix) {
                rule.replies.push_back(reply);
            } else {
                rules.push(Rule {
                    prefix,
                    replies: VecDeque::from([reply]),
                });
            }
        }
        self
    }

    /// Returns every invocation seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Returns the argument lists of invocations starting with `prefix`.
    #[must_use]
    pub fn calls_to(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|inv| starts_with(&inv.args, prefix))
            .map(|inv| inv.args)
            .collect()
    }
}

fn starts_with(args: &[String], prefix: &[impl AsRef<str>]) -> bool {
    args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p.as_ref())
}

impl Executor for ScriptedExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        let reply = self.rules.lock().ok().and_then(|mut rules| {
            let rule = rules
                .iter_mut()
                .filter(|r| starts_with(&invocation.args, &r.prefix))
                .max_by_key(|r| r.prefix.len())?;
            if rule.replies.len() > 1 {
                rule.replies.pop_front()
            } else {
                rule.replies.front().cloned()
            }
        });

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Fail { exit_code, output }) => Err(BuildproofError::Process {
                command: invocation.command_line(),
                exit_code,
                output,
            }),
            None => Err(BuildproofError::Process {
                command: invocation.command_line(),
                exit_code: 127,
                output: "no scripted reply".into(),
            }),
        }
    }
}
