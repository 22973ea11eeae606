//! Process driving, container lifecycle management and network probing.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod container;
pub mod engine;
pub mod logs;
pub mod probe;
pub mod process;
/// Recording fake executor, for driving the docker and pack wrappers in
/// tests without the tools installed.
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
