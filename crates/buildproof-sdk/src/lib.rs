//! # buildproof-sdk
//!
//! Scenario orchestration for build-verification tests.
//!
//! Provides three main entry points:
//! - [`Harness`](harness::Harness): collaborators built once per test binary and shared.
//! - [`Scenario`](scenario::Scenario): an isolated fixture, image and containers with guaranteed teardown.
//! - [`NameRegistry`](registry::NameRegistry): collision-free image names across parallel scenarios.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use buildproof_runtime::container::RunOptions;
//! use buildproof_sdk::harness::Harness;
//! use buildproof_sdk::scenario::Scenario;
//!
//! # fn main() -> buildproof_common::error::Result<()> {
//! let harness = Arc::new(Harness::from_env()?);
//! let mut scenario = Scenario::new(harness, "tests/testdata/build".as_ref())?;
//! let image = scenario.build(&scenario.request())?;
//! let _ = scenario.serve(image.id.as_str(), RunOptions::new(), 8080, "Hello, World!")?;
//! scenario.teardown()
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod fixture;
pub mod harness;
pub mod registry;
pub mod scenario;
