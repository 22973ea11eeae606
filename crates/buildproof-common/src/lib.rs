//! # buildproof-common
//!
//! Shared types, error definitions, configuration, log transcripts and the
//! bounded-retry primitive used across the entire buildproof workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod retry;
pub mod transcript;
pub mod types;
