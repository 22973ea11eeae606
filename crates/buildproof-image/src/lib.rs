//! # buildproof-image
//!
//! Image builds through `pack` and verification of what they produce.
//!
//! Handles:
//! - **Requests**: declarative build options rendered as deterministic flags.
//! - **Invocation**: running the builder and inspecting the built image.
//! - **Metadata**: buildpack layers recorded in the lifecycle label.
//! - **Cache**: pack's per-image cache volume names.
//! - **Reproducibility**: rebuilding from a wiped cache and comparing identities.
//! - **SBOM**: emitted artifact layout and content checks.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod cache;
pub mod metadata;
pub mod pack;
pub mod reproducible;
pub mod request;
pub mod sbom;
