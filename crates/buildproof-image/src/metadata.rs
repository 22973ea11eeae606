//! Buildpack metadata recorded on built images.
//!
//! The lifecycle stores a JSON document under
//! `io.buildpacks.lifecycle.metadata` describing every buildpack that
//! contributed to the image and the layers it created.

use std::collections::BTreeMap;

use buildproof_common::error::{BuildproofError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One layer contributed by a buildpack.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerMetadata {
    /// Layer digest.
    #[serde(default)]
    pub sha: Option<String>,
    /// Available during subsequent build steps.
    #[serde(default)]
    pub build: bool,
    /// Present in the final image.
    #[serde(default)]
    pub launch: bool,
    /// Kept in the build cache.
    #[serde(default)]
    pub cache: bool,
    /// Buildpack-defined metadata for the layer.
    #[serde(default, rename = "data")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A buildpack that took part in the build.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentDescriptor {
    /// Buildpack identifier, e.g. `paketo-buildpacks/go-build`.
    pub key: String,
    /// Buildpack version.
    #[serde(default)]
    pub version: String,
    /// Layers keyed by name.
    #[serde(default)]
    pub layers: BTreeMap<String, LayerMetadata>,
}

impl ComponentDescriptor {
    /// Looks up a layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&LayerMetadata> {
        self.layers.get(name)
    }
}

#[derive(Deserialize)]
struct LifecycleMetadata {
    #[serde(default)]
    buildpacks: Vec<ComponentDescriptor>,
}

/// Parses the lifecycle metadata label into ordered component descriptors.
///
/// # Errors
///
/// Returns `Serialization` if the label is not valid lifecycle JSON.
pub fn parse_lifecycle_label(raw: &str) -> Result<Vec<ComponentDescriptor>> {
    let metadata: LifecycleMetadata = serde_json::from_str(raw)?;
    Ok(metadata.buildpacks)
}

/// Parses an RFC 3339 image creation timestamp.
///
/// # Errors
///
/// Returns `Config` if the timestamp is malformed.
pub fn parse_created(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BuildproofError::Config {
            message: format!("invalid image creation time {raw:?}: {e}"),
        })
}
