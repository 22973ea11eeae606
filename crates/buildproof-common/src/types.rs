//! Domain primitive types used across the buildproof workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{NAME_PREFIX, SHA256_HEX_LENGTH};
use crate::error::{BuildproofError, Result};

/// Identifier of a container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 12-character short form used in runtime output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-derived identity of a built image (`sha256:<hex>`).
///
/// Two builds of the same source and configuration must produce equal
/// identities; this type is the token compared by reproducibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Parses an image identity reported by the runtime.
    ///
    /// Accepts both `sha256:<hex>` and bare 64-character hex digests and
    /// normalizes to the prefixed form.
    ///
    /// # Errors
    ///
    /// Returns an error if the digest is not a valid SHA-256 hex string.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let hex = raw.strip_prefix("sha256:").unwrap_or(raw);
        if hex.len() != SHA256_HEX_LENGTH || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BuildproofError::Config {
                message: format!("invalid image identity: {raw:?}"),
            });
        }
        Ok(Self(format!("sha256:{}", hex.to_ascii_lowercase())))
    }

    /// Returns the prefixed identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the hex digest without the algorithm prefix.
    #[must_use]
    pub fn digest(&self) -> &str {
        self.0.strip_prefix("sha256:").unwrap_or(&self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique name for a scenario's image and cache volumes.
///
/// Names are lowercase so they are valid image references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName(String);

impl ResourceName {
    /// Wraps an existing name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a random name.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{NAME_PREFIX}-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn image_id_accepts_prefixed_and_bare() {
        let a = ImageId::parse(&format!("sha256:{DIGEST}")).expect("prefixed");
        let b = ImageId::parse(DIGEST).expect("bare");
        assert_eq!(a, b);
        assert_eq!(a.digest(), DIGEST);
    }

    #[test]
    fn image_id_rejects_garbage() {
        assert!(ImageId::parse("sha256:abc").is_err());
        assert!(ImageId::parse("").is_err());
    }

    #[test]
    fn generated_names_are_distinct_and_lowercase() {
        let a = ResourceName::generate();
        let b = ResourceName::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(NAME_PREFIX));
        assert_eq!(a.as_str(), a.as_str().to_lowercase());
    }

    #[test]
    fn container_short_id() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }
}
