//! Names of the cache volumes `pack` keeps per image.

use buildproof_common::constants::DEFAULT_REGISTRY_PREFIX;
use sha2::{Digest, Sha256};

/// Suffixes of the volumes pack creates for one image.
const CACHE_KINDS: [&str; 3] = ["build", "launch", "cache"];

/// Returns the cache volume names pack derives for the local image `name`.
///
/// Pack hashes the fully qualified reference and keeps the first six bytes
/// of the digest.
#[must_use]
pub fn cache_volume_names(name: &str) -> Vec<String> {
    let reference = format!("{DEFAULT_REGISTRY_PREFIX}{name}:latest");
    let digest = Sha256::digest(reference.as_bytes());
    let short: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    CACHE_KINDS
        .iter()
        .map(|kind| format!("pack-cache-library_{name}_latest-{short}.{kind}"))
        .collect()
}
