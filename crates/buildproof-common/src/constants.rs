//! System-wide constants and defaults.

/// Default image builder CLI.
pub const DEFAULT_PACK_BINARY: &str = "pack";

/// Default container runtime CLI.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Prefix of generated image and cache volume names.
pub const NAME_PREFIX: &str = "buildproof";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Default budget for every polling operation, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;

/// Default delay between polling attempts, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default budget for resolving a published port, in milliseconds.
pub const DEFAULT_PORT_TIMEOUT_MS: u64 = 10_000;

/// Host used to reach published container ports.
pub const DEFAULT_PROBE_HOST: &str = "localhost";

/// Image label holding the lifecycle's buildpack metadata.
pub const LIFECYCLE_METADATA_LABEL: &str = "io.buildpacks.lifecycle.metadata";

/// Build env prefix the environment-variables buildpack turns into launch env.
pub const LAUNCH_ENV_PREFIX: &str = "BPE_";

/// Registry prefix pack uses when deriving cache volume names.
pub const DEFAULT_REGISTRY_PREFIX: &str = "index.docker.io/library/";

/// Environment variable overriding the pack binary.
pub const ENV_PACK: &str = "BUILDPROOF_PACK";
/// Environment variable overriding the docker binary.
pub const ENV_DOCKER: &str = "BUILDPROOF_DOCKER";
/// Environment variable listing default buildpacks (comma separated).
pub const ENV_BUILDPACKS: &str = "BUILDPROOF_BUILDPACKS";
/// Environment variable selecting the default builder image.
pub const ENV_BUILDER: &str = "BUILDPROOF_BUILDER";
/// Environment variable overriding the polling budget in seconds.
pub const ENV_TIMEOUT_SECS: &str = "BUILDPROOF_TIMEOUT_SECS";
