//! Declarative build requests and their translation into `pack` flags.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use buildproof_common::constants::LAUNCH_ENV_PREFIX;

/// Image pull policy passed to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    /// Use only local images.
    Never,
    /// Always pull builder and run images.
    Always,
    /// Pull only images that are missing locally.
    IfNotPresent,
}

impl PullPolicy {
    /// Flag value understood by `pack`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::IfNotPresent => "if-not-present",
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to build one image.
///
/// Maps are ordered so that two equal requests always render the same
/// command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Image name to build.
    pub name: String,
    /// Application source directory.
    pub source: PathBuf,
    /// Buildpacks in the order they are passed to the builder.
    pub buildpacks: Vec<String>,
    /// Build-time environment.
    pub env: BTreeMap<String, String>,
    /// Launch-time environment, emitted with the `BPE_` prefix.
    pub launch_env: BTreeMap<String, String>,
    /// Pull policy; the builder's default applies when unset.
    pub pull_policy: Option<PullPolicy>,
    /// Discard the build cache before building.
    pub clear_cache: bool,
    /// Builder image override.
    pub builder: Option<String>,
    /// Directory receiving SBOM files.
    pub sbom_dir: Option<PathBuf>,
    /// Disable colored output; the harness default applies when unset.
    pub no_color: Option<bool>,
    /// Volumes mounted into the build containers (`host:container[:mode]`).
    pub volumes: Vec<String>,
    /// Trust the builder to run all lifecycle phases in one container.
    pub trust_builder: bool,
}

impl BuildRequest {
    /// Starts a request for image `name` built from `source`.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            buildpacks: Vec::new(),
            env: BTreeMap::new(),
            launch_env: BTreeMap::new(),
            pull_policy: None,
            clear_cache: false,
            builder: None,
            sbom_dir: None,
            no_color: None,
            volumes: Vec::new(),
            trust_builder: false,
        }
    }

    /// Appends a buildpack.
    #[must_use]
    pub fn buildpack(mut self, buildpack: impl Into<String>) -> Self {
        self.buildpacks.push(buildpack.into());
        self
    }

    /// Replaces the buildpack list.
    #[must_use]
    pub fn buildpacks<I, S>(mut self, buildpacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buildpacks = buildpacks.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a build-time environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Sets a launch-time environment variable.
    #[must_use]
    pub fn launch_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.launch_env.insert(key.into(), value.into());
        self
    }

    /// Sets the pull policy.
    #[must_use]
    pub const fn pull_policy(mut self, policy: PullPolicy) -> Self {
        self.pull_policy = Some(policy);
        self
    }

    /// Requests a build with an empty cache.
    #[must_use]
    pub const fn clear_cache(mut self) -> Self {
        self.clear_cache = true;
        self
    }

    /// Overrides the builder image.
    #[must_use]
    pub fn builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = Some(builder.into());
        self
    }

    /// Writes SBOM files into `dir`.
    #[must_use]
    pub fn sbom_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sbom_dir = Some(dir.into());
        self
    }

    /// Sets whether output is uncolored.
    #[must_use]
    pub const fn no_color(mut self, no_color: bool) -> Self {
        self.no_color = Some(no_color);
        self
    }

    /// Mounts a volume into the build.
    #[must_use]
    pub fn volume(mut self, spec: impl Into<String>) -> Self {
        self.volumes.push(spec.into());
        self
    }

    /// Marks the builder as trusted.
    #[must_use]
    pub const fn trust_builder(mut self) -> Self {
        self.trust_builder = true;
        self
    }

    /// Returns the source directory.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Renders the `pack` arguments.
    ///
    /// The order is fixed: positional arguments, buildpacks in request
    /// order, build env then launch env (each sorted by key), the single
    /// valued flags, volumes in request order, then boolean flags.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            self.name.clone(),
            "--path".to_string(),
            self.source.display().to_string(),
        ];
        for buildpack in &self.buildpacks {
            args.push("--buildpack".into());
            args.push(buildpack.clone());
        }
        for (key, value) in &self.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &self.launch_env {
            args.push("--env".into());
            args.push(format!("{LAUNCH_ENV_PREFIX}{key}={value}"));
        }
        if let Some(policy) = self.pull_policy {
            args.push("--pull-policy".into());
            args.push(policy.as_str().into());
        }
        if let Some(builder) = &self.builder {
            args.push("--builder".into());
            args.push(builder.clone());
        }
        if self.clear_cache {
            args.push("--clear-cache".into());
        }
        if let Some(dir) = &self.sbom_dir {
            args.push("--sbom-output-dir".into());
            args.push(dir.display().to_string());
        }
        for volume in &self.volumes {
            args.push("--volume".into());
            args.push(volume.clone());
        }
        if self.trust_builder {
            args.push("--trust-builder".into());
        }
        if self.no_color.unwrap_or(false) {
            args.push("--no-color".into());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_renders_positional_args() {
        let args = BuildRequest::new("app", "/src/app").args();
        assert_eq!(args, ["build", "app", "--path", "/src/app"]);
    }

    #[test]
    fn full_request_has_fixed_flag_order() {
        let request = BuildRequest::new("app", "/src")
            .buildpack("paketo-buildpacks/go")
            .buildpack("paketo-buildpacks/procfile")
            .env("BP_KEEP_FILES", "key.pem:cert.pem")
            .env("BP_IMAGE_LABELS", "some-label=some-value")
            .launch_env("SOME_VARIABLE", "some-value")
            .pull_policy(PullPolicy::Never)
            .builder("paketobuildpacks/builder-jammy-buildpackless-base")
            .clear_cache()
            .sbom_dir("/tmp/sbom")
            .volume("/bindings:/platform/bindings")
            .trust_builder()
            .no_color(true);
        assert_eq!(
            request.args(),
            [
                "build",
                "app",
                "--path",
                "/src",
                "--buildpack",
                "paketo-buildpacks/go",
                "--buildpack",
                "paketo-buildpacks/procfile",
                "--env",
                "BP_IMAGE_LABELS=some-label=some-value",
                "--env",
                "BP_KEEP_FILES=key.pem:cert.pem",
                "--env",
                "BPE_SOME_VARIABLE=some-value",
                "--pull-policy",
                "never",
                "--builder",
                "paketobuildpacks/builder-jammy-buildpackless-base",
                "--clear-cache",
                "--sbom-output-dir",
                "/tmp/sbom",
                "--volume",
                "/bindings:/platform/bindings",
                "--trust-builder",
                "--no-color",
            ]
        );
    }

    #[test]
    fn equal_requests_render_identically() {
        let a = BuildRequest::new("app", "/src").env("B", "2").env("A", "1");
        let b = BuildRequest::new("app", "/src").env("A", "1").env("B", "2");
        assert_eq!(a, b);
        assert_eq!(a.args(), b.args());
    }

    #[test]
    fn pull_policy_values() {
        assert_eq!(PullPolicy::Never.to_string(), "never");
        assert_eq!(PullPolicy::Always.as_str(), "always");
        assert_eq!(PullPolicy::IfNotPresent.as_str(), "if-not-present");
    }
}
