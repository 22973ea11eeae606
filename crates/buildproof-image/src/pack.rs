//! Build invoker driving the `pack` CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use buildproof_common::config::HarnessConfig;
use buildproof_common::constants::LIFECYCLE_METADATA_LABEL;
use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::transcript::LogTranscript;
use buildproof_common::types::ImageId;
use buildproof_runtime::backend::ContainerRuntime;
use buildproof_runtime::process::{Executor, Invocation};
use chrono::{DateTime, Utc};

use crate::metadata::{self, ComponentDescriptor};
use crate::request::BuildRequest;

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    /// Content-derived image identity.
    pub id: ImageId,
    /// Name the image was built under.
    pub name: String,
    /// Buildpacks that contributed to the image, in build order.
    pub components: Vec<ComponentDescriptor>,
    /// Image labels.
    pub labels: BTreeMap<String, String>,
    /// Image creation time, when reported.
    pub created: Option<DateTime<Utc>>,
    /// Builder output.
    pub transcript: LogTranscript,
}

impl BuildResult {
    /// Looks up a component by buildpack key.
    #[must_use]
    pub fn component(&self, key: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.key == key)
    }
}

/// Values applied to requests that leave them unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildDefaults {
    /// Buildpacks used when a request names none.
    pub buildpacks: Vec<String>,
    /// Builder used when a request does not override it.
    pub builder: Option<String>,
    /// Colorless output unless a request says otherwise.
    pub no_color: bool,
}

impl From<&HarnessConfig> for BuildDefaults {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            buildpacks: config.buildpacks.clone(),
            builder: config.builder.clone(),
            no_color: config.no_color,
        }
    }
}

/// Builds images and resolves what was built.
pub struct BuildInvoker {
    executor: Arc<dyn Executor>,
    pack_binary: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    defaults: BuildDefaults,
}

impl BuildInvoker {
    /// Creates an invoker running `pack_binary` and inspecting results
    /// through `runtime`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, pack_binary: impl Into<PathBuf>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            executor,
            pack_binary: pack_binary.into(),
            runtime,
            defaults: BuildDefaults::default(),
        }
    }

    /// Sets the defaults merged into every request.
    #[must_use]
    pub fn with_defaults(mut self, defaults: BuildDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Returns the runtime used for post-build inspection.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Fills unset request fields from the defaults.
    #[must_use]
    pub fn resolve(&self, request: &BuildRequest) -> BuildRequest {
        let mut resolved = request.clone();
        if resolved.buildpacks.is_empty() {
            resolved.buildpacks.clone_from(&self.defaults.buildpacks);
        }
        if resolved.builder.is_none() {
            resolved.builder.clone_from(&self.defaults.builder);
        }
        if resolved.no_color.is_none() {
            resolved.no_color = Some(self.defaults.no_color);
        }
        resolved
    }

    /// Renders the process invocation for `request`.
    #[must_use]
    pub fn invocation(&self, request: &BuildRequest) -> Invocation {
        Invocation::new(self.pack_binary.clone()).args(self.resolve(request).args())
    }

    /// Builds the image and inspects the result.
    ///
    /// # Errors
    ///
    /// Returns `Build` with the transcript attached if the builder fails or
    /// the built image cannot be inspected.
    pub fn build(&self, request: &BuildRequest) -> Result<BuildResult> {
        let invocation = self.invocation(request);
        tracing::info!(
            image = %request.name,
            source = %request.source.display(),
            clear_cache = request.clear_cache,
            "building image"
        );

        let output = self.executor.execute(&invocation).map_err(|e| match e {
            BuildproofError::Process { exit_code, output, .. } => BuildproofError::Build {
                image: request.name.clone(),
                reason: format!("pack exited with status {exit_code}"),
                transcript: LogTranscript::from_output(&output).to_string(),
            },
            other => BuildproofError::Build {
                image: request.name.clone(),
                reason: other.to_string(),
                transcript: String::new(),
            },
        })?;
        let transcript = LogTranscript::from_output(&output);

        let inspect_failure = |reason: String| BuildproofError::Build {
            image: request.name.clone(),
            reason,
            transcript: transcript.to_string(),
        };
        let info = self
            .runtime
            .inspect_image(&request.name)
            .map_err(|e| inspect_failure(format!("could not inspect built image: {e}")))?;
        let components = match info.labels.get(LIFECYCLE_METADATA_LABEL) {
            Some(raw) => metadata::parse_lifecycle_label(raw)
                .map_err(|e| inspect_failure(format!("unreadable lifecycle metadata: {e}")))?,
            None => Vec::new(),
        };
        let created = info
            .created
            .as_deref()
            .map(metadata::parse_created)
            .transpose()
            .map_err(|e| inspect_failure(e.to_string()))?;

        tracing::info!(image = %request.name, id = %info.id, components = components.len(), "image built");
        Ok(BuildResult {
            id: info.id,
            name: request.name.clone(),
            components,
            labels: info.labels,
            created,
            transcript,
        })
    }
}
