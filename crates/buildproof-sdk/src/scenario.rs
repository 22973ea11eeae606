//! Scenarios: one isolated build-run-probe cycle with guaranteed teardown.
//!
//! Every resource a scenario acquires is pushed onto a stack and released in
//! reverse order, either by [`Scenario::teardown`] or when the scenario is
//! dropped, so an early `?` or a failed assertion never leaks a container,
//! image, cache volume or temporary directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::retry::RetryPolicy;
use buildproof_common::transcript::{LineMatcher, LogTranscript};
use buildproof_common::types::ResourceName;
use buildproof_image::cache::cache_volume_names;
use buildproof_image::pack::BuildResult;
use buildproof_image::reproducible::{self, ReproducibilityReport};
use buildproof_image::request::BuildRequest;
use buildproof_runtime::container::{ContainerHandle, RunOptions};
use buildproof_runtime::probe::{ProbeRequest, ProbeResponse};
use tempfile::TempDir;

use crate::fixture::Fixture;
use crate::harness::Harness;

enum Resource {
    Name(ResourceName),
    CacheVolumes(Vec<String>),
    Fixture(Fixture),
    Directory(TempDir),
    Image(String),
    Container(ContainerHandle),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name {name}"),
            Self::CacheVolumes(names) => write!(f, "cache volumes {}", names.join(", ")),
            Self::Fixture(fixture) => write!(f, "fixture {}", fixture.path().display()),
            Self::Directory(dir) => write!(f, "directory {}", dir.path().display()),
            Self::Image(reference) => write!(f, "image {reference}"),
            Self::Container(handle) => write!(f, "container {}", handle.id.short()),
        }
    }
}

/// An isolated scenario owning its fixture, images and containers.
pub struct Scenario {
    harness: Arc<Harness>,
    name: ResourceName,
    source: PathBuf,
    resources: Vec<Resource>,
    torn_down: bool,
}

impl Scenario {
    /// Allocates a unique name and copies `template` into a private fixture.
    ///
    /// # Errors
    ///
    /// Returns `NameCollision` if no unique name is available, or an error
    /// copying the template.
    pub fn new(harness: Arc<Harness>, template: &Path) -> Result<Self> {
        let name = harness.names().allocate()?;
        let mut scenario = Self {
            harness,
            name: name.clone(),
            source: PathBuf::new(),
            resources: vec![Resource::Name(name.clone())],
            torn_down: false,
        };
        scenario
            .resources
            .push(Resource::CacheVolumes(cache_volume_names(name.as_str())));
        let fixture = Fixture::copy(template)?;
        scenario.source = fixture.path().to_path_buf();
        scenario.resources.push(Resource::Fixture(fixture));
        tracing::info!(name = %name, template = %template.display(), "scenario started");
        Ok(scenario)
    }

    /// Generated image name of this scenario.
    #[must_use]
    pub const fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Root of the private fixture copy.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Harness the scenario runs against.
    #[must_use]
    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Writes a file into the fixture before building.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let fixture = self
            .resources
            .iter()
            .find_map(|r| match r {
                Resource::Fixture(fixture) => Some(fixture),
                _ => None,
            })
            .ok_or_else(|| BuildproofError::NotFound {
                kind: "fixture",
                id: self.name.to_string(),
            })?;
        fixture.write_file(relative, contents)
    }

    /// A build request for this scenario's name and fixture.
    #[must_use]
    pub fn request(&self) -> BuildRequest {
        BuildRequest::new(self.name.as_str(), self.source.clone())
    }

    /// Same as [`Scenario::request`] but building from a fixture subdirectory.
    #[must_use]
    pub fn request_in(&self, subdir: impl AsRef<Path>) -> BuildRequest {
        BuildRequest::new(self.name.as_str(), self.source.join(subdir))
    }

    /// Builds an image; the image is registered for teardown.
    ///
    /// # Errors
    ///
    /// Returns `Build` with the transcript if the build fails.
    pub fn build(&mut self, request: &BuildRequest) -> Result<BuildResult> {
        self.own_image(&request.name);
        let result = self.harness.invoker().build(request)?;
        self.own_image(result.id.as_str());
        Ok(result)
    }

    /// Runs the reproducibility check; the surviving image is registered for
    /// teardown.
    ///
    /// # Errors
    ///
    /// See [`reproducible::assert_reproducible`].
    pub fn reproducible(&mut self, request: &BuildRequest) -> Result<ReproducibilityReport> {
        self.own_image(&request.name);
        let outcome = reproducible::assert_reproducible(self.harness.invoker(), self.harness.runtime(), request);
        match &outcome {
            Ok(report) => self.own_image(report.second.id.as_str()),
            Err(BuildproofError::ReproducibilityViolation { first, second }) => {
                self.own_image(first);
                self.own_image(second);
            }
            Err(_) => {}
        }
        outcome
    }

    /// Starts a container; it is registered for teardown.
    ///
    /// # Errors
    ///
    /// Returns `Runtime` or `PortResolutionTimeout` if the container cannot
    /// be started with every port bound.
    pub fn run(&mut self, image: &str, options: &RunOptions) -> Result<ContainerHandle> {
        let handle = self.harness.containers().run(image, options)?;
        self.resources.push(Resource::Container(handle.clone()));
        Ok(handle)
    }

    /// Starts a container publishing `port` (with `PORT` set to it) and
    /// waits until it serves a body containing `text`.
    ///
    /// # Errors
    ///
    /// Returns the start error or `ProbeTimeout`.
    pub fn serve(
        &mut self,
        image: &str,
        options: RunOptions,
        port: u16,
        text: &str,
    ) -> Result<(ContainerHandle, ProbeResponse)> {
        let options = options.env("PORT", port.to_string()).publish(port);
        let handle = self.run(image, &options)?;
        let response = self.harness.probe().serve(&handle, port, text)?;
        Ok((handle, response))
    }

    /// Polls a probe with the harness default policy.
    ///
    /// # Errors
    ///
    /// Returns `ProbeTimeout` if the predicate never holds.
    pub fn probe(&self, request: &ProbeRequest) -> Result<ProbeResponse> {
        self.harness.probe().poll(request)
    }

    /// Polls a probe with an explicit policy.
    ///
    /// # Errors
    ///
    /// Returns `ProbeTimeout` if the predicate never holds.
    pub fn probe_with(&self, request: &ProbeRequest, policy: &RetryPolicy) -> Result<ProbeResponse> {
        self.harness.probe().poll_with(request, policy)
    }

    /// Creates a world-writable directory for SBOM output; it is deleted at
    /// teardown.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created.
    pub fn sbom_dir(&mut self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("buildproof-sbom-")
            .tempdir()
            .map_err(|e| BuildproofError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777)).map_err(|e| {
                BuildproofError::Io {
                    path: dir.path().to_path_buf(),
                    source: e,
                }
            })?;
        }
        let path = dir.path().to_path_buf();
        self.resources.push(Resource::Directory(dir));
        Ok(path)
    }

    /// Current logs of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if logs cannot be fetched.
    pub fn logs(&self, handle: &ContainerHandle) -> Result<LogTranscript> {
        self.harness.containers().logs(handle)
    }

    /// Waits for a container log line with the harness default policy.
    ///
    /// # Errors
    ///
    /// Returns `LogWaitTimeout` if the line never appears.
    pub fn wait_for_logs(&self, handle: &ContainerHandle, matcher: &LineMatcher) -> Result<LogTranscript> {
        self.harness
            .containers()
            .wait_for_logs(handle, matcher, &self.harness.config().poll)
    }

    /// Pulls a shared image. Pulled images are not owned by the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    pub fn pull(&self, image: &str) -> Result<()> {
        self.harness.runtime().pull(image)
    }

    /// Releases every resource in reverse acquisition order.
    ///
    /// All resources are attempted even if some fail.
    ///
    /// # Errors
    ///
    /// Returns `Runtime` listing every resource that could not be released.
    pub fn teardown(mut self) -> Result<()> {
        let failures = self.release();
        if failures.is_empty() {
            return Ok(());
        }
        Err(BuildproofError::Runtime {
            operation: format!("tear down scenario {}", self.name),
            output: failures.join("\n"),
        })
    }

    fn own_image(&mut self, reference: &str) {
        let owned = self
            .resources
            .iter()
            .any(|r| matches!(r, Resource::Image(existing) if existing == reference));
        if !owned {
            self.resources.push(Resource::Image(reference.to_string()));
        }
    }

    fn release(&mut self) -> Vec<String> {
        self.torn_down = true;
        let mut failures = Vec::new();
        while let Some(resource) = self.resources.pop() {
            let description = resource.to_string();
            if let Err(e) = self.release_one(resource) {
                failures.push(format!("{description}: {e}"));
            }
        }
        tracing::info!(name = %self.name, failures = failures.len(), "scenario torn down");
        failures
    }

    fn release_one(&self, resource: Resource) -> Result<()> {
        match resource {
            Resource::Container(mut handle) => self.harness.containers().remove(&mut handle),
            Resource::Image(reference) => self.harness.runtime().remove_image(&reference),
            Resource::Directory(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|e| BuildproofError::Io { path, source: e })
            }
            Resource::Fixture(fixture) => fixture.close(),
            Resource::CacheVolumes(names) => self.harness.runtime().remove_volumes(&names),
            Resource::Name(name) => {
                let _ = self.harness.names().release(&name);
                Ok(())
            }
        }
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        for failure in self.release() {
            tracing::warn!(name = %self.name, failure = %failure, "teardown failed");
        }
    }
}
