//! The harness: one set of collaborators shared by every scenario.
//!
//! A test binary builds a single [`Harness`] from its configuration and hands
//! an `Arc` of it to each scenario. Nothing is resolved lazily from global
//! state.

use std::sync::Arc;

use buildproof_common::config::HarnessConfig;
use buildproof_common::error::Result;
use buildproof_image::pack::{BuildDefaults, BuildInvoker};
use buildproof_runtime::backend::ContainerRuntime;
use buildproof_runtime::backend::docker::DockerCli;
use buildproof_runtime::engine::ContainerManager;
use buildproof_runtime::probe::NetworkProbe;
use buildproof_runtime::process::{self, Executor, SystemExecutor};

use crate::registry::NameRegistry;

/// Shared collaborators for scenarios.
pub struct Harness {
    config: HarnessConfig,
    runtime: Arc<dyn ContainerRuntime>,
    invoker: BuildInvoker,
    containers: ContainerManager,
    probe: NetworkProbe,
    names: NameRegistry,
}

impl Harness {
    /// Builds a harness that runs the real `pack` and `docker` binaries.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either binary cannot be located.
    pub fn new(mut config: HarnessConfig) -> Result<Self> {
        config.pack_binary = process::locate(&config.pack_binary)?;
        config.docker_binary = process::locate(&config.docker_binary)?;
        tracing::info!(
            pack = %config.pack_binary.display(),
            docker = %config.docker_binary.display(),
            "harness initialized"
        );
        Ok(Self::with_executor(config, Arc::new(SystemExecutor)))
    }

    /// Builds a harness whose external commands go through `executor`.
    #[must_use]
    pub fn with_executor(config: HarnessConfig, executor: Arc<dyn Executor>) -> Self {
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerCli::new(Arc::clone(&executor), config.docker_binary.clone()));
        let invoker = BuildInvoker::new(executor, config.pack_binary.clone(), Arc::clone(&runtime))
            .with_defaults(BuildDefaults::from(&config));
        let containers = ContainerManager::new(Arc::clone(&runtime), config.port_timeout)
            .with_port_policy(config.poll.with_timeout(config.port_timeout));
        let probe = NetworkProbe::new(config.probe_host.clone(), config.poll);
        Self {
            config,
            runtime,
            invoker,
            containers,
            probe,
            names: NameRegistry::new(),
        }
    }

    /// Builds a harness from defaults overlaid with `BUILDPROOF_*` variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is malformed or a binary is missing.
    pub fn from_env() -> Result<Self> {
        Self::new(HarnessConfig::from_env()?)
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Container runtime client.
    #[must_use]
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Build invoker.
    #[must_use]
    pub const fn invoker(&self) -> &BuildInvoker {
        &self.invoker
    }

    /// Container lifecycle manager.
    #[must_use]
    pub const fn containers(&self) -> &ContainerManager {
        &self.containers
    }

    /// Network probe.
    #[must_use]
    pub const fn probe(&self) -> &NetworkProbe {
        &self.probe
    }

    /// Registry of names held by live scenarios.
    #[must_use]
    pub const fn names(&self) -> &NameRegistry {
        &self.names
    }

    /// Returns whether the container runtime answers.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.runtime.is_available()
    }
}

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Verbosity follows `RUST_LOG`. Calling this more than once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
