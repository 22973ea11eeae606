//! Docker CLI implementation of [`ContainerRuntime`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::types::{ContainerId, ImageId};
use serde::Deserialize;

use super::{ContainerInfo, ContainerRuntime, ImageInfo, is_not_found};
use crate::container::RunOptions;
use crate::process::{Executor, Invocation};

/// Runtime backed by the `docker` command-line client.
pub struct DockerCli {
    executor: Arc<dyn Executor>,
    binary: PathBuf,
}

impl DockerCli {
    /// Creates a client that runs `binary` through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, binary: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(self.binary.clone()).args(args)
    }

    /// Runs a removal command, treating "no such ..." as success.
    fn remove(&self, invocation: &Invocation, what: &str) -> Result<()> {
        match self.executor.execute(invocation) {
            Ok(_) => Ok(()),
            Err(BuildproofError::Process { output, .. }) if is_not_found(&output) => {
                tracing::debug!(what, "already removed");
                Ok(())
            }
            Err(BuildproofError::Process { output, .. }) => Err(BuildproofError::Runtime {
                operation: format!("remove {what}"),
                output,
            }),
            Err(e) => Err(e),
        }
    }
}

/// Renders the `docker container run` arguments for `image` and `options`.
#[must_use]
pub fn run_args(image: &str, options: &RunOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["container".into(), "run".into(), "--detach".into()];
    if let Some(entrypoint) = &options.entrypoint {
        args.extend(["--entrypoint".into(), entrypoint.clone()]);
    }
    for (key, value) in &options.env {
        args.extend(["--env".into(), format!("{key}={value}")]);
    }
    for port in &options.publish {
        args.extend(["--publish".into(), port.to_string()]);
    }
    if options.publish_all {
        args.push("--publish-all".into());
    }
    for volume in &options.volumes {
        args.extend(["--volume".into(), volume.clone()]);
    }
    args.push(image.to_string());
    args.extend(options.command.iter().cloned());
    args
}

impl ContainerRuntime for DockerCli {
    fn run(&self, image: &str, options: &RunOptions) -> Result<ContainerId> {
        let invocation = self.invocation(run_args(image, options));
        let output = self.executor.execute(&invocation).map_err(|e| match e {
            BuildproofError::Process { output, .. } => BuildproofError::Runtime {
                operation: format!("run {image}"),
                output,
            },
            other => other,
        })?;

        let id = container_id_line(&output).ok_or_else(|| BuildproofError::Runtime {
            operation: format!("run {image}"),
            output: format!("runtime returned no container id:\n{output}"),
        })?;
        let id = ContainerId::new(id);
        tracing::info!(id = %id.short(), image, "container started");
        Ok(id)
    }

    fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo> {
        let invocation = self.invocation(["container", "inspect", id.as_str()]);
        let output = self.executor.execute(&invocation).map_err(|e| match e {
            BuildproofError::Process { output, .. } if is_not_found(&output) => BuildproofError::NotFound {
                kind: "container",
                id: id.to_string(),
            },
            other => other,
        })?;
        parse_container_inspect(&output, id)
    }

    fn logs(&self, id: &ContainerId) -> Result<String> {
        self.executor
            .execute(&self.invocation(["container", "logs", id.as_str()]))
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let invocation = self.invocation(["container", "rm", "--force", "--volumes", id.as_str()]);
        self.remove(&invocation, &format!("container {}", id.short()))?;
        tracing::info!(id = %id.short(), "container removed");
        Ok(())
    }

    fn inspect_image(&self, reference: &str) -> Result<ImageInfo> {
        let invocation = self.invocation(["image", "inspect", reference]);
        let output = self.executor.execute(&invocation).map_err(|e| match e {
            BuildproofError::Process { output, .. } if is_not_found(&output) => BuildproofError::NotFound {
                kind: "image",
                id: reference.to_string(),
            },
            other => other,
        })?;
        parse_image_inspect(&output, reference)
    }

    fn remove_image(&self, reference: &str) -> Result<()> {
        let invocation = self.invocation(["image", "rm", "--force", reference]);
        self.remove(&invocation, &format!("image {reference}"))?;
        tracing::info!(image = reference, "image removed");
        Ok(())
    }

    fn remove_volumes(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let invocation = self
            .invocation(["volume", "rm", "--force"])
            .args(names.iter().cloned());
        self.remove(&invocation, &format!("volumes {}", names.join(", ")))?;
        tracing::info!(volumes = ?names, "volumes removed");
        Ok(())
    }

    fn pull(&self, image: &str) -> Result<()> {
        tracing::info!(image, "pulling image");
        let _ = self.executor.execute(&self.invocation(["pull", image]))?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.executor
            .execute(&self.invocation(["version", "--format", "{{.Server.Version}}"]))
            .is_ok()
    }
}

/// Finds the container id in `run` output.
///
/// Output interleaves stdout and stderr, so pull progress or warnings may
/// follow the id. Only an all-hex line qualifies.
fn container_id_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContainer {
    state: RawState,
    network_settings: RawNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawState {
    status: String,
    running: bool,
    #[serde(default)]
    exit_code: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNetworkSettings {
    #[serde(default)]
    ports: Option<BTreeMap<String, Option<Vec<RawPortBinding>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPortBinding {
    #[serde(default)]
    host_port: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawImage {
    id: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    config: Option<RawImageConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawImageConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

fn parse_container_inspect(output: &str, id: &ContainerId) -> Result<ContainerInfo> {
    let raw: Vec<RawContainer> = serde_json::from_str(output)?;
    let container = raw.into_iter().next().ok_or_else(|| BuildproofError::NotFound {
        kind: "container",
        id: id.to_string(),
    })?;

    let mut ports = BTreeMap::new();
    for (key, bindings) in container.network_settings.ports.unwrap_or_default() {
        let Some(port) = key.strip_suffix("/tcp").and_then(|p| p.parse::<u16>().ok()) else {
            continue;
        };
        let host = bindings
            .unwrap_or_default()
            .iter()
            .find_map(|b| b.host_port.parse::<u16>().ok());
        if let Some(host) = host {
            let _ = ports.insert(port, host);
        }
    }

    Ok(ContainerInfo {
        status: container.state.status,
        running: container.state.running,
        exit_code: container.state.exit_code,
        ports,
    })
}

fn parse_image_inspect(output: &str, reference: &str) -> Result<ImageInfo> {
    let raw: Vec<RawImage> = serde_json::from_str(output)?;
    let image = raw.into_iter().next().ok_or_else(|| BuildproofError::NotFound {
        kind: "image",
        id: reference.to_string(),
    })?;
    Ok(ImageInfo {
        id: ImageId::parse(&image.id)?,
        labels: image.config.and_then(|c| c.labels).unwrap_or_default(),
        created: image.created,
    })
}
