//! Reproducibility checking: the same input must yield the same image.

use buildproof_common::error::{BuildproofError, Result};
use buildproof_common::types::ImageId;
use buildproof_runtime::backend::ContainerRuntime;

use crate::cache::cache_volume_names;
use crate::pack::{BuildInvoker, BuildResult};
use crate::request::BuildRequest;

/// Both builds of a successful reproducibility check.
#[derive(Debug, Clone, PartialEq)]
pub struct ReproducibilityReport {
    /// Identity of the first build, whose image has been removed.
    pub first: ImageId,
    /// The rebuild, still present in the runtime.
    pub second: BuildResult,
}

/// Builds `request` twice with a full cache wipe in between and checks the
/// identities match.
///
/// Between the builds the first image and every cache volume pack keeps for
/// the image name are removed, and the rebuild runs with `--clear-cache`, so
/// no layer can be reused.
///
/// # Errors
///
/// Returns the build or removal error that interrupted the check, or
/// `ReproducibilityViolation` when the identities differ. On a violation the
/// second image is still present and must be removed by the caller.
pub fn assert_reproducible(
    invoker: &BuildInvoker,
    runtime: &dyn ContainerRuntime,
    request: &BuildRequest,
) -> Result<ReproducibilityReport> {
    let first = invoker.build(request)?;
    tracing::info!(image = %request.name, id = %first.id, "first build complete, clearing image and cache");

    runtime.remove_image(first.id.as_str())?;
    runtime.remove_volumes(&cache_volume_names(&request.name))?;

    let second = invoker.build(&request.clone().clear_cache())?;
    if second.id != first.id {
        return Err(BuildproofError::ReproducibilityViolation {
            first: first.id.to_string(),
            second: second.id.to_string(),
        });
    }
    tracing::info!(image = %request.name, id = %second.id, "build is reproducible");
    Ok(ReproducibilityReport {
        first: first.id,
        second,
    })
}
