//! Verification of files a build emits as a side effect.
//!
//! SBOMs are written as
//! `<dir>/sbom/<phase>/<component>/[<target>/]sbom.<format>.json`, where the
//! component is the buildpack id with `/` replaced by `_`. A missing or empty
//! artifact is always a failure.

use std::fmt;
use std::path::{Path, PathBuf};

use buildproof_common::error::{BuildproofError, Result};

/// Lifecycle phase an SBOM describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbomPhase {
    /// Dependencies available while building.
    Build,
    /// Dependencies shipped in the final image.
    Launch,
}

impl SbomPhase {
    /// Directory name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Launch => "launch",
        }
    }
}

/// SBOM serialization formats emitted for every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbomFormat {
    /// CycloneDX JSON.
    CycloneDx,
    /// SPDX JSON.
    Spdx,
    /// Syft native JSON.
    Syft,
}

impl SbomFormat {
    /// All formats.
    pub const ALL: [Self; 3] = [Self::CycloneDx, Self::Spdx, Self::Syft];

    /// File name used for the format.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::CycloneDx => "sbom.cdx.json",
            Self::Spdx => "sbom.spdx.json",
            Self::Syft => "sbom.syft.json",
        }
    }
}

/// Where a buildpack's SBOM files live inside an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbomLocation {
    /// Lifecycle phase.
    pub phase: SbomPhase,
    /// Buildpack id, e.g. `paketo-buildpacks/go-dist`.
    pub component: String,
    /// Layer or target directory below the component, if any.
    pub target: Option<String>,
}

impl SbomLocation {
    /// Location for a whole component.
    #[must_use]
    pub fn new(phase: SbomPhase, component: impl Into<String>) -> Self {
        Self {
            phase,
            component: component.into(),
            target: None,
        }
    }

    /// Narrows the location to a target directory.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Directory holding the files, relative to the output directory.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::from("sbom")
            .join(self.phase.as_str())
            .join(self.component.replace('/', "_"));
        if let Some(target) = &self.target {
            dir.push(target);
        }
        dir
    }

    /// Relative path of one format's file.
    #[must_use]
    pub fn file(&self, format: SbomFormat) -> PathBuf {
        self.relative_dir().join(format.file_name())
    }
}

impl fmt::Display for SbomLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_dir().display())
    }
}

/// Asserts that each relative path exists below `dir` as a non-empty file.
///
/// # Errors
///
/// Returns `ArtifactMissing` for the first absent path or
/// `ArtifactMismatch` if it is not a regular, non-empty file.
pub fn assert_artifacts<P: AsRef<Path>>(dir: &Path, expected: &[P]) -> Result<()> {
    for relative in expected {
        assert_regular_non_empty(&dir.join(relative))?;
    }
    tracing::debug!(dir = %dir.display(), count = expected.len(), "artifacts present");
    Ok(())
}

fn assert_regular_non_empty(path: &Path) -> Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BuildproofError::ArtifactMissing {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(BuildproofError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    if !metadata.is_file() {
        return Err(BuildproofError::ArtifactMismatch {
            path: path.to_path_buf(),
            message: "not a regular file".into(),
        });
    }
    if metadata.len() == 0 {
        return Err(BuildproofError::ArtifactMismatch {
            path: path.to_path_buf(),
            message: "file is empty".into(),
        });
    }
    Ok(())
}

/// Asserts that the file at `path` contains `needle`.
///
/// # Errors
///
/// Returns `ArtifactMissing` if the file is absent or `ArtifactMismatch` if
/// the text does not occur in it.
pub fn assert_contains(path: &Path, needle: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildproofError::ArtifactMissing {
            path: path.to_path_buf(),
        },
        _ => BuildproofError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if content.contains(needle) {
        Ok(())
    } else {
        Err(BuildproofError::ArtifactMismatch {
            path: path.to_path_buf(),
            message: format!("does not contain {needle:?}"),
        })
    }
}

/// Asserts that `dir` exists and has at least one entry.
///
/// # Errors
///
/// Returns `ArtifactMissing` if the directory is absent or
/// `ArtifactMismatch` if it is empty or not a directory.
pub fn assert_non_empty_dir(dir: &Path) -> Result<()> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BuildproofError::ArtifactMissing {
            path: dir.to_path_buf(),
        },
        _ => BuildproofError::ArtifactMismatch {
            path: dir.to_path_buf(),
            message: e.to_string(),
        },
    })?;
    if entries.next().is_none() {
        return Err(BuildproofError::ArtifactMismatch {
            path: dir.to_path_buf(),
            message: "directory is empty".into(),
        });
    }
    Ok(())
}

/// Asserts that every SBOM format exists as a non-empty file at `location`.
///
/// # Errors
///
/// See [`assert_artifacts`].
pub fn assert_sbom(dir: &Path, location: &SbomLocation) -> Result<()> {
    let files: Vec<PathBuf> = SbomFormat::ALL.iter().map(|f| location.file(*f)).collect();
    assert_artifacts(dir, &files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sbom(dir: &Path, location: &SbomLocation, content: &str) {
        let target = dir.join(location.relative_dir());
        std::fs::create_dir_all(&target).expect("mkdir");
        for format in SbomFormat::ALL {
            std::fs::write(target.join(format.file_name()), content).expect("write");
        }
    }

    #[test]
    fn location_layout() {
        let location = SbomLocation::new(SbomPhase::Launch, "paketo-buildpacks/go-build").target("targets");
        assert_eq!(
            location.file(SbomFormat::Spdx),
            Path::new("sbom/launch/paketo-buildpacks_go-build/targets/sbom.spdx.json")
        );
        let build = SbomLocation::new(SbomPhase::Build, "paketo-buildpacks/go-dist");
        assert_eq!(build.to_string(), "sbom/build/paketo-buildpacks_go-dist");
    }

    #[test]
    fn complete_sbom_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = SbomLocation::new(SbomPhase::Build, "paketo-buildpacks/go-dist").target("go");
        write_sbom(dir.path(), &location, r#"{"name": "go"}"#);
        assert_sbom(dir.path(), &location).expect("all formats present");
        assert_non_empty_dir(&dir.path().join("sbom")).expect("non-empty");
    }

    #[test]
    fn missing_format_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = SbomLocation::new(SbomPhase::Launch, "paketo-buildpacks/go-build");
        write_sbom(dir.path(), &location, "{}");
        std::fs::remove_file(dir.path().join(location.file(SbomFormat::Syft))).expect("rm");
        match assert_sbom(dir.path(), &location) {
            Err(BuildproofError::ArtifactMissing { path }) => assert!(path.ends_with("sbom.syft.json")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_a_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let location = SbomLocation::new(SbomPhase::Build, "x/y");
        write_sbom(dir.path(), &location, "");
        assert!(matches!(
            assert_sbom(dir.path(), &location),
            Err(BuildproofError::ArtifactMismatch { .. })
        ));
    }

    #[test]
    fn directory_in_place_of_file_is_a_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("sbom.cdx.json")).expect("mkdir");
        assert!(matches!(
            assert_artifacts(dir.path(), &["sbom.cdx.json"]),
            Err(BuildproofError::ArtifactMismatch { .. })
        ));
    }

    #[test]
    fn content_assertion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("sbom.cdx.json");
        std::fs::write(&file, r#"{"components": [{"name": "github.com/gorilla/mux"}]}"#).expect("write");
        assert_contains(&file, r#""name": "github.com/gorilla/mux""#).expect("present");
        assert!(matches!(
            assert_contains(&file, "github.com/sirupsen/logrus"),
            Err(BuildproofError::ArtifactMismatch { .. })
        ));
        assert!(matches!(
            assert_contains(&dir.path().join("absent.json"), "x"),
            Err(BuildproofError::ArtifactMissing { .. })
        ));
    }

    #[test]
    fn empty_or_absent_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            assert_non_empty_dir(dir.path()),
            Err(BuildproofError::ArtifactMismatch { .. })
        ));
        assert!(matches!(
            assert_non_empty_dir(&dir.path().join("nope")),
            Err(BuildproofError::ArtifactMissing { .. })
        ));
    }
}
