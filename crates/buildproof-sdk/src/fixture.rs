//! Isolated copies of fixture source trees.

use std::path::{Path, PathBuf};

use buildproof_common::error::{BuildproofError, Result};
use tempfile::TempDir;

/// A private, mutable copy of a template source tree.
///
/// The copy lives in a temporary directory that is deleted when the fixture
/// is closed or dropped.
#[derive(Debug)]
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Copies `template` into a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the template is not a directory, or `Io` if the
    /// copy fails.
    pub fn copy(template: &Path) -> Result<Self> {
        if !template.is_dir() {
            return Err(BuildproofError::NotFound {
                kind: "fixture template",
                id: template.display().to_string(),
            });
        }
        let dir = tempfile::Builder::new()
            .prefix("buildproof-fixture-")
            .tempdir()
            .map_err(|e| io_error(&std::env::temp_dir(), e))?;
        copy_tree(template, dir.path())?;
        tracing::debug!(template = %template.display(), path = %dir.path().display(), "fixture copied");
        Ok(Self { dir })
    }

    /// Root of the copy.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Resolves a path inside the copy.
    #[must_use]
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Writes a file into the copy, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::write(&path, contents).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    /// Deletes the copy.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be removed.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| io_error(&path, e))
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let entries = std::fs::read_dir(from).map_err(|e| io_error(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_error(&source, e))?;
        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| io_error(&target, e))?;
            copy_tree(&source, &target)?;
        } else {
            let _ = std::fs::copy(&source, &target).map_err(|e| io_error(&source, e))?;
        }
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> BuildproofError {
    BuildproofError::Io {
        path: path.to_path_buf(),
        source,
    }
}
