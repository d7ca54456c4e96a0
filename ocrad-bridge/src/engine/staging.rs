use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{OcradError, Result};

/// Private directory of transient files, keyed by flat names such as
/// `in.pnm` or `/out.txt`. The directory is removed when dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("ocrad-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn in_dir(root: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("ocrad-")
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Filesystem path behind a staged name. A leading `/` is accepted;
    /// nested or relative names are not.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let key = name.strip_prefix('/').unwrap_or(name);
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(OcradError::InvalidStagingName(name.to_string()));
        }
        Ok(self.dir.path().join(key))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.path(name)?, bytes)?;
        Ok(())
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(name)?)?)
    }

    pub fn read_text(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(name)?)?)
    }

    pub fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name)?)?;
        Ok(())
    }
}
