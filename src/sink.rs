//! Build output directory lifecycle.

use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use crate::error::{PipelineError, Result};

/// A directory that build outputs are written under.
///
/// Every path handed out by a sink stays below its root.
#[derive(Debug, Clone)]
pub struct OutputSink {
    root: PathBuf,
}

impl OutputSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A sink rooted at `subdir` below this one.
    pub fn scoped(&self, subdir: impl AsRef<Path>) -> Result<Self> {
        let subdir = subdir.as_ref();
        if subdir.as_os_str().is_empty() {
            return Ok(self.clone());
        }
        Ok(Self {
            root: self.resolve(subdir)?,
        })
    }

    /// Remove the whole directory. A missing directory is not an error.
    pub async fn clean(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::fs(&self.root, e)),
        }
    }

    /// Absolute path for `rel`, with its parent directories created.
    pub fn path_for(&self, rel: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.resolve(rel.as_ref())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::fs(parent, e))?;
        }
        Ok(path)
    }

    pub fn write(&self, rel: impl AsRef<Path>, bytes: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path_for(rel)?;
        std::fs::write(&path, bytes).map_err(|e| PipelineError::fs(&path, e))?;
        Ok(path)
    }

    /// Copy `from` to `rel` below the sink.
    pub fn copy_from(&self, from: &Path, rel: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.path_for(rel)?;
        std::fs::copy(from, &path).map_err(|e| PipelineError::fs(from, e))?;
        Ok(path)
    }

    fn resolve(&self, rel: &Path) -> Result<PathBuf> {
        let escapes = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(PipelineError::fs(
                rel,
                io::Error::new(ErrorKind::InvalidInput, "path leaves the output directory"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_clean_missing_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path().join("build"));
        sink.clean().await.unwrap();
        sink.clean().await.unwrap();
        assert!(!sink.root().exists());
    }

    #[tokio::test]
    async fn test_clean_removes_tree() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path().join("build"));
        sink.write("css/style.min.css", "a{}").unwrap();
        sink.clean().await.unwrap();
        assert!(!sink.root().exists());
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path().join("build"));
        let written = sink.scoped("img").unwrap().write("icons/logo.svg", "<svg/>").unwrap();
        assert_eq!(written, dir.path().join("build/img/icons/logo.svg"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "<svg/>");
    }

    #[test]
    fn test_write_outside_root_is_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(dir.path().join("build"));
        let err = sink.write("../escape.txt", "x").unwrap_err();
        assert!(matches!(err, PipelineError::Filesystem { .. }));
        assert!(sink.scoped("/etc").is_err());
    }
}
