//! Per-run working directory.
//!
//! Every intermediate a run produces (captions, intro clip, concat list,
//! joined and finalized files) lives in one hidden directory next to the
//! capture. The directory is removed when the handle drops, whichever way
//! the run ends. Keeping it beside the capture means the final rename
//! never crosses a filesystem boundary.

use std::path::{Path, PathBuf};

use stepcast_common::error::{StepcastError, StepcastResult};
use tempfile::TempDir;

const PREFIX: &str = ".stepcast-";

#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
    parent: PathBuf,
}

impl WorkDir {
    /// Create a fresh working directory inside `parent`.
    pub fn create_in(parent: &Path) -> StepcastResult<Self> {
        if !parent.is_dir() {
            return Err(StepcastError::FileNotFound {
                path: parent.to_path_buf(),
            });
        }
        let dir = tempfile::Builder::new().prefix(PREFIX).tempdir_in(parent)?;
        tracing::debug!(path = %dir.path().display(), "Created working directory");
        Ok(Self {
            dir,
            parent: parent.to_path_buf(),
        })
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory the transcoder runs in.
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// This directory relative to [`WorkDir::parent`].
    pub fn relative(&self) -> PathBuf {
        self.dir
            .path()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.dir.path().to_path_buf())
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> StepcastResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "Removed working directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_lives_next_to_capture_and_is_removed() {
        let parent = tempfile::tempdir().unwrap();
        let work = WorkDir::create_in(parent.path()).unwrap();
        let path = work.path().to_path_buf();

        assert_eq!(path.parent(), Some(parent.path()));
        assert!(work.relative().to_string_lossy().starts_with(PREFIX));
        assert_eq!(parent.path().join(work.relative()), path);

        std::fs::write(work.join("concat.txt"), "file 'a'\n").unwrap();
        drop(work);
        assert!(!path.exists());
    }

    #[test]
    fn test_explicit_close() {
        let parent = tempfile::tempdir().unwrap();
        let work = WorkDir::create_in(parent.path()).unwrap();
        let path = work.path().to_path_buf();
        work.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_parent() {
        let err = WorkDir::create_in(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, StepcastError::FileNotFound { .. }));
    }
}
