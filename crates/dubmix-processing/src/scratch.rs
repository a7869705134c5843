//! Job-scoped scratch directories.
//!
//! Every merge job gets its own directory named after the job id, so concurrent jobs
//! never share a file name. The directory is removed by [`ScratchSpace::cleanup`] or,
//! if the job future is dropped first, when the `ScratchSpace` itself is dropped.

use dubmix_core::TrackRole;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
    job_id: Uuid,
}

impl ScratchSpace {
    /// Create `merge-{job_id}-*` under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>, job_id: Uuid) -> io::Result<Self> {
        let prefix = format!("merge-{}-", job_id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();

        tracing::debug!(job_id = %job_id, path = %path.display(), "Scratch space created");

        Ok(Self {
            dir: Some(dir),
            path,
            job_id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Local file for a fetched input, keeping the source extension so the engine
    /// can detect the container.
    pub fn input_path(&self, role: TrackRole, extension: &str) -> PathBuf {
        self.path.join(format!("{}.{}", role.as_str(), extension))
    }

    pub fn output_path(&self) -> PathBuf {
        self.path.join("merged.mp4")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.path.join("thumbnail.png")
    }

    /// Remove one file. Missing files are fine.
    pub async fn remove_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove scratch file"
                );
            }
        }
    }

    /// Remove the whole directory. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => {
                    tracing::debug!(job_id = %self.job_id, "Scratch space removed");
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        path = %self.path.display(),
                        error = %e,
                        "Failed to remove scratch space"
                    );
                }
            }
        }
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.dir.is_none()
    }
}
