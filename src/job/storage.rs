//! Flat-file storage: one directory per job holding `metadata.json` and the CSV output.

use super::metadata::JobMetadata;
use crate::core::error::{AppError, Result};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const METADATA_FILE: &str = "metadata.json";

/// Replaces `path` with `contents` via a temp file in the same directory and a rename,
/// so readers see either the old or the new file, never a partial one.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent_dir = path.parent().ok_or_else(|| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Cannot determine parent directory for: {}", path.display()),
        ))
    })?;
    let mut temp_file = NamedTempFile::new_in(parent_dir)?;
    temp_file.write_all(contents)?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| AppError::Io(e.error))?;
    Ok(())
}

fn scan_job_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(root)?;
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Root directory under which job directories live.
#[derive(Debug, Clone)]
pub struct JobStorage {
    root: PathBuf,
}

impl JobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    pub async fn create_job_dir(&self, job_id: &str) -> Result<PathBuf> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Overwrites the job's metadata document.
    pub async fn write_metadata(&self, job_dir: &Path, metadata: &JobMetadata) -> Result<PathBuf> {
        let path = job_dir.join(METADATA_FILE);
        let payload = serde_json::to_vec_pretty(metadata)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &payload)).await??;
        Ok(path)
    }

    /// Reads a job's metadata; `None` when missing or unreadable.
    pub async fn read_metadata(&self, job_dir: &Path) -> Option<JobMetadata> {
        let bytes = tokio::fs::read(job_dir.join(METADATA_FILE)).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(target: "job_task", "Unreadable metadata in {}: {}", job_dir.display(), e);
                None
            }
        }
    }

    pub async fn job_metadata(&self, job_id: &str) -> Option<JobMetadata> {
        self.read_metadata(&self.job_dir(job_id)).await
    }

    /// All job directories under the root (creating the root if needed).
    async fn list_job_dirs(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_job_dirs(&root)).await?
    }

    /// Most recent jobs first, at most `limit` (clamped to 1..=200).
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobMetadata>> {
        let limit = limit.clamp(1, 200);
        let mut jobs = Vec::new();
        for dir in self.list_job_dirs().await? {
            if let Some(metadata) = self.read_metadata(&dir).await {
                jobs.push(metadata);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
