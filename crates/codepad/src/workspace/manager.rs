use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::types::JobId;
use crate::workspace::{ArtifactKind, WorkspaceError, validate_file_name};

/// Allocates job workspaces under a common root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the workspace directory for a job
    ///
    /// The directory itself is created exclusively: if it already exists the
    /// call fails with [`WorkspaceError::Collision`] instead of sharing it.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn create(&self, job_id: JobId) -> Result<Workspace, WorkspaceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.root.clone(),
                source,
            })?;

        let dir = self.root.join(job_id.to_string());
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision(dir));
            }
            Err(source) => return Err(WorkspaceError::Create { path: dir, source }),
        }

        debug!(dir = %dir.display(), "workspace created");

        Ok(Workspace {
            job_id,
            dir,
            artifacts: Vec::new(),
            destroyed: false,
        })
    }

    /// Remove workspaces left behind by a previous process
    ///
    /// Only directories named after a job id are touched, so a root shared
    /// with other data keeps that data. Only call this before any job is
    /// submitted; live workspaces are not distinguished from stale ones.
    /// Returns the number of directories removed.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(error = %e, "failed to list workspace root");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read workspace root entry");
                    break;
                }
            };

            let path = entry.path();
            let is_dir = entry.file_type().await.is_ok_and(|kind| kind.is_dir());
            if !is_dir || !is_job_dir(&entry.file_name()) {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale workspace"),
            }
        }

        if removed > 0 {
            info!(removed, "removed stale workspaces");
        }
        removed
    }
}

/// Check whether a directory name is one [`WorkspaceManager::create`] produces
fn is_job_dir(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| Uuid::parse_str(name).is_ok())
}

/// Directory exclusively owned by one job
///
/// Every path handed out by [`artifact_path`](Self::artifact_path) is
/// remembered and removed by [`destroy`](Self::destroy), which also removes
/// the directory along with anything else the toolchain left in it.
///
/// # Cleanup
///
/// Always call [`destroy()`](Self::destroy) once the job is finished. Dropping a
/// workspace without it logs a warning and falls back to a blocking removal.
#[derive(Debug)]
pub struct Workspace {
    job_id: JobId,
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    destroyed: bool,
}

impl Workspace {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Paths recorded for teardown so far
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name would escape the workspace directory.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        validate_file_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Resolve and record the path of an artifact
    ///
    /// The same kind always resolves to the same path.
    pub fn artifact_path(&mut self, kind: &ArtifactKind) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(&kind.file_name())?;
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path.clone());
        }
        Ok(path)
    }

    /// Write the job's source file and return its absolute path
    #[instrument(skip(self, content), fields(job_id = %self.job_id))]
    pub async fn write_source(
        &mut self,
        file_name: &str,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.artifact_path(&ArtifactKind::Source(file_name.to_owned()))?;

        tokio::fs::write(&path, content)
            .await
            .map_err(|source| WorkspaceError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), len = content.len(), "wrote source");
        Ok(path)
    }

    /// Remove every recorded artifact and then the directory itself
    ///
    /// Files that are already gone count as removed. Failures are logged and
    /// otherwise ignored so teardown can never change a job's outcome.
    #[instrument(skip(self), fields(job_id = %self.job_id))]
    pub async fn destroy(mut self) {
        self.destroyed = true;

        for path in &self.artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
            }
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "workspace destroyed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }

        warn!(
            job_id = %self.job_id,
            dir = %self.dir.display(),
            "workspace dropped without destroy(), removing synchronously"
        );

        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != ErrorKind::NotFound
        {
            warn!(dir = %self.dir.display(), error = %e, "best-effort workspace removal failed");
        }
    }
}
