//! Per-job working directories
//!
//! Every job gets a directory of its own under the workspace root, named after
//! the job id. The job's source file and everything its toolchain produces live
//! there, and the whole directory is removed once the job reaches a terminal
//! state.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::workspace::manager::{Workspace, WorkspaceManager};

mod manager;

/// Errors that occur while preparing a workspace
///
/// Teardown never produces one of these; removal failures are only logged.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace {0} already exists")]
    Collision(PathBuf),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Kind of file a toolchain places in a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Source file, by full file name (e.g. "main.py")
    Source(String),

    /// Compiled executable, by base name (platform suffix is added)
    Binary(String),

    /// JVM class file, by class name
    Class(String),
}

impl ArtifactKind {
    /// File name of the artifact inside the workspace
    pub fn file_name(&self) -> String {
        match self {
            ArtifactKind::Source(name) => name.clone(),
            ArtifactKind::Binary(name) => format!("{name}{}", std::env::consts::EXE_SUFFIX),
            ArtifactKind::Class(name) => format!("{name}.class"),
        }
    }
}

/// Reject names that would resolve outside the workspace directory
pub(crate) fn validate_file_name(name: &str) -> Result<(), WorkspaceError> {
    if name.is_empty() || name.contains("..") || name.starts_with('/') || name.contains('\\') {
        return Err(WorkspaceError::InvalidPath(format!(
            "path traversal not allowed: {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_file_names() {
        assert_eq!(
            ArtifactKind::Source("main.py".to_owned()).file_name(),
            "main.py"
        );
        assert_eq!(
            ArtifactKind::Class("Main".to_owned()).file_name(),
            "Main.class"
        );
        assert_eq!(
            ArtifactKind::Binary("main".to_owned()).file_name(),
            format!("main{}", std::env::consts::EXE_SUFFIX)
        );
    }

    #[test]
    fn file_name_validation() {
        assert!(validate_file_name("main.cpp").is_ok());
        assert!(validate_file_name("nested/file.txt").is_ok());

        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("../escape").is_err());
        assert!(validate_file_name("foo/../bar").is_err());
        assert!(validate_file_name("/absolute/path").is_err());
        assert!(validate_file_name("..\\windows").is_err());
    }
}
