use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("A connection named '{0}' already exists")]
    DuplicateName(String),

    #[error("No connection matches '{0}'")]
    NotFound(String),

    #[error("Stored state is corrupted: {0}")]
    CorruptState(String),

    #[error("File operation failed on {path}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No backup available to restore")]
    BackupNotFound,
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn file_op(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::FileOperation {
            path: path.into(),
            source,
        }
    }
}
