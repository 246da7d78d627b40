use std::path::PathBuf;
use thiserror::Error;

/// Conditions that fail the build outright.
///
/// Everything else (unset variables, skipped extensions, policy conflicts) is
/// logged and processing continues.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("{0} is not a valid directory name or the provided path does not exist.")]
    MissingTarget(String),
    #[error("{0} is listed in \"directories\" but is not a directory.")]
    NotADirectory(String),
    #[error("{0} is listed in \"files\" but is not a regular file.")]
    NotAFile(String),
    #[error("{0} is listed in both \"files\" and \"directories\".")]
    ConflictingTarget(String),
    #[error("No source directory is specified.")]
    NoSourceDirectory,
    #[error("Backup directory {0} is a regular file.")]
    InvalidBackupDirectory(PathBuf),
    #[error("File system walk error: {0}")]
    WalkDir(#[from] walkdir::Error),
}
