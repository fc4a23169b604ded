//! Byte- and metadata-preserving file copies.
//!
//! Every failure comes back as a [`CopyError`] value; nothing here is allowed
//! to take down the watch loop.

use thiserror::Error;

use std::fs::{File, FileTimes, Metadata};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("source vanished before it could be copied: {0}")]
    SourceVanished(#[source] io::Error),
    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),
    #[error("I/O failure: {0}")]
    IoFailure(#[source] io::Error),
    #[error("{0:?} is not a file inside the watched root")]
    OutsideWatchedRoot(PathBuf),
}

impl CopyError {
    /// Classifies an error raised while reading or copying `source`
    pub fn from_source_io<P: AsRef<Path>>(error: io::Error, source: P) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound if !source.as_ref().exists() => Self::SourceVanished(error),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(error),
            _ => Self::IoFailure(error),
        }
    }

    /// Classifies an error raised while preparing the destination
    pub fn from_destination_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(error),
            _ => Self::IoFailure(error),
        }
    }
}

/// Trait for the copy step of a backup
///
/// Implementations report the number of bytes written on success.
pub trait CopyExecutor: Send + Sync {
    fn copy(&self, source: &Path, destination: &Path) -> Result<u64, CopyError>;
}

/// Copies through the local filesystem
///
/// Content and permission bits come from `std::fs::copy`; access and
/// modification times are applied afterwards on a best-effort basis.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsCopyExecutor;

impl CopyExecutor for FsCopyExecutor {
    fn copy(&self, source: &Path, destination: &Path) -> Result<u64, CopyError> {
        let metadata =
            std::fs::metadata(source).map_err(|e| CopyError::from_source_io(e, source))?;
        if !metadata.is_file() {
            return Err(CopyError::IoFailure(io::Error::other(format!(
                "{:?} is not a regular file",
                source
            ))));
        }

        let bytes = std::fs::copy(source, destination)
            .map_err(|e| CopyError::from_source_io(e, source))?;

        if let Err(e) = preserve_times(&metadata, destination) {
            tracing::debug!("Could not preserve timestamps on {:?}: {e}", destination);
        }

        Ok(bytes)
    }
}

fn preserve_times(metadata: &Metadata, destination: &Path) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(metadata.accessed()?)
        .set_modified(metadata.modified()?);
    File::options()
        .write(true)
        .open(destination)?
        .set_times(times)
}
