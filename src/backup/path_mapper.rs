use crate::backup::copy::CopyError;

use getset::Getters;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maps source files under the watched root onto directories under the backup root
///
/// `backup_root/relative_dir(source)` where `relative_dir` is the source's
/// containing directory relative to the watched root.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct PathMapper {
    watched_root: Arc<Path>,
    backup_root: Arc<Path>,
}

impl PathMapper {
    pub fn new<A: Into<Arc<Path>>, B: Into<Arc<Path>>>(watched_root: A, backup_root: B) -> Self {
        Self {
            watched_root: watched_root.into(),
            backup_root: backup_root.into(),
        }
    }

    pub fn relative_dir<'a>(&self, source: &'a Path) -> Result<&'a Path, CopyError> {
        source
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.watched_root).ok())
            .ok_or_else(|| CopyError::OutsideWatchedRoot(source.to_path_buf()))
    }

    pub fn destination_dir(&self, source: &Path) -> Result<PathBuf, CopyError> {
        self.relative_dir(source)
            .map(|relative| self.backup_root.join(relative))
    }

    pub fn file_name<'a>(&self, source: &'a Path) -> Result<&'a OsStr, CopyError> {
        source
            .file_name()
            .ok_or_else(|| CopyError::OutsideWatchedRoot(source.to_path_buf()))
    }
}
