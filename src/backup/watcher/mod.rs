pub mod channel;
pub mod os;

use crate::backup::result_error::result::Result;

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchedEventKind {
    Created,
    Modified,
    /// Removals, renames, access and anything else the engine does not mirror
    Other,
}

/// A normalized filesystem change under the watched root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedEvent {
    pub source_path: PathBuf,
    pub kind: WatchedEventKind,
    pub is_dir: bool,
}

impl WatchedEvent {
    pub fn new<P: Into<PathBuf>>(source_path: P, kind: WatchedEventKind, is_dir: bool) -> Self {
        Self {
            source_path: source_path.into(),
            kind,
            is_dir,
        }
    }

    pub fn created<P: Into<PathBuf>>(source_path: P) -> Self {
        Self::new(source_path, WatchedEventKind::Created, false)
    }

    pub fn modified<P: Into<PathBuf>>(source_path: P) -> Self {
        Self::new(source_path, WatchedEventKind::Modified, false)
    }

    /// Only file creations and modifications lead to a backup
    pub fn is_actionable(&self) -> bool {
        !self.is_dir
            && matches!(
                self.kind,
                WatchedEventKind::Created | WatchedEventKind::Modified
            )
    }
}

/// Capability to subscribe to change notifications for a directory tree
///
/// The returned stream ends once the source is stopped (or, for fakes, once
/// every producer is gone). Delivery is at-least-once and ordered per path only.
pub trait EventSource {
    fn subscribe(&mut self, root: &Path, recursive: bool) -> Result<Receiver<WatchedEvent>>;

    fn stop(&mut self) -> Result<()>;
}
