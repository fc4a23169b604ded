use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::watcher::{EventSource, WatchedEvent};

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};

/// Deterministic event source fed by hand through a [`Sender`]
///
/// Lets the engine and supervisor run without OS notifications. The stream
/// ends when every sender returned by [`ChannelEventSource::new`] is dropped.
#[derive(Debug)]
pub struct ChannelEventSource {
    receiver: Option<Receiver<WatchedEvent>>,
    subscribed_root: Option<PathBuf>,
}

impl ChannelEventSource {
    pub fn new() -> (Self, Sender<WatchedEvent>) {
        let (tx, rx) = channel();
        (
            Self {
                receiver: Some(rx),
                subscribed_root: None,
            },
            tx,
        )
    }

    pub fn subscribed_root(&self) -> Option<&Path> {
        self.subscribed_root.as_deref()
    }
}

impl EventSource for ChannelEventSource {
    fn subscribe(&mut self, root: &Path, _recursive: bool) -> Result<Receiver<WatchedEvent>> {
        if self.receiver.is_none() {
            return Err(Error::WatcherAlreadyRunning);
        }
        std::fs::create_dir_all(root).map_err(|source| Error::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        let receiver = self.receiver.take().ok_or(Error::WatcherAlreadyRunning)?;
        self.subscribed_root = Some(root.to_path_buf());
        Ok(receiver)
    }

    fn stop(&mut self) -> Result<()> {
        self.subscribed_root
            .take()
            .map(|_| ())
            .ok_or(Error::WatcherNotRunning)
    }
}
