//! OS notification backed event source.
//!
//! Wraps `notify`'s recommended watcher (inotify, FSEvents, ReadDirectoryChangesW)
//! and normalizes its events into [`WatchedEvent`]s. Notifications are delivered
//! on the watcher's own thread, so subscribing never blocks the caller.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFnName;
use crate::backup::watcher::{EventSource, WatchedEvent, WatchedEventKind};

use function_name::named;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

#[derive(Default)]
pub struct NotifyEventSource {
    watcher: Option<(RecommendedWatcher, PathBuf)>,
}

impl EventSource for NotifyEventSource {
    #[named]
    fn subscribe(&mut self, root: &Path, recursive: bool) -> Result<Receiver<WatchedEvent>> {
        if self.watcher.is_some() {
            return Err(Error::WatcherAlreadyRunning);
        }

        std::fs::create_dir_all(root).map_err(|source| Error::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;

        let (event_tx, event_rx) = channel();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    debug!("notify event: {:?} {:?}", event.kind, event.paths);
                    for watched_event in normalize(event) {
                        // Receiver is gone once the engine shut down.
                        if event_tx.send(watched_event).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => warn!("notify error: {e}"),
            },
        )
        .map_err(Error::from)
        .with_fn_name(function_path!())?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .map_err(Error::from)
            .with_fn_name(function_path!())?;
        info!("Watching path: {:?} (recursive: {})", root, recursive);

        self.watcher = Some((watcher, root.to_path_buf()));
        Ok(event_rx)
    }

    fn stop(&mut self) -> Result<()> {
        let (mut watcher, root) = self.watcher.take().ok_or(Error::WatcherNotRunning)?;
        if let Err(e) = watcher.unwatch(&root) {
            debug!("Unwatching {:?} failed: {e}", root);
        }
        // Dropping the watcher drops the handler and with it the event sender.
        drop(watcher);
        Ok(())
    }
}

fn normalize(event: notify::Event) -> impl Iterator<Item = WatchedEvent> {
    let (kind, is_folder) = classify(&event.kind);
    event.paths.into_iter().map(move |path| {
        let is_dir = is_folder || (kind != WatchedEventKind::Other && path.is_dir());
        WatchedEvent::new(path, kind, is_dir)
    })
}

fn classify(kind: &EventKind) -> (WatchedEventKind, bool) {
    match kind {
        EventKind::Create(CreateKind::Folder) => (WatchedEventKind::Created, true),
        EventKind::Create(_) => (WatchedEventKind::Created, false),
        // Renames and moves are not mirrored.
        EventKind::Modify(ModifyKind::Name(_)) => (WatchedEventKind::Other, false),
        EventKind::Modify(_) => (WatchedEventKind::Modified, false),
        EventKind::Remove(RemoveKind::Folder) => (WatchedEventKind::Other, true),
        _ => (WatchedEventKind::Other, false),
    }
}
