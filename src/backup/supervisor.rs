//! Process lifecycle: roots, engine wiring, watch until interrupted.

use crate::backup::backup_config::BackupConfig;
use crate::backup::engine::{BackupEngine, EngineStats};
use crate::backup::function_path;
use crate::backup::path_mapper::PathMapper;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{WithFnName, WithMsg};
use crate::backup::watcher::EventSource;

use function_name::named;
use rayon::ThreadPool;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info};
use validator::Validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Supervisor<S: EventSource> {
    config: BackupConfig,
    source: S,
    pool: Arc<ThreadPool>,
}

impl<S: EventSource> Supervisor<S> {
    pub fn new(config: BackupConfig, source: S, pool: Arc<ThreadPool>) -> Self {
        Self {
            config,
            source,
            pool,
        }
    }

    /// Watches until `wait_for_shutdown` returns, then drains and stops
    ///
    /// Any startup problem (config, roots, patterns, watcher) is returned
    /// before a single event is handled. After shutdown every queued event has
    /// been processed; copies already in flight are not rolled back.
    ///
    /// Roots are watched and matched as configured (absolute, symlinks kept),
    /// so exclusion patterns see the same paths the user wrote.
    #[named]
    pub fn run<F: FnOnce() -> Result<()>>(mut self, wait_for_shutdown: F) -> Result<EngineStats> {
        self.config
            .validate()
            .map_err(Error::from)
            .with_msg("Config validation failed")?;

        let watched_root = ensure_root(self.config.watched_dir())?;
        let backup_root = ensure_root(self.config.backup_dir())?;
        check_overlap(&watched_root, &backup_root)?;

        let engine = BackupEngine::builder()
            .mapper(PathMapper::new(watched_root.clone(), backup_root))
            .filter(self.config.exclusion_filter()?)
            .queue_capacity(self.config.effective_queue_capacity())
            .build();

        let events = self
            .source
            .subscribe(&watched_root, true)
            .with_msg(format!("Cannot watch {:?}", watched_root))?;
        info!("Started watching directory: {}", watched_root.display());

        let pool = self.pool.clone();
        let engine_handle = std::thread::Builder::new()
            .name("backup-engine".into())
            .spawn(move || engine.run(events, &pool));
        let engine_handle = match engine_handle {
            Ok(handle) => handle,
            Err(e) => {
                return Err(self.abort(Error::from(e).with_fn_name(function_path!())));
            }
        };

        let mut errors = vec![];
        if let Err(e) = wait_for_shutdown() {
            errors.push(e.with_msg("Waiting for shutdown failed"));
        }
        if let Err(e) = self.source.stop() {
            errors.push(e.with_msg("Stopping watcher failed"));
        }

        let stats = match engine_handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                errors.push(Error::EngineThreadPanicked);
                None
            }
        };
        info!("Stopped watching directory");

        convert_error_vec(errors).with_fn_name(function_path!())?;
        Ok(stats.unwrap_or_default())
    }

    /// Stops the source after a failed start, keeping both errors
    fn abort(&mut self, error: Error) -> Error {
        match self.source.stop() {
            Ok(()) => error,
            Err(stop_error) => error.chain(stop_error.with_msg("Stopping watcher failed")),
        }
    }
}

/// Creates `dir` if needed and returns it as an absolute path
///
/// Symlinks are not resolved: event paths and exclusion patterns are matched
/// against the root as configured.
pub fn ensure_root<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .and_then(|_| std::path::absolute(dir))
        .map_err(|source| Error::RootUnavailable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Rejects a backup root that resolves to or below the watched root
fn check_overlap(watched_root: &Path, backup_root: &Path) -> Result<()> {
    let canonical = |dir: &Path| {
        dir.canonicalize().map_err(|source| Error::RootUnavailable {
            path: dir.to_path_buf(),
            source,
        })
    };
    let watched = canonical(watched_root)?;
    let backup = canonical(backup_root)?;
    if backup.starts_with(&watched) {
        return Err(Error::OverlappingRoots { watched, backup });
    }
    Ok(())
}

/// Registers SIGINT and SIGTERM handlers
///
/// Call before [`Supervisor::run`] so a signal arriving during startup is
/// queued instead of killing the process.
pub fn interrupt_signals() -> Result<Signals> {
    Ok(Signals::new([SIGINT, SIGTERM])?)
}

/// Blocks until one of `signals` arrives
pub fn wait_for_interrupt(mut signals: Signals) -> Result<()> {
    match signals.forever().next() {
        Some(signal) => info!("Received signal {signal}, shutting down"),
        None => error!("Signal stream closed unexpectedly, shutting down"),
    }
    Ok(())
}
