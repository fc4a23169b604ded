//! Per-event backup pipeline.
//!
//! Each event goes through filter, mapper, namer and copy executor. Failures
//! for one file are logged and turned into an [`Outcome`]; they never stop the
//! loop. [`BackupEngine::run`] shards events across bounded worker queues by
//! source path, so events for one file keep their order while different files
//! are copied in parallel.

use crate::backup::copy::{CopyError, CopyExecutor, FsCopyExecutor};
use crate::backup::exclusion::ExclusionFilter;
use crate::backup::namer::Namer;
use crate::backup::path_mapper::PathMapper;
use crate::backup::watcher::WatchedEvent;

use bon::Builder;
use getset::Getters;
use rayon::ThreadPool;
use tracing::{error, info, warn};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum Outcome {
    /// Directory event or a kind that is not mirrored
    Ignored,
    Excluded,
    BackedUp {
        source: PathBuf,
        destination: PathBuf,
    },
    Failed {
        source: PathBuf,
        error: CopyError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub received: u64,
    pub backed_up: u64,
    pub failed: u64,
    pub excluded: u64,
    pub ignored: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    backed_up: AtomicU64,
    failed: AtomicU64,
    excluded: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Builder, Getters)]
pub struct BackupEngine {
    #[getset(get = "pub")]
    mapper: PathMapper,
    #[builder(default)]
    #[getset(get = "pub")]
    filter: ExclusionFilter,
    #[builder(default)]
    namer: Namer,
    #[builder(default = Arc::new(FsCopyExecutor) as Arc<dyn CopyExecutor>)]
    copier: Arc<dyn CopyExecutor>,
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    #[builder(skip)]
    counters: Counters,
}

impl BackupEngine {
    /// Handles a single event to completion
    pub fn process(&self, event: &WatchedEvent) -> Outcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if !event.is_actionable() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return Outcome::Ignored;
        }

        let source = event.source_path.as_path();
        if self.filter.should_exclude(source) {
            self.counters.excluded.fetch_add(1, Ordering::Relaxed);
            return Outcome::Excluded;
        }

        match self.backup_file(source) {
            Ok(destination) => {
                info!("Backed up {} to {}", source.display(), destination.display());
                self.counters.backed_up.fetch_add(1, Ordering::Relaxed);
                Outcome::BackedUp {
                    source: source.to_path_buf(),
                    destination,
                }
            }
            Err(error) => {
                error!("Error backing up {}: {}", source.display(), error);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Outcome::Failed {
                    source: source.to_path_buf(),
                    error,
                }
            }
        }
    }

    fn backup_file(&self, source: &Path) -> Result<PathBuf, CopyError> {
        let dir = self.mapper.destination_dir(source)?;
        let file_name = self.mapper.file_name(source)?;
        std::fs::create_dir_all(&dir).map_err(CopyError::from_destination_io)?;

        let destination = dir.join(self.namer.name_for(file_name));
        self.copier.copy(source, &destination)?;
        Ok(destination)
    }

    /// Consumes `events` until the stream ends, then drains the worker queues
    ///
    /// Uses one queue per pool thread; a full queue blocks the dispatcher, so
    /// backlog stays in the notification channel instead of growing here.
    pub fn run(&self, events: Receiver<WatchedEvent>, pool: &ThreadPool) -> EngineStats {
        let shards = pool.current_num_threads().max(1);
        let (senders, receivers): (Vec<SyncSender<WatchedEvent>>, Vec<Receiver<WatchedEvent>>) =
            (0..shards)
                .map(|_| sync_channel(self.queue_capacity.max(1)))
                .unzip();

        pool.in_place_scope(|scope| {
            for rx in receivers {
                scope.spawn(move |_| {
                    for event in rx {
                        self.process(&event);
                    }
                });
            }

            for event in events {
                let shard = shard_for(&event.source_path, shards);
                if let Err(e) = senders[shard].send(event) {
                    warn!("Worker queue {shard} closed, dropping {:?}", e.0.source_path);
                }
            }

            // Closing the queues lets every worker finish what is already queued.
            drop(senders);
        });

        let stats = self.stats();
        info!(
            "Processed {} events: {} backed up, {} failed, {} excluded, {} ignored",
            stats.received, stats.backed_up, stats.failed, stats.excluded, stats.ignored
        );
        stats
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            received: self.counters.received.load(Ordering::Relaxed),
            backed_up: self.counters.backed_up.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            excluded: self.counters.excluded.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
        }
    }
}

fn shard_for(path: &Path, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::namer::split_timestamped_name;
    use crate::backup::namer::tests::FixedClock;
    use crate::backup::watcher::channel::ChannelEventSource;
    use crate::backup::watcher::{EventSource, WatchedEventKind};
    use chrono::{Duration, Local};
    use rayon::ThreadPoolBuilder;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    struct Roots {
        _temp_dir: TempDir,
        watched: PathBuf,
        backup: PathBuf,
    }

    fn roots() -> Roots {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().canonicalize().unwrap();
        let watched = base.join("watched");
        let backup = base.join("backup");
        std::fs::create_dir_all(&watched).unwrap();
        Roots {
            _temp_dir: temp_dir,
            watched,
            backup,
        }
    }

    fn engine(roots: &Roots, patterns: &[&str]) -> BackupEngine {
        BackupEngine::builder()
            .mapper(PathMapper::new(roots.watched.clone(), roots.backup.clone()))
            .filter(ExclusionFilter::from_patterns(patterns).unwrap())
            .build()
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn backup_files(root: &Path) -> Vec<PathBuf> {
        if !root.exists() {
            return vec![];
        }
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Records copies instead of touching the filesystem
    #[derive(Default)]
    struct RecordingCopier {
        copies: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl CopyExecutor for RecordingCopier {
        fn copy(&self, source: &Path, destination: &Path) -> Result<u64, CopyError> {
            self.copies
                .lock()
                .unwrap()
                .push((source.to_path_buf(), destination.to_path_buf()));
            Ok(0)
        }
    }

    #[test]
    fn test_file_is_backed_up_under_relative_dir() {
        let roots = roots();
        let engine = engine(&roots, &[]);
        let source = roots.watched.join("a/b.txt");
        write(&source, "hello");

        let outcome = engine.process(&WatchedEvent::modified(&source));

        let destination = match outcome {
            Outcome::BackedUp { destination, .. } => destination,
            other => panic!("Expected BackedUp, got {:?}", other),
        };
        assert_eq!(destination.parent().unwrap(), roots.backup.join("a"));
        let file_name = destination.file_name().unwrap().to_str().unwrap();
        let (_, original) = split_timestamped_name(file_name).unwrap();
        assert_eq!(original, "b.txt");
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "hello");
    }

    #[test]
    fn test_excluded_file_produces_nothing() {
        let roots = roots();
        let engine = engine(&roots, &[r".*\.log"]);
        let source = roots.watched.join("a/c.log");
        write(&source, "log line");

        for _ in 0..3 {
            assert!(matches!(
                engine.process(&WatchedEvent::modified(&source)),
                Outcome::Excluded
            ));
        }

        assert!(!roots.backup.join("a").exists());
        assert_eq!(engine.stats().excluded, 3);
    }

    #[test]
    fn test_excluded_sibling_does_not_block_ancestor_dirs() {
        let roots = roots();
        let engine = engine(&roots, &[r"\.log$"]);
        let excluded = roots.watched.join("x/y/skip.log");
        let kept = roots.watched.join("x/keep.txt");
        write(&excluded, "skip");
        write(&kept, "keep");

        engine.process(&WatchedEvent::created(&excluded));
        engine.process(&WatchedEvent::created(&kept));

        assert!(roots.backup.join("x").is_dir());
        assert!(!roots.backup.join("x/y").exists());
    }

    #[test]
    fn test_missing_backup_root_is_created() {
        let roots = roots();
        assert!(!roots.backup.exists());
        let engine = engine(&roots, &[]);
        let source = roots.watched.join("deep/er/file.bin");
        write(&source, "data");

        assert!(matches!(
            engine.process(&WatchedEvent::created(&source)),
            Outcome::BackedUp { .. }
        ));
        assert!(roots.backup.join("deep/er").is_dir());
    }

    #[test]
    fn test_vanished_source_is_reported_and_next_event_processed() {
        let roots = roots();
        let engine = engine(&roots, &[]);
        let vanished = roots.watched.join("gone.txt");
        let other = roots.watched.join("other.txt");
        write(&other, "still here");

        let outcome = engine.process(&WatchedEvent::created(&vanished));
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: CopyError::SourceVanished(_),
                ..
            }
        ));

        assert!(matches!(
            engine.process(&WatchedEvent::modified(&other)),
            Outcome::BackedUp { .. }
        ));
        assert_eq!(engine.stats().failed, 1);
        assert_eq!(engine.stats().backed_up, 1);
    }

    #[test]
    fn test_directory_and_other_events_are_ignored_silently() {
        let roots = roots();
        let engine = engine(&roots, &[]);
        let dir = roots.watched.join("newdir");
        std::fs::create_dir_all(&dir).unwrap();
        let file = roots.watched.join("deleted.txt");

        assert!(matches!(
            engine.process(&WatchedEvent::new(&dir, WatchedEventKind::Created, true)),
            Outcome::Ignored
        ));
        assert!(matches!(
            engine.process(&WatchedEvent::new(&file, WatchedEventKind::Other, false)),
            Outcome::Ignored
        ));
        assert!(backup_files(&roots.backup).is_empty());
        assert!(!roots.backup.join("newdir").exists());
    }

    #[test]
    fn test_deletion_keeps_previous_backups() {
        let roots = roots();
        let engine = engine(&roots, &[]);
        let source = roots.watched.join("doc.txt");
        write(&source, "v1");
        engine.process(&WatchedEvent::created(&source));

        std::fs::remove_file(&source).unwrap();
        engine.process(&WatchedEvent::new(&source, WatchedEventKind::Other, false));

        assert_eq!(backup_files(&roots.backup).len(), 1);
    }

    #[test]
    fn test_same_second_collision_keeps_later_content() {
        let roots = roots();
        let engine = BackupEngine::builder()
            .mapper(PathMapper::new(roots.watched.clone(), roots.backup.clone()))
            .namer(Namer::new(FixedClock::at(2024, 5, 1, 12, 0, 0)))
            .build();
        let source = roots.watched.join("a/b.txt");

        write(&source, "first");
        engine.process(&WatchedEvent::modified(&source));
        write(&source, "second");
        engine.process(&WatchedEvent::modified(&source));

        let files = backup_files(&roots.backup);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0], roots.backup.join("a/2024-05-01:12-00-00_b.txt"));
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "second");
    }

    #[test]
    fn test_different_seconds_keep_both_copies() {
        let roots = roots();
        let clock = Arc::new(FixedClock::at(2024, 5, 1, 12, 0, 0));

        struct SharedClock(Arc<FixedClock>);
        impl crate::backup::namer::Clock for SharedClock {
            fn now(&self) -> chrono::DateTime<Local> {
                crate::backup::namer::Clock::now(self.0.as_ref())
            }
        }

        let engine = BackupEngine::builder()
            .mapper(PathMapper::new(roots.watched.clone(), roots.backup.clone()))
            .namer(Namer::new(SharedClock(clock.clone())))
            .build();
        let source = roots.watched.join("b.txt");

        write(&source, "first");
        engine.process(&WatchedEvent::modified(&source));
        {
            let mut now = clock.0.lock().unwrap();
            *now += Duration::seconds(1);
        }
        write(&source, "second");
        engine.process(&WatchedEvent::modified(&source));

        let mut contents: Vec<_> = backup_files(&roots.backup)
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_path_outside_watched_root_fails() {
        let roots = roots();
        let engine = engine(&roots, &[]);

        let outcome = engine.process(&WatchedEvent::created("/somewhere/else.txt"));
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: CopyError::OutsideWatchedRoot(_),
                ..
            }
        ));
    }

    #[test]
    fn test_custom_copier_receives_mapped_destination() {
        let roots = roots();
        let copier = Arc::new(RecordingCopier::default());
        let engine = BackupEngine::builder()
            .mapper(PathMapper::new(roots.watched.clone(), roots.backup.clone()))
            .namer(Namer::new(FixedClock::at(2024, 1, 2, 3, 4, 5)))
            .copier(copier.clone())
            .build();
        let source = roots.watched.join("p/q.txt");

        engine.process(&WatchedEvent::created(&source));

        let copies = copier.copies.lock().unwrap();
        assert_eq!(
            copies.as_slice(),
            &[(source, roots.backup.join("p/2024-01-02:03-04-05_q.txt"))]
        );
    }

    #[test]
    fn test_run_processes_stream_until_closed() {
        let roots = roots();
        let engine = engine(&roots, &[r"\.tmp$"]);
        let pool = ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let (mut source, tx) = ChannelEventSource::new();
        let rx = source.subscribe(&roots.watched, true).unwrap();

        for i in 0..10 {
            let path = roots.watched.join(format!("dir{}/file{}.txt", i % 3, i));
            write(&path, &format!("content {i}"));
            tx.send(WatchedEvent::created(&path)).unwrap();
        }
        let tmp = roots.watched.join("scratch.tmp");
        write(&tmp, "scratch");
        tx.send(WatchedEvent::modified(&tmp)).unwrap();
        tx.send(WatchedEvent::new(&roots.watched, WatchedEventKind::Modified, true))
            .unwrap();
        drop(tx);

        let stats = engine.run(rx, &pool);

        assert_eq!(
            stats,
            EngineStats {
                received: 12,
                backed_up: 10,
                failed: 0,
                excluded: 1,
                ignored: 1,
            }
        );
        assert_eq!(backup_files(&roots.backup).len(), 10);
        for i in 0..3 {
            assert!(roots.backup.join(format!("dir{i}")).is_dir());
        }
    }

    #[test]
    fn test_run_handles_hot_path_alongside_others() {
        let roots = roots();
        let copier = Arc::new(RecordingCopier::default());
        let engine = BackupEngine::builder()
            .mapper(PathMapper::new(roots.watched.clone(), roots.backup.clone()))
            .copier(copier.clone())
            .queue_capacity(1)
            .build();
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        let hot = roots.watched.join("hot.txt");
        for i in 0..50 {
            tx.send(WatchedEvent::modified(&hot)).unwrap();
            tx.send(WatchedEvent::modified(roots.watched.join(format!("cold{i}.txt"))))
                .unwrap();
        }
        drop(tx);

        let stats = engine.run(rx, &pool);

        assert_eq!(stats.backed_up, 100);
        let copies = copier.copies.lock().unwrap();
        assert_eq!(copies.iter().filter(|(src, _)| src == &hot).count(), 50);
    }

    #[test]
    fn test_shard_for_is_stable_and_in_range() {
        let path = Path::new("/watched/a/b.txt");
        let shard = shard_for(path, 7);
        assert!(shard < 7);
        assert_eq!(shard, shard_for(path, 7));
        assert_eq!(shard_for(path, 1), 0);
    }
}
