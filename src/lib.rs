//! # k-mirror
//!
//! A continuous directory-mirroring backup agent.
//!
//! ## Features
//!
//! - **Event Driven**: Watches a directory tree recursively through OS notifications
//! - **Mirrored Layout**: Copies land under the same relative directory in the backup tree
//! - **Timestamped Copies**: Every copy is named `{YYYY-MM-DD:HH-MM-SS}_{file name}`
//! - **Exclusions**: Unanchored regex (or literal) patterns matched against the full path
//! - **Parallel Processing**: Bounded per-worker queues keep per-file ordering
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_mirror::backup::backup_config::BackupConfig;
//! use k_mirror::backup::supervisor::{interrupt_signals, wait_for_interrupt, Supervisor};
//! use k_mirror::backup::watcher::os::NotifyEventSource;
//!
//! // Load configuration from YAML file
//! let config: BackupConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//!
//! // Watch until SIGINT/SIGTERM
//! let signals = interrupt_signals()?;
//! let pool = config.build_thread_pool()?;
//! Supervisor::new(config, NotifyEventSource::default(), pool)
//!     .run(move || wait_for_interrupt(signals))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
