use crate::backup::engine::DEFAULT_QUEUE_CAPACITY;
use crate::backup::exclusion::{ExclusionFilter, ExclusionPattern};
use crate::backup::result_error::result::Result;
use crate::backup::validate::validate_dir_path;

use bon::Builder;
use getset::Getters;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

use std::num::NonZero;
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound for the automatically chosen worker count
static DEFAULT_MAX_WORKERS: usize = 8;

/// Configuration of one mirrored directory pair
///
/// ```yaml
/// watched_dir: /home/me/documents
/// backup_dir: /mnt/backup/documents
/// exclude:
///   - '.*\.log'
/// exclude_literal:
///   - exclude_this_file.txt
/// workers: 4
/// ```
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(custom(function = validate_dir_path))]
    #[builder(into)]
    watched_dir: PathBuf,
    #[validate(custom(function = validate_dir_path))]
    #[builder(into)]
    backup_dir: PathBuf,
    /// Regular expressions searched anywhere in the full source path
    #[serde(default)]
    #[builder(default)]
    exclude: Vec<ExclusionPattern>,
    /// Plain substrings, escaped before matching
    #[serde(default)]
    #[builder(default)]
    exclude_literal: Vec<String>,
    #[validate(range(min = 1, max = 256))]
    workers: Option<usize>,
    #[validate(range(min = 1))]
    queue_capacity: Option<usize>,
}

impl BackupConfig {
    pub fn exclusion_filter(&self) -> Result<ExclusionFilter> {
        let literals = self
            .exclude_literal
            .iter()
            .map(ExclusionPattern::literal)
            .collect::<Result<Vec<_>>>()?;

        Ok(ExclusionFilter::new(
            self.exclude.iter().cloned().chain(literals),
        ))
    }

    /// Configured worker count (never zero), or half the cores up to 8
    pub fn worker_count(&self) -> usize {
        self.workers.map(|w| w.max(1)).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZero::get)
                .map(|core| core / 2)
                .map(|t| t.clamp(1, DEFAULT_MAX_WORKERS))
                .unwrap_or(1)
        })
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn build_thread_pool(&self) -> Result<Arc<ThreadPool>> {
        let workers = self.worker_count();
        tracing::debug!("Creating backup worker pool with {} threads", workers);
        Ok(ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("backup-worker-{i}"))
            .build()?
            .into())
    }
}
