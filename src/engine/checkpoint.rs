// SPDX-License-Identifier: Apache-2.0

//! Checkpoint cadence and failure tracking.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::HarvesterConfig;
use crate::error::{Error, Result};
use crate::tombstone::{Tombstone, TombstoneStore};

use super::stats::EngineStats;

/// Decides when to write the tombstone and tracks write failures.
///
/// A failed write is kept and retried; failures are tolerated until they
/// have persisted for `max_failure_duration`, after which the next failure
/// is returned as `Error::CheckpointUnavailable`.
pub struct Checkpointer {
    store: Box<dyn TombstoneStore + Send>,
    every_lines: u64,
    interval: Duration,
    max_failure_duration: Duration,
    lines_since: u64,
    last_checkpoint: Instant,
    /// Tracks when checkpoint failures started (for threshold-based exit)
    first_failure: Option<Instant>,
    /// Write that failed and still has to land
    pending: Option<(Tombstone, PathBuf)>,
    /// Last tombstone known to be durable
    durable: Option<Tombstone>,
    stats: Arc<EngineStats>,
}

impl Checkpointer {
    pub fn new(
        store: Box<dyn TombstoneStore + Send>,
        config: &HarvesterConfig,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            store,
            every_lines: config.checkpoint_every_lines,
            interval: config.checkpoint_interval,
            max_failure_duration: config.max_checkpoint_failure_duration,
            lines_since: 0,
            last_checkpoint: Instant::now(),
            first_failure: None,
            pending: None,
            durable: None,
            stats,
        }
    }

    pub fn store(&self) -> &dyn TombstoneStore {
        self.store.as_ref()
    }

    /// Note lines delivered since the last checkpoint.
    pub fn record_lines(&mut self, lines: u64) {
        self.lines_since += lines;
    }

    /// Lines delivered but not yet covered by a durable checkpoint.
    pub fn lines_since(&self) -> u64 {
        self.lines_since
    }

    pub fn is_failing(&self) -> bool {
        self.first_failure.is_some()
    }

    /// Whether a checkpoint should be written now.
    pub fn is_due(&self) -> bool {
        self.is_due_after(0)
    }

    /// Whether a checkpoint would be due after `more` further lines.
    pub fn is_due_after(&self, more: u64) -> bool {
        if self.is_failing() {
            return true;
        }
        let lines = self.lines_since + more;
        if lines == 0 {
            return false;
        }
        (self.every_lines > 0 && lines >= self.every_lines)
            || self.last_checkpoint.elapsed() >= self.interval
    }

    /// True when `tombstone` is already the durable checkpoint.
    pub fn is_durable(&self, tombstone: &Tombstone) -> bool {
        !self.is_failing()
            && self.durable.is_some_and(|d| {
                d.file_id == tombstone.file_id && d.position == tombstone.position
            })
    }

    pub fn durable(&self) -> Option<&Tombstone> {
        self.durable.as_ref()
    }

    /// Write `tombstone`.
    ///
    /// `Ok(true)` when it is durable, `Ok(false)` when the write failed but
    /// failures are still within the tolerated window.
    pub fn checkpoint(&mut self, tombstone: &Tombstone, tracked_path: &Path) -> Result<bool> {
        match self.store.store_annotated(tombstone, tracked_path) {
            Ok(()) => {
                if self.first_failure.take().is_some() {
                    debug!("Checkpoint succeeded after previous failures");
                }
                self.pending = None;
                self.durable = Some(*tombstone);
                self.lines_since = 0;
                self.last_checkpoint = Instant::now();
                self.stats.record_checkpoint();
                debug!(
                    file_id = %tombstone.file_id,
                    position = tombstone.position,
                    path = ?tracked_path,
                    "Checkpoint completed"
                );
                Ok(true)
            }
            Err(e) => {
                self.stats.record_checkpoint_failure();
                self.pending = Some((*tombstone, tracked_path.to_path_buf()));

                let first_failure = *self.first_failure.get_or_insert_with(Instant::now);
                let failure_duration = first_failure.elapsed();

                if failure_duration >= self.max_failure_duration {
                    error!(
                        "Checkpoint failures persisted for {:?} writing {}, exiting: {}",
                        failure_duration,
                        self.store.describe(),
                        e
                    );
                    Err(Error::CheckpointUnavailable(e.to_string()))
                } else {
                    warn!(
                        "Checkpoint failed (failures started {:?} ago): {}",
                        failure_duration, e
                    );
                    Ok(false)
                }
            }
        }
    }

    /// Retry the last failed write, if any.
    pub fn retry(&mut self) -> Result<bool> {
        match self.pending.take() {
            Some((tombstone, path)) => self.checkpoint(&tombstone.restamped(), &path),
            None => Ok(true),
        }
    }
}
