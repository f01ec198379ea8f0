// SPDX-License-Identifier: Apache-2.0

//! Configuration for the harvester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for a [`Harvester`](crate::engine::Harvester)
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Directory holding the log and its rotations
    pub directory: PathBuf,
    /// Name of the live log file within `directory`
    pub base_name: String,
    /// Where the tombstone is stored
    pub tombstone_path: PathBuf,
    /// How often to look for appended data and re-check the live file's identity
    pub poll_interval: Duration,
    /// Checkpoint after this many delivered lines (0 disables the line trigger)
    pub checkpoint_every_lines: u64,
    /// Checkpoint at least this often while data is flowing
    pub checkpoint_interval: Duration,
    /// Give up when directory scans keep failing for this long
    pub max_poll_failure_duration: Duration,
    /// Give up when tombstone writes keep failing for this long
    pub max_checkpoint_failure_duration: Duration,
    /// Hold an exclusive lock next to the tombstone while running
    pub lock_tombstone: bool,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            base_name: String::new(),
            tombstone_path: PathBuf::from("/var/lib/rotail/tombstone.json"),
            poll_interval: Duration::from_millis(250),
            checkpoint_every_lines: 1000,
            checkpoint_interval: Duration::from_secs(1),
            max_poll_failure_duration: Duration::from_secs(60),
            max_checkpoint_failure_duration: Duration::from_secs(60),
            lock_tombstone: true,
        }
    }
}

impl HarvesterConfig {
    pub fn new(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base_name: base_name.into(),
            ..Default::default()
        }
    }

    pub fn with_tombstone_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tombstone_path = path.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_checkpoint_every_lines(mut self, lines: u64) -> Self {
        self.checkpoint_every_lines = lines;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Path of the live log file.
    pub fn live_path(&self) -> PathBuf {
        self.directory.join(&self.base_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::Config("log directory must be specified".to_string()));
        }

        if self.base_name.is_empty() {
            return Err(Error::Config("log base name must be specified".to_string()));
        }

        if self.base_name.contains('/') || self.base_name == "." || self.base_name == ".." {
            return Err(Error::Config(format!(
                "log base name must be a plain file name, got {:?}",
                self.base_name
            )));
        }

        if self.tombstone_path.as_os_str().is_empty() {
            return Err(Error::Config("tombstone path must be specified".to_string()));
        }

        // The tombstone must not be mistaken for a family member
        if self.tombstone_path.parent() == Some(Path::new(&self.directory))
            && self
                .tombstone_path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| crate::family::Generation::parse(&self.base_name, n).is_some())
        {
            return Err(Error::Config(format!(
                "tombstone path {:?} collides with the log family",
                self.tombstone_path
            )));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".to_string()));
        }

        if self.checkpoint_interval.is_zero() {
            return Err(Error::Config(
                "checkpoint interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
