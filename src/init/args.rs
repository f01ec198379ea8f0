// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::HarvesterConfig;
use crate::error::{Error, Result};

#[derive(Debug, Args, Clone)]
pub struct HarvestArgs {
    /// Path of the live log file; shorthand for --directory and --base-name
    #[arg(
        long,
        env = "ROTAIL_EVENT_LOG",
        conflicts_with_all = ["directory", "base_name"]
    )]
    pub event_log: Option<PathBuf>,

    /// Directory holding the log and its rotations
    #[arg(long, env = "ROTAIL_DIRECTORY", requires = "base_name")]
    pub directory: Option<PathBuf>,

    /// File name of the live log within the directory
    #[arg(long, env = "ROTAIL_BASE_NAME", requires = "directory")]
    pub base_name: Option<String>,

    /// Path to store the tombstone (read position) across restarts
    #[arg(
        long,
        env = "ROTAIL_TOMBSTONE_PATH",
        default_value = "/var/lib/rotail/tombstone.json"
    )]
    pub tombstone_path: PathBuf,

    /// Write harvested lines to this file instead of stdout
    #[arg(long, env = "ROTAIL_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Poll interval in milliseconds for new data and rotation checks
    #[arg(long, env = "ROTAIL_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Checkpoint after this many lines (0 disables the line trigger)
    #[arg(long, env = "ROTAIL_CHECKPOINT_EVERY_LINES", default_value = "1000")]
    pub checkpoint_every_lines: u64,

    /// Checkpoint at least this often in milliseconds while data is flowing
    #[arg(long, env = "ROTAIL_CHECKPOINT_INTERVAL_MS", default_value = "1000")]
    pub checkpoint_interval_ms: u64,

    /// Maximum duration in milliseconds of consecutive directory scan failures before exiting
    #[arg(
        long,
        env = "ROTAIL_MAX_POLL_FAILURE_DURATION_MS",
        default_value = "60000"
    )]
    pub max_poll_failure_duration_ms: u64,

    /// Maximum duration in milliseconds of consecutive checkpoint failures before exiting
    #[arg(
        long,
        env = "ROTAIL_MAX_CHECKPOINT_FAILURE_DURATION_MS",
        default_value = "60000"
    )]
    pub max_checkpoint_failure_duration_ms: u64,

    /// Do not take the advisory lock next to the tombstone
    #[arg(long, env = "ROTAIL_NO_LOCK", default_value = "false")]
    pub no_lock: bool,

    /// Number of lines buffered between the harvester and the output
    #[arg(long, env = "ROTAIL_QUEUE_SIZE", default_value = "1000")]
    pub queue_size: usize,

    /// Maximum time in milliseconds to wait for the final checkpoint on shutdown
    #[arg(long, env = "ROTAIL_SHUTDOWN_TIMEOUT_MS", default_value = "5000")]
    pub shutdown_timeout_ms: u64,
}

impl Default for HarvestArgs {
    fn default() -> Self {
        Self {
            event_log: None,
            directory: None,
            base_name: None,
            tombstone_path: PathBuf::from("/var/lib/rotail/tombstone.json"),
            output: None,
            poll_interval_ms: 250,
            checkpoint_every_lines: 1000,
            checkpoint_interval_ms: 1000,
            max_poll_failure_duration_ms: 60000,
            max_checkpoint_failure_duration_ms: 60000,
            no_lock: false,
            queue_size: 1000,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl HarvestArgs {
    /// Build the harvester configuration, resolving `--event-log`.
    pub fn build_config(&self) -> Result<HarvesterConfig> {
        let (directory, base_name) = match (&self.event_log, &self.directory, &self.base_name) {
            (Some(event_log), _, _) => split_event_log(event_log)?,
            (None, Some(directory), Some(base_name)) => (directory.clone(), base_name.clone()),
            _ => {
                return Err(Error::Config(
                    "either --event-log or both --directory and --base-name are required"
                        .to_string(),
                ));
            }
        };

        let config = HarvesterConfig {
            directory,
            base_name,
            tombstone_path: self.tombstone_path.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            checkpoint_every_lines: self.checkpoint_every_lines,
            checkpoint_interval: Duration::from_millis(self.checkpoint_interval_ms),
            max_poll_failure_duration: Duration::from_millis(self.max_poll_failure_duration_ms),
            max_checkpoint_failure_duration: Duration::from_millis(
                self.max_checkpoint_failure_duration_ms,
            ),
            lock_tombstone: !self.no_lock,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Split `/var/log/condor/EventLog` into its directory and file name.
fn split_event_log(path: &Path) -> Result<(PathBuf, String)> {
    let base_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("invalid event log path {:?}", path)))?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, base_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        args: HarvestArgs,
    }

    #[test]
    fn test_event_log_split() {
        let cli = TestCli::parse_from(["rotail", "--event-log", "/var/log/condor/EventLog"]);
        let config = cli.args.build_config().unwrap();
        assert_eq!(config.directory, PathBuf::from("/var/log/condor"));
        assert_eq!(config.base_name, "EventLog");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.lock_tombstone);
    }

    #[test]
    fn test_relative_event_log() {
        let (dir, base) = split_event_log(Path::new("EventLog")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(base, "EventLog");
        assert!(split_event_log(Path::new("/")).is_err());
    }

    #[test]
    fn test_directory_and_base_name() {
        let cli = TestCli::parse_from([
            "rotail",
            "--directory",
            "/data/logs",
            "--base-name",
            "event_log",
            "--checkpoint-every-lines",
            "0",
            "--no-lock",
        ]);
        let config = cli.args.build_config().unwrap();
        assert_eq!(config.live_path(), PathBuf::from("/data/logs/event_log"));
        assert_eq!(config.checkpoint_every_lines, 0);
        assert!(!config.lock_tombstone);
    }

    #[test]
    fn test_conflicting_sources_rejected() {
        let result = TestCli::try_parse_from([
            "rotail",
            "--event-log",
            "/var/log/EventLog",
            "--directory",
            "/tmp",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_log_location() {
        let args = HarvestArgs::default();
        assert!(matches!(args.build_config(), Err(Error::Config(_))));
    }
}
