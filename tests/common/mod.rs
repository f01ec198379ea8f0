// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rotail::{EngineState, EngineStats, HarvesterConfig, Result};
use tempfile::TempDir;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub type Lines = Arc<Mutex<Vec<Vec<u8>>>>;

/// A log directory with a live file called `event_log`.
pub struct LogDir {
    pub dir: TempDir,
}

impl LogDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn live(&self) -> PathBuf {
        self.path("event_log")
    }

    pub fn tombstone(&self) -> PathBuf {
        self.dir.path().join("state").join("tombstone.json")
    }

    pub fn config(&self) -> HarvesterConfig {
        let mut config = HarvesterConfig::new(self.dir.path(), "event_log")
            .with_tombstone_path(self.tombstone())
            .with_poll_interval(Duration::from_millis(10))
            .with_checkpoint_interval(Duration::from_millis(20));
        config.lock_tombstone = false;
        config
    }

    pub fn append(&self, name: &str, data: &str) {
        append(&self.path(name), data);
    }

    /// Shift `event_log.N` to `event_log.N+1` and move the live file to
    /// `event_log.1`, like a rotating writer does.
    pub fn rotate(&self) {
        let mut rotated: Vec<u32> = fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| {
                let name = e.unwrap().file_name().into_string().unwrap();
                name.strip_prefix("event_log.")?.parse().ok()
            })
            .collect();
        rotated.sort_unstable_by(|a, b| b.cmp(a));
        for n in rotated {
            fs::rename(
                self.path(&format!("event_log.{}", n)),
                self.path(&format!("event_log.{}", n + 1)),
            )
            .unwrap();
        }
        fs::rename(self.live(), self.path("event_log.1")).unwrap();
    }
}

pub fn append(path: &Path, data: &str) {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(data.as_bytes()).unwrap();
}

pub fn collector() -> (Lines, impl FnMut(&[u8]) -> Result<()> + Send + 'static) {
    let lines: Lines = Arc::default();
    let sink = lines.clone();
    (lines, move |line: &[u8]| -> Result<()> {
        sink.lock().unwrap().push(line.to_vec());
        Ok(())
    })
}

pub fn as_strings(lines: &Lines) -> Vec<String> {
    lines
        .lock()
        .unwrap()
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect()
}

pub fn wait_for_lines(lines: &Lines, n: usize) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while lines.lock().unwrap().len() < n {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} lines, have {:?}",
            n,
            as_strings(lines)
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_for_state(stats: &EngineStats, state: EngineState) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while stats.state() != state {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {}, still {}",
            state,
            stats.state()
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle.join().expect("harvester thread panicked")
}
