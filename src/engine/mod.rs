// SPDX-License-Identifier: Apache-2.0

//! Resumption engine.
//!
//! The [`Harvester`] loads the tombstone, scans the rotation family, replays
//! whatever was rotated away since the last checkpoint (oldest first), then
//! follows the live file until it is rotated, at which point it drains the
//! old handle and starts over. All file I/O is blocking, so the engine runs
//! on its own OS thread.

mod checkpoint;
mod plan;
mod state;
mod stats;

pub use checkpoint::Checkpointer;
pub use plan::{DataLoss, ReplaySegment, ResumePlan};
pub use state::EngineState;
pub use stats::{EngineStats, EngineStatsSnapshot, get_meter};

use std::io::ErrorKind;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HarvesterConfig;
use crate::consumer::LineConsumer;
use crate::error::{Error, Result};
use crate::family::RotationFamily;
use crate::identity::FileId;
use crate::reader::LineReader;
use crate::tombstone::{JsonTombstoneStore, Tombstone, TombstoneLock, TombstoneStore};

/// Longest uninterrupted sleep; bounds how long cancellation can go unnoticed.
const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Tails one rotation family and delivers every line exactly once.
pub struct Harvester {
    config: HarvesterConfig,
    store: Box<dyn TombstoneStore + Send>,
    stats: Arc<EngineStats>,
}

impl Harvester {
    /// Harvester checkpointing to a JSON file at `config.tombstone_path`.
    pub fn new(config: HarvesterConfig) -> Result<Self> {
        let store = JsonTombstoneStore::new(&config.tombstone_path);
        Self::with_store(config, store)
    }

    /// Harvester checkpointing to `store`.
    pub fn with_store<S>(config: HarvesterConfig, store: S) -> Result<Self>
    where
        S: TombstoneStore + Send + 'static,
    {
        config.validate()?;
        let stats = Arc::new(EngineStats::new(&config.base_name));
        Ok(Self {
            config,
            store: Box::new(store),
            stats,
        })
    }

    pub fn config(&self) -> &HarvesterConfig {
        &self.config
    }

    /// Counters for this harvester; stays valid after the run ends.
    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    /// Run on the calling thread until cancelled or a fatal error.
    ///
    /// On cancellation the consumer is flushed and a final checkpoint is
    /// written covering exactly the delivered lines.
    pub fn run<C: LineConsumer>(self, consumer: C, cancel: CancellationToken) -> Result<()> {
        let _lock = if self.config.lock_tombstone {
            Some(TombstoneLock::acquire(&self.config.tombstone_path)?)
        } else {
            None
        };

        info!(
            directory = ?self.config.directory,
            base_name = %self.config.base_name,
            tombstone = %self.store.describe(),
            "Harvester started"
        );

        let Harvester {
            config,
            store,
            stats,
        } = self;
        let mut engine = Engine {
            checkpointer: Checkpointer::new(store, &config, stats.clone()),
            config,
            stats,
            consumer,
            cancel,
            progress: None,
            drained: None,
            poll_first_failure: None,
            reported_state: None,
        };

        let result = engine.run();
        match &result {
            Ok(()) => info!("Harvester stopped"),
            Err(e) => error!("Harvester failed: {}", e),
        }
        result
    }

    /// Run on a dedicated OS thread.
    pub fn spawn<C>(self, consumer: C, cancel: CancellationToken) -> Result<JoinHandle<Result<()>>>
    where
        C: LineConsumer + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name("rotail-harvester".to_string())
            .spawn(move || self.run(consumer, cancel))?;
        Ok(handle)
    }
}

enum Flow {
    /// Segment finished, go on with the next one
    Continue,
    /// Go back to bootstrapping
    Rescan,
    Cancelled,
}

enum Pump {
    /// No more complete data right now
    Eof,
    /// A checkpoint is failing; reading is paused until it succeeds
    Blocked,
    Cancelled,
}

struct Engine<C> {
    config: HarvesterConfig,
    checkpointer: Checkpointer,
    stats: Arc<EngineStats>,
    consumer: C,
    cancel: CancellationToken,
    /// Everything up to here has been delivered (durable or not)
    progress: Option<Tombstone>,
    /// Last rotated file read to its end and checkpointed
    drained: Option<Tombstone>,
    /// Tracks when scan failures started (for threshold-based exit)
    poll_first_failure: Option<Instant>,
    reported_state: Option<EngineState>,
}

impl<C: LineConsumer> Engine<C> {
    fn run(&mut self) -> Result<()> {
        let mut resolved = false;

        loop {
            self.set_state(EngineState::Bootstrapping);

            if !resolved {
                resolved = self.resolve_start()?;
                if !resolved {
                    if self.wait_poll() {
                        return Ok(());
                    }
                    continue;
                }
            }

            if self.cancel.is_cancelled() {
                self.final_checkpoint(None);
                return Ok(());
            }

            if self.checkpointer.is_failing() && !self.checkpointer.retry()? {
                if self.wait_poll() {
                    self.final_checkpoint(None);
                    return Ok(());
                }
                continue;
            }

            let family =
                match RotationFamily::enumerate(&self.config.directory, &self.config.base_name) {
                    Ok(family) => {
                        self.poll_succeeded();
                        family
                    }
                    Err(e) => {
                        self.poll_failed(e)?;
                        if self.wait_poll() {
                            self.final_checkpoint(None);
                            return Ok(());
                        }
                        continue;
                    }
                };

            let plan = ResumePlan::compute(self.progress.as_ref(), &family);
            if plan.is_empty() {
                self.set_state(EngineState::Reconnecting);
                if self.wait_poll() {
                    self.final_checkpoint(None);
                    return Ok(());
                }
                continue;
            }

            if let Some(loss) = plan.data_loss() {
                let drained = self
                    .drained
                    .is_some_and(|d| d.file_id == loss.file_id && d.position == loss.position);
                if drained {
                    debug!(
                        file_id = %loss.file_id,
                        "Fully drained file removed from the family"
                    );
                } else {
                    warn!(
                        file_id = %loss.file_id,
                        position = loss.position,
                        "Checkpointed file no longer exists, its unread data was skipped"
                    );
                    self.stats.record_data_loss();
                }
                let first = &plan.segments()[0].member;
                self.progress = Some(Tombstone::at(first.file_id(), 0, first.modified()));
            }

            self.set_state(if plan.needs_replay() {
                EngineState::Replaying
            } else {
                EngineState::Following
            });

            let mut flow = Flow::Continue;
            for segment in plan.segments() {
                if segment.truncated {
                    warn!(
                        path = ?segment.member.path(),
                        file_id = %segment.member.file_id(),
                        size = segment.member.len(),
                        "File is shorter than the checkpointed position, reading from the start"
                    );
                    self.stats.record_truncation();
                } else if segment.older_than_checkpoint {
                    warn!(
                        path = ?segment.member.path(),
                        file_id = %segment.member.file_id(),
                        offset = segment.start,
                        "File was modified before the checkpointed modification time, its identity may have been reused"
                    );
                }

                flow = if segment.member.is_live() {
                    self.follow(segment)?
                } else {
                    self.drain(segment)?
                };
                if !matches!(flow, Flow::Continue) {
                    break;
                }
            }

            match flow {
                Flow::Cancelled => return Ok(()),
                Flow::Rescan => continue,
                Flow::Continue => {
                    // Caught up on rotated files but the live file is missing
                    self.set_state(EngineState::Reconnecting);
                    if self.wait_poll() {
                        self.final_checkpoint(None);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Settle where reading starts: the stored tombstone, or the current end
    /// of the live file when there is none. `Ok(false)` when the tombstone or
    /// the live file could not be examined and resolution should be retried
    /// after a poll interval.
    fn resolve_start(&mut self) -> Result<bool> {
        match self.checkpointer.store().load() {
            Ok(tombstone) => {
                info!(
                    file_id = %tombstone.file_id,
                    position = tombstone.position,
                    checkpointed_at = %tombstone.checkpointed_at,
                    "Resuming from tombstone"
                );
                self.progress = Some(tombstone);
                return Ok(true);
            }
            Err(Error::Decode(reason)) => {
                warn!(
                    "Tombstone {} is unreadable, starting fresh: {}",
                    self.checkpointer.store().describe(),
                    reason
                );
            }
            Err(e) if e.is_not_found() => {
                info!("No tombstone found, starting fresh");
            }
            Err(e) => {
                self.poll_failed(e)?;
                return Ok(false);
            }
        }

        let live_path = self.config.live_path();
        match Tombstone::from_path(&live_path) {
            Ok(tombstone) => {
                info!(
                    path = ?live_path,
                    position = tombstone.position,
                    "Starting at the end of the live file"
                );
                self.progress = Some(tombstone);
                // Made durable now so a restart does not skip lines appended meanwhile
                self.checkpointer.checkpoint(&tombstone, &live_path)?;
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                info!(
                    path = ?live_path,
                    "Live file does not exist yet, it will be read from the start"
                );
                self.progress = None;
                Ok(true)
            }
            Err(e) => {
                self.poll_failed(e)?;
                Ok(false)
            }
        }
    }

    /// Read a rotated file to its end.
    fn drain(&mut self, segment: &ReplaySegment) -> Result<Flow> {
        let Some(mut reader) = self.open_segment(segment)? else {
            return self.rescan_later();
        };
        debug!(
            path = ?reader.path(),
            file_id = %segment.member.file_id(),
            offset = segment.start,
            "Replaying rotated file"
        );

        if let Pump::Cancelled = self.read_to_end(&mut reader, true)? {
            self.final_checkpoint(Some(&reader));
            return Ok(Flow::Cancelled);
        }
        if !self.checkpoint_until_durable(&reader)? {
            self.final_checkpoint(Some(&reader));
            return Ok(Flow::Cancelled);
        }

        self.stats.record_file_drained();
        self.drained = self.progress;
        debug!(
            path = ?reader.path(),
            offset = reader.offset(),
            "Drained rotated file"
        );
        Ok(Flow::Continue)
    }

    /// Tail the live file until it is rotated or the run is cancelled.
    fn follow(&mut self, segment: &ReplaySegment) -> Result<Flow> {
        let Some(mut reader) = self.open_segment(segment)? else {
            return self.rescan_later();
        };
        let file_id = segment.member.file_id();
        let live_path = self.config.live_path();
        info!(
            path = ?live_path,
            file_id = %file_id,
            offset = segment.start,
            "Opened live file"
        );

        loop {
            match self.pump(&mut reader, false)? {
                Pump::Cancelled => {
                    self.final_checkpoint(Some(&reader));
                    return Ok(Flow::Cancelled);
                }
                Pump::Eof => self.set_state(EngineState::Following),
                Pump::Blocked => {}
            }

            if self.wait_poll() {
                self.final_checkpoint(Some(&reader));
                return Ok(Flow::Cancelled);
            }

            if let Ok(metadata) = reader.metadata() {
                if metadata.len() < reader.offset() {
                    warn!(
                        path = ?live_path,
                        file_id = %file_id,
                        offset = reader.offset(),
                        size = metadata.len(),
                        "Live file truncated, reading from the start"
                    );
                    self.stats.record_truncation();
                    reader.seek_to(0)?;
                    continue;
                }
            }

            match FileId::from_path(&live_path) {
                Ok(current) if current == file_id => {
                    self.poll_succeeded();
                    continue;
                }
                Ok(current) => {
                    info!(old = %file_id, new = %current, "Live file rotated");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!(file_id = %file_id, "Live file rotated, no replacement yet");
                }
                Err(e) => {
                    self.poll_failed(e.into())?;
                    continue;
                }
            }
            self.poll_succeeded();
            self.stats.record_rotation();

            // The old handle still reaches the rotated file; take what was
            // written before the rename, including an unterminated last line
            if let Pump::Cancelled = self.read_to_end(&mut reader, true)? {
                self.final_checkpoint(Some(&reader));
                return Ok(Flow::Cancelled);
            }
            if !self.checkpoint_until_durable(&reader)? {
                self.final_checkpoint(Some(&reader));
                return Ok(Flow::Cancelled);
            }
            self.stats.record_file_drained();
            self.drained = self.progress;
            return Ok(Flow::Rescan);
        }
    }

    /// Open a planned segment, making sure it is still the scanned file.
    fn open_segment(&mut self, segment: &ReplaySegment) -> Result<Option<LineReader>> {
        let path = segment.member.path();
        let reader = match LineReader::open(&path, segment.start) {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                debug!(path = ?path, "File moved before it could be opened, rescanning");
                return Ok(None);
            }
            Err(e) => {
                self.poll_failed(e)?;
                return Ok(None);
            }
        };

        match reader.file_id() {
            Ok(id) if id == segment.member.file_id() => {}
            Ok(id) => {
                debug!(
                    path = ?path,
                    expected = %segment.member.file_id(),
                    found = %id,
                    "File replaced before it could be opened, rescanning"
                );
                return Ok(None);
            }
            Err(e) => {
                self.poll_failed(e)?;
                return Ok(None);
            }
        }

        self.progress = Some(Tombstone::at(
            segment.member.file_id(),
            segment.start,
            segment.member.modified(),
        ));
        Ok(Some(reader))
    }

    /// Deliver lines until end of data, checkpointing as they become due.
    fn pump(&mut self, reader: &mut LineReader, include_partial: bool) -> Result<Pump> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Pump::Cancelled);
            }
            if self.checkpointer.is_due() && !self.checkpoint_reader(reader)? {
                return Ok(Pump::Blocked);
            }

            let consumer = &mut self.consumer;
            let checkpointer = &self.checkpointer;
            let cancel = &self.cancel;
            let summary = reader.read_lines(
                include_partial,
                |line| consumer.consume(line),
                |delivered| cancel.is_cancelled() || checkpointer.is_due_after(delivered),
            )?;

            self.checkpointer.record_lines(summary.lines);
            self.stats.record_delivered(summary.lines, summary.bytes);
            if !summary.stopped {
                return Ok(Pump::Eof);
            }
        }
    }

    /// Like `pump`, waiting out checkpoint failures. Never returns `Blocked`.
    fn read_to_end(&mut self, reader: &mut LineReader, include_partial: bool) -> Result<Pump> {
        loop {
            match self.pump(reader, include_partial)? {
                Pump::Blocked => {
                    if self.wait_poll() {
                        return Ok(Pump::Cancelled);
                    }
                }
                other => return Ok(other),
            }
        }
    }

    /// Checkpoint the reader's position. `Ok(false)` while writes are failing.
    fn checkpoint_reader(&mut self, reader: &LineReader) -> Result<bool> {
        let metadata = reader.metadata()?;
        let tombstone = Tombstone::at(
            FileId::from_metadata(&metadata),
            reader.offset(),
            metadata.modified()?,
        );
        self.progress = Some(tombstone);
        if self.checkpointer.is_durable(&tombstone) {
            return Ok(true);
        }

        self.consumer.flush()?;
        self.checkpointer.checkpoint(&tombstone, reader.path())
    }

    /// Returns false if cancelled before the checkpoint landed.
    fn checkpoint_until_durable(&mut self, reader: &LineReader) -> Result<bool> {
        loop {
            if self.checkpoint_reader(reader)? {
                return Ok(true);
            }
            if self.wait_poll() {
                return Ok(false);
            }
        }
    }

    fn final_checkpoint(&mut self, reader: Option<&LineReader>) {
        debug!("Performing final checkpoint");
        let result = match reader {
            Some(reader) => self.checkpoint_reader(reader),
            None => self.checkpointer.retry(),
        };
        match result {
            Ok(true) => info!("Final checkpoint completed successfully"),
            Ok(false) => warn!("Final checkpoint could not be written"),
            Err(e) => warn!("Failed to perform final checkpoint: {}", e),
        }
    }

    fn rescan_later(&mut self) -> Result<Flow> {
        if self.wait_poll() {
            self.final_checkpoint(None);
            return Ok(Flow::Cancelled);
        }
        Ok(Flow::Rescan)
    }

    /// Sleep one poll interval. Returns true if cancelled meanwhile.
    fn wait_poll(&self) -> bool {
        let deadline = Instant::now() + self.config.poll_interval;
        loop {
            if self.cancel.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    fn poll_succeeded(&mut self) {
        if self.poll_first_failure.take().is_some() {
            debug!("Log directory and tombstone access succeeded after previous failures");
        }
    }

    fn poll_failed(&mut self, e: Error) -> Result<()> {
        let first_failure = *self.poll_first_failure.get_or_insert_with(Instant::now);
        let failure_duration = first_failure.elapsed();

        if failure_duration >= self.config.max_poll_failure_duration {
            error!(
                "Log directory or tombstone failures persisted for {:?}, exiting: {}",
                failure_duration, e
            );
            return Err(Error::DirectoryUnavailable {
                path: self.config.directory.clone(),
                reason: e.to_string(),
            });
        }

        warn!(
            "Log directory or tombstone access failed (failures started {:?} ago): {}",
            failure_duration, e
        );
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) {
        self.stats.set_state(state);
        // Bootstrapping happens on every rescan; only report where it lands
        if state != EngineState::Bootstrapping && self.reported_state != Some(state) {
            info!(state = %state, "Harvester state changed");
            self.reported_state = Some(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tombstone::MemoryTombstoneStore;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Lines = Arc<Mutex<Vec<Vec<u8>>>>;

    fn config(dir: &TempDir) -> HarvesterConfig {
        let mut config = HarvesterConfig::new(dir.path(), "event_log")
            .with_tombstone_path(dir.path().join("tombstone.json"))
            .with_poll_interval(Duration::from_millis(10))
            .with_checkpoint_interval(Duration::from_millis(20));
        config.lock_tombstone = false;
        config
    }

    fn collector() -> (Lines, impl FnMut(&[u8]) -> Result<()> + Send + 'static) {
        let lines: Lines = Arc::default();
        let sink = lines.clone();
        (lines, move |line: &[u8]| -> Result<()> {
            sink.lock().unwrap().push(line.to_vec());
            Ok(())
        })
    }

    fn wait_for(lines: &Lines, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while lines.lock().unwrap().len() < n {
            assert!(Instant::now() < deadline, "timed out waiting for {} lines", n);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn append(path: &std::path::Path, data: &str) {
        let mut f = OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    /// Store whose first `failures` loads fail like a flaky disk.
    #[derive(Clone, Default)]
    struct FlakyLoadStore {
        inner: MemoryTombstoneStore,
        state: Arc<Mutex<(u32, u32)>>,
    }

    impl FlakyLoadStore {
        fn failing(failures: u32) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().0 = failures;
            store
        }

        fn loads(&self) -> u32 {
            self.state.lock().unwrap().1
        }
    }

    impl TombstoneStore for FlakyLoadStore {
        fn load(&self) -> Result<Tombstone> {
            let mut state = self.state.lock().unwrap();
            state.1 += 1;
            if state.0 > 0 {
                state.0 -= 1;
                return Err(Error::Io(std::io::Error::other("transient EIO")));
            }
            self.inner.load()
        }

        fn store(&self, tombstone: &Tombstone) -> Result<()> {
            self.inner.store(tombstone)
        }

        fn describe(&self) -> String {
            "<flaky>".to_string()
        }
    }

    #[test]
    fn test_transient_tombstone_read_error_is_retried() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("event_log");
        fs::write(&live, "history\n").unwrap();

        let store = FlakyLoadStore::failing(1);
        let harvester = Harvester::with_store(config(&dir), store.clone()).unwrap();
        let stats = harvester.stats();
        let (lines, consumer) = collector();
        let cancel = CancellationToken::new();
        let handle = harvester.spawn(consumer, cancel.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while stats.state() != EngineState::Following {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        append(&live, "a\n");
        wait_for(&lines, 1);

        cancel.cancel();
        handle.join().unwrap().unwrap();

        assert_eq!(store.loads(), 2);
        assert_eq!(*lines.lock().unwrap(), vec![b"a".to_vec()]);
        assert_eq!(store.inner.current().unwrap().position, 10);
    }

    #[test]
    fn test_persistent_tombstone_read_error_is_fatal_after_threshold() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("event_log"), "x\n").unwrap();
        let mut config = config(&dir);
        config.max_poll_failure_duration = Duration::from_millis(50);

        let store = FlakyLoadStore::failing(u32::MAX);
        let harvester = Harvester::with_store(config, store.clone()).unwrap();
        let result = harvester.run(|_: &[u8]| -> Result<()> { Ok(()) }, CancellationToken::new());

        assert!(matches!(result, Err(Error::DirectoryUnavailable { .. })));
        assert!(store.loads() > 1);
        assert!(store.inner.current().is_none());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Harvester::with_store(HarvesterConfig::default(), MemoryTombstoneStore::new());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_follows_and_checkpoints_on_cancel() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("event_log");
        fs::write(&live, "history\n").unwrap();

        let store = MemoryTombstoneStore::new();
        let harvester = Harvester::with_store(config(&dir), store.clone()).unwrap();
        let stats = harvester.stats();
        let (lines, consumer) = collector();
        let cancel = CancellationToken::new();
        let handle = harvester.spawn(consumer, cancel.clone()).unwrap();

        // Startup tombstone points past the history
        let deadline = Instant::now() + Duration::from_secs(10);
        while stats.state() != EngineState::Following {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        append(&live, "a\nb\npartial");
        wait_for(&lines, 2);

        cancel.cancel();
        handle.join().unwrap().unwrap();

        assert_eq!(*lines.lock().unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
        let tombstone = store.current().unwrap();
        assert_eq!(tombstone.position, 12);
        assert_eq!(tombstone.file_id, FileId::from_path(&live).unwrap());
        assert_eq!(stats.snapshot().lines_delivered, 2);
    }

    #[test]
    fn test_waits_for_live_file() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("event_log");

        let harvester = Harvester::with_store(config(&dir), MemoryTombstoneStore::new()).unwrap();
        let stats = harvester.stats();
        let (lines, consumer) = collector();
        let cancel = CancellationToken::new();
        let handle = harvester.spawn(consumer, cancel.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while stats.state() != EngineState::Reconnecting {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        // Created after startup, so read from the beginning
        append(&live, "first\nsecond\n");
        wait_for(&lines, 2);

        cancel.cancel();
        handle.join().unwrap().unwrap();
        assert_eq!(lines.lock().unwrap()[0], b"first");
    }

    #[test]
    fn test_consumer_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("event_log");
        fs::write(&live, "").unwrap();

        let store = MemoryTombstoneStore::with_tombstone(Tombstone::at(
            FileId::from_path(&live).unwrap(),
            0,
            std::time::SystemTime::now(),
        ));
        fs::write(&live, "boom\n").unwrap();

        let harvester = Harvester::with_store(config(&dir), store).unwrap();
        let result = harvester.run(
            |_line: &[u8]| -> Result<()> { Err(Error::Consumer("downstream closed".to_string())) },
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::Consumer(_))));
    }

    #[test]
    fn test_missing_directory_is_fatal_after_threshold() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.directory = dir.path().join("missing");
        config.max_poll_failure_duration = Duration::ZERO;

        let harvester = Harvester::with_store(config, MemoryTombstoneStore::new()).unwrap();
        let result = harvester.run(|_: &[u8]| -> Result<()> { Ok(()) }, CancellationToken::new());
        assert!(matches!(result, Err(Error::DirectoryUnavailable { .. })));
    }

    #[test]
    fn test_second_instance_is_locked_out() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("event_log"), "").unwrap();
        let mut config = config(&dir);
        config.lock_tombstone = true;

        let _held = TombstoneLock::acquire(&config.tombstone_path).unwrap();
        let harvester = Harvester::new(config).unwrap();
        let result = harvester.run(|_: &[u8]| -> Result<()> { Ok(()) }, CancellationToken::new());
        assert!(matches!(result, Err(Error::Locked(_))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("event_log"), "x\n").unwrap();

        let store = MemoryTombstoneStore::new();
        let harvester = Harvester::with_store(config(&dir), store.clone()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        harvester.run(|_: &[u8]| -> Result<()> { Ok(()) }, cancel).unwrap();
        assert_eq!(store.current().unwrap().position, 2);
    }
}
