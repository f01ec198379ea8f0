// SPDX-License-Identifier: Apache-2.0

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};
use portable_atomic::{AtomicU8, AtomicU64, Ordering};

use super::state::EngineState;

pub fn get_meter() -> Meter {
    global::meter("rotail")
}

/// Counters describing a harvester run, shared with the host.
///
/// Each event is also recorded on the global OpenTelemetry meter, which is a
/// no-op unless the host installs a meter provider.
pub struct EngineStats {
    state: AtomicU8,
    lines_delivered: AtomicU64,
    bytes_delivered: AtomicU64,
    files_drained: AtomicU64,
    checkpoints: AtomicU64,
    checkpoint_failures: AtomicU64,
    rotations: AtomicU64,
    truncations: AtomicU64,
    data_loss_events: AtomicU64,

    lines_counter: Counter<u64>,
    bytes_counter: Counter<u64>,
    checkpoint_counter: Counter<u64>,
    checkpoint_failure_counter: Counter<u64>,
    rotation_counter: Counter<u64>,
    data_loss_counter: Counter<u64>,
    tags: [KeyValue; 1],
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub lines_delivered: u64,
    pub bytes_delivered: u64,
    pub files_drained: u64,
    pub checkpoints: u64,
    pub checkpoint_failures: u64,
    pub rotations: u64,
    pub truncations: u64,
    pub data_loss_events: u64,
}

impl EngineStats {
    pub fn new(base_name: &str) -> Self {
        let meter = get_meter();
        Self {
            state: AtomicU8::new(EngineState::Bootstrapping as u8),
            lines_delivered: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            files_drained: AtomicU64::new(0),
            checkpoints: AtomicU64::new(0),
            checkpoint_failures: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            truncations: AtomicU64::new(0),
            data_loss_events: AtomicU64::new(0),
            lines_counter: meter
                .u64_counter("rotail_delivered_lines")
                .with_description("Number of log lines handed to the consumer.")
                .with_unit("lines")
                .build(),
            bytes_counter: meter
                .u64_counter("rotail_delivered_bytes")
                .with_description("Number of log bytes consumed, including line terminators.")
                .with_unit("bytes")
                .build(),
            checkpoint_counter: meter
                .u64_counter("rotail_checkpoints")
                .with_description("Number of tombstone writes that succeeded.")
                .build(),
            checkpoint_failure_counter: meter
                .u64_counter("rotail_checkpoint_failures")
                .with_description("Number of tombstone writes that failed.")
                .build(),
            rotation_counter: meter
                .u64_counter("rotail_rotations")
                .with_description("Number of rotations of the live file observed while following.")
                .build(),
            data_loss_counter: meter
                .u64_counter("rotail_data_loss_events")
                .with_description(
                    "Number of times the checkpointed file was gone and its unread data skipped.",
                )
                .build(),
            tags: [KeyValue::new("log", base_name.to_string())],
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            lines_delivered: self.lines_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            files_drained: self.files_drained.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            truncations: self.truncations.load(Ordering::Relaxed),
            data_loss_events: self.data_loss_events.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, lines: u64, bytes: u64) {
        if lines == 0 {
            return;
        }
        self.lines_delivered.fetch_add(lines, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes, Ordering::Relaxed);
        self.lines_counter.add(lines, &self.tags);
        self.bytes_counter.add(bytes, &self.tags);
    }

    pub(crate) fn record_file_drained(&self) {
        self.files_drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
        self.checkpoint_counter.add(1, &self.tags);
    }

    pub(crate) fn record_checkpoint_failure(&self) {
        self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
        self.checkpoint_failure_counter.add(1, &self.tags);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        self.rotation_counter.add(1, &self.tags);
    }

    pub(crate) fn record_truncation(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_data_loss(&self) {
        self.data_loss_events.fetch_add(1, Ordering::Relaxed);
        self.data_loss_counter.add(1, &self.tags);
    }
}

impl std::fmt::Debug for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineStats")
            .field("state", &self.state())
            .field("counters", &self.snapshot())
            .finish()
    }
}
