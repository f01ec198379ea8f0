// SPDX-License-Identifier: Apache-2.0

//! Rotation-aware log tailer with durable checkpoints.
//!
//! A [`Harvester`] tails a log file that is periodically rotated
//! (`EventLog` → `EventLog.1` → `EventLog.2` …), delivers every line to a
//! [`LineConsumer`] and persists its position as a [`Tombstone`], so that a
//! restart resumes exactly where the previous run stopped, even when the
//! file rotated while nothing was running.

#[cfg(not(unix))]
compile_error!("rotail relies on device and inode numbers and only supports unix targets");

pub mod bounded_channel;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod family;
pub mod identity;
pub mod init;
pub mod reader;
pub mod tombstone;

pub use config::HarvesterConfig;
pub use consumer::{ChannelConsumer, LineConsumer, LineMessage};
pub use engine::{EngineState, EngineStats, EngineStatsSnapshot, Harvester, ResumePlan};
pub use error::{Error, Result};
pub use family::{Generation, RotationFamily, RotationMember};
pub use identity::FileId;
pub use reader::LineReader;
pub use tombstone::{JsonTombstoneStore, MemoryTombstoneStore, Tombstone, TombstoneStore};
