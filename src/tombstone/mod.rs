// SPDX-License-Identifier: Apache-2.0

//! Durable checkpoint of how much of which file has been delivered.
//!
//! A tombstone records the identity of the file being tracked, the byte
//! position already delivered from it, and timestamps. It is written with an
//! atomic replace so a restarting process sees either the previous or the new
//! checkpoint, never a mix.

mod lock;
mod schema;
mod store;

pub use lock::TombstoneLock;
pub use schema::{LegacyTombstone, PersistedTombstoneV1, TOMBSTONE_VERSION, decode};
pub use store::{JsonTombstoneStore, MemoryTombstoneStore, TombstoneStore};

use std::fs::File;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::identity::FileId;

/// Last known read position in a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    /// Bytes of the identified file already delivered
    pub position: u64,
    /// Identity of the tracked file
    pub file_id: FileId,
    /// Modification time of the tracked file when the checkpoint was taken.
    /// A matched file modified earlier than this is reported on resume as a
    /// possibly reused identity.
    pub log_modified_at: DateTime<Utc>,
    /// When the checkpoint was written
    pub checkpointed_at: DateTime<Utc>,
}

impl Tombstone {
    /// Checkpoint `position` bytes of the file `file_id`, stamped now.
    pub fn at(file_id: FileId, position: u64, log_modified_at: SystemTime) -> Self {
        Self {
            position,
            file_id,
            log_modified_at: log_modified_at.into(),
            checkpointed_at: Utc::now(),
        }
    }

    /// Tombstone for starting to tail `path` from its current end.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_file(&file)
    }

    /// Tombstone for starting to tail an open file from its current end.
    pub fn from_file(file: &File) -> Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self::at(
            FileId::from_metadata(&metadata),
            metadata.len(),
            metadata.modified()?,
        ))
    }

    /// Copy with `checkpointed_at` refreshed.
    pub fn restamped(&self) -> Self {
        Self {
            checkpointed_at: Utc::now(),
            ..*self
        }
    }
}
