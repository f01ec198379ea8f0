// SPDX-License-Identifier: Apache-2.0

//! Tombstone storage backends.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Error, Result};

use super::Tombstone;
use super::schema::{PersistedTombstoneV1, decode};

/// Durable home of the single tombstone for one log family.
pub trait TombstoneStore {
    /// Read the last stored tombstone.
    ///
    /// `Error::NotFound` when none has been stored, `Error::Decode` when the
    /// stored copy is unreadable.
    fn load(&self) -> Result<Tombstone>;

    /// Replace the stored tombstone. Readers see the old or the new value,
    /// never a partial one.
    fn store(&self, tombstone: &Tombstone) -> Result<()>;

    /// Like `store`, recording the tracked file's current path alongside for
    /// operators reading the file. The path is never used for matching.
    fn store_annotated(&self, tombstone: &Tombstone, tracked_path: &Path) -> Result<()> {
        let _ = tracked_path;
        self.store(tombstone)
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Tombstone stored as a JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonTombstoneStore {
    path: PathBuf,
}

impl JsonTombstoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, tombstone: &Tombstone, tracked_path: &str) -> Result<()> {
        let persisted = PersistedTombstoneV1::new(tombstone, tracked_path);
        atomic_write(&self.path, &persisted)?;
        debug!(
            file_id = %tombstone.file_id,
            position = tombstone.position,
            "Stored tombstone"
        );
        Ok(())
    }
}

impl TombstoneStore for JsonTombstoneStore {
    fn load(&self) -> Result<Tombstone> {
        let contents = fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(self.path.clone())
            } else {
                Error::Io(e)
            }
        })?;
        decode(&contents)
    }

    fn store(&self, tombstone: &Tombstone) -> Result<()> {
        self.write(tombstone, "")
    }

    fn store_annotated(&self, tombstone: &Tombstone, tracked_path: &Path) -> Result<()> {
        self.write(tombstone, &tracked_path.display().to_string())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write the document atomically (write to temp, then rename)
fn atomic_write(path: &Path, document: &PersistedTombstoneV1) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create tombstone directory: {}", e))
            })?;
        }
    }

    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let result = write_temp(&temp_path, document).and_then(|()| {
        fs::rename(&temp_path, path)
            .map_err(|e| Error::Persistence(format!("failed to rename tombstone file: {}", e)))
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(temp_path: &Path, document: &PersistedTombstoneV1) -> Result<()> {
    let file = File::create(temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)
        .map_err(|e| Error::Persistence(format!("failed to write tombstone: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush tombstone: {}", e)))?;

    // Data must be on disk before the rename makes it visible
    let file = writer
        .into_inner()
        .map_err(|e| Error::Persistence(format!("failed to flush tombstone: {}", e)))?;
    file.sync_all()
        .map_err(|e| Error::Persistence(format!("failed to sync tombstone: {}", e)))?;
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    tombstone: Option<Tombstone>,
    stores: u64,
    fail_next: u32,
}

/// In-memory tombstone store (useful for testing and embedding)
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTombstoneStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTombstoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with a tombstone.
    pub fn with_tombstone(tombstone: Tombstone) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.tombstone = Some(tombstone);
        }
        store
    }

    /// Make the next `n` stores fail.
    pub fn fail_stores(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = n;
        }
    }

    /// The currently stored tombstone.
    pub fn current(&self) -> Option<Tombstone> {
        self.state.lock().ok().and_then(|s| s.tombstone)
    }

    /// Number of successful stores.
    pub fn store_count(&self) -> u64 {
        self.state.lock().map(|s| s.stores).unwrap_or(0)
    }
}

impl TombstoneStore for MemoryTombstoneStore {
    fn load(&self) -> Result<Tombstone> {
        let state = self
            .state
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        state
            .tombstone
            .ok_or_else(|| Error::NotFound(PathBuf::from("<memory>")))
    }

    fn store(&self, tombstone: &Tombstone) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Error::Persistence("injected store failure".to_string()));
        }
        state.tombstone = Some(*tombstone);
        state.stores += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
