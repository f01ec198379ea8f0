// SPDX-License-Identifier: Apache-2.0

//! File identity based on device + inode.
//!
//! Rotation renames files, so a path says nothing about which file it is.
//! The inode survives a rename and is the only way to recognize the same file
//! after the rotation writer has moved it to a numbered sibling.

use serde::{Deserialize, Serialize};
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// A unique identifier for a file: device ID + inode number.
///
/// Stable across renames. Two paths that are hard links to the same file
/// share a `FileId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    /// Device ID
    dev: u64,
    /// Inode number
    ino: u64,
}

impl FileId {
    /// Create a FileId from raw device and inode values.
    /// Used for loading persisted state.
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Create a FileId from metadata that has already been fetched.
    ///
    /// Performs no I/O, so a directory scan can resolve identities from the
    /// metadata it collected without reopening each file.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Create a FileId from an open file handle.
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Create a FileId from a path.
    ///
    /// Follows symlinks, so the identity is that of the file the path
    /// ultimately names.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Get the device ID.
    pub fn dev(&self) -> u64 {
        self.dev
    }

    /// Get the inode number.
    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// Compare identities, treating a zero device as unknown.
    ///
    /// Legacy checkpoints recorded only the inode; those match on inode alone.
    pub fn matches(&self, other: &FileId) -> bool {
        if self.dev == 0 || other.dev == 0 {
            self.ino == other.ino
        } else {
            self == other
        }
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}
