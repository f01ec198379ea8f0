// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Tombstone decode error: {0}")]
    Decode(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tombstone {} is locked by another process", .0.display())]
    Locked(PathBuf),

    #[error("Line consumer failed: {0}")]
    Consumer(String),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Log directory {} unavailable: {reason}", .path.display())]
    DirectoryUnavailable { path: PathBuf, reason: String },

    #[error("Checkpoint writes failing: {0}")]
    CheckpointUnavailable(String),
}

impl Error {
    /// True when the error means "nothing there" rather than "could not look".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
