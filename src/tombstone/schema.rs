// SPDX-License-Identifier: Apache-2.0

//! On-disk schema for the tombstone file.
//!
//! Currently supports:
//! - legacy: flat document written by the previous monitor
//!   (`CurrentPos`, `Date`, `LogLastMod`, `Inode`), no version field
//! - v1: versioned document with device + inode and human-readable path

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::FileId;

use super::Tombstone;

/// Current schema version for the tombstone file
pub const TOMBSTONE_VERSION: u8 = 1;

/// Tombstone as written to disk (v1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTombstoneV1 {
    /// Schema version (always 1 for this format)
    pub version: u8,

    // Human-readable metadata, never used for matching
    /// Path of the tracked file when the checkpoint was taken
    #[serde(default)]
    pub path: String,

    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,

    /// Bytes already delivered from the tracked file
    pub position: u64,
    /// Modification time of the tracked file at checkpoint time
    pub log_modified_at: DateTime<Utc>,
    /// Wall-clock time the checkpoint was written
    pub checkpointed_at: DateTime<Utc>,
}

impl PersistedTombstoneV1 {
    pub fn new(tombstone: &Tombstone, path: impl Into<String>) -> Self {
        Self {
            version: TOMBSTONE_VERSION,
            path: path.into(),
            dev: tombstone.file_id.dev(),
            ino: tombstone.file_id.ino(),
            position: tombstone.position,
            log_modified_at: tombstone.log_modified_at,
            checkpointed_at: tombstone.checkpointed_at,
        }
    }

    pub fn into_tombstone(self) -> Tombstone {
        Tombstone {
            position: self.position,
            file_id: FileId::new(self.dev, self.ino),
            log_modified_at: self.log_modified_at,
            checkpointed_at: self.checkpointed_at,
        }
    }
}

/// Tombstone written by the previous monitor (no version field).
///
/// Only the inode was recorded, so the device is unknown.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyTombstone {
    pub current_pos: i64,
    pub date: DateTime<Utc>,
    pub log_last_mod: DateTime<Utc>,
    pub inode: u64,
}

impl LegacyTombstone {
    pub fn into_tombstone(self) -> Result<Tombstone> {
        let position = u64::try_from(self.current_pos).map_err(|_| {
            Error::Decode(format!("negative position {} in legacy tombstone", self.current_pos))
        })?;

        Ok(Tombstone {
            position,
            file_id: FileId::new(0, self.inode),
            log_modified_at: self.log_last_mod,
            checkpointed_at: self.date,
        })
    }
}

/// Decode a tombstone document in any supported format.
pub fn decode(bytes: &[u8]) -> Result<Tombstone> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;

    match value.get("version") {
        Some(serde_json::Value::Number(n)) if n.as_u64() == Some(TOMBSTONE_VERSION as u64) => {
            let v1: PersistedTombstoneV1 =
                serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
            Ok(v1.into_tombstone())
        }
        Some(other) => Err(Error::Decode(format!(
            "unsupported tombstone version {}",
            other
        ))),
        None => {
            let legacy: LegacyTombstone =
                serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
            legacy.into_tombstone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Tombstone {
        Tombstone {
            position: 500,
            file_id: FileId::new(2049, 131_075),
            log_modified_at: Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            checkpointed_at: Utc.timestamp_opt(1_700_000_100, 987_654_321).unwrap(),
        }
    }

    #[test]
    fn test_v1_document_roundtrip() {
        let persisted = PersistedTombstoneV1::new(&sample(), "/var/log/condor/event_log");
        let json = serde_json::to_vec_pretty(&persisted).unwrap();

        let decoded = decode(&json).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_v1_document_shape() {
        let persisted = PersistedTombstoneV1::new(&sample(), "/var/log/condor/event_log");
        let value = serde_json::to_value(&persisted).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["dev"], 2049);
        assert_eq!(value["ino"], 131_075);
        assert_eq!(value["position"], 500);
        assert_eq!(value["path"], "/var/log/condor/event_log");
        assert!(value["log_modified_at"].is_string());
    }

    #[test]
    fn test_decode_legacy() {
        let legacy = r#"{
            "CurrentPos": 1024,
            "Date": "2015-03-02T10:11:12.123456789-07:00",
            "LogLastMod": "2015-03-02T10:11:00-07:00",
            "Inode": 4242
        }"#;

        let tombstone = decode(legacy.as_bytes()).unwrap();
        assert_eq!(tombstone.position, 1024);
        assert_eq!(tombstone.file_id, FileId::new(0, 4242));
        assert_eq!(
            tombstone.log_modified_at,
            Utc.with_ymd_and_hms(2015, 3, 2, 17, 11, 0).unwrap()
        );
        assert_eq!(tombstone.checkpointed_at.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_decode_legacy_negative_position() {
        let legacy = r#"{"CurrentPos": -1, "Date": "2015-03-02T10:11:12Z",
            "LogLastMod": "2015-03-02T10:11:00Z", "Inode": 1}"#;
        assert!(matches!(decode(legacy.as_bytes()), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json"), Err(Error::Decode(_))));
        assert!(matches!(decode(b""), Err(Error::Decode(_))));
        assert!(matches!(decode(br#"{"version":1}"#), Err(Error::Decode(_))));
        assert!(matches!(decode(br#"{"partial":true}"#), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let mut value = serde_json::to_value(PersistedTombstoneV1::new(&sample(), "")).unwrap();
        value["version"] = serde_json::json!(2);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(decode(&bytes), Err(Error::Decode(_))));
    }
}
