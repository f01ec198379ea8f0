// SPDX-License-Identifier: Apache-2.0

//! Reconciling a stale tombstone with the rotation family on disk.

use chrono::{DateTime, Utc};

use crate::family::{RotationFamily, RotationMember};
use crate::identity::FileId;
use crate::tombstone::Tombstone;

/// One file to read and where to start reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySegment {
    pub member: RotationMember,
    /// Byte offset to start at
    pub start: u64,
    /// The remembered position was past the end of the file, so reading
    /// restarts at 0
    pub truncated: bool,
    /// The file's modification time is earlier than the one recorded in the
    /// tombstone, which a file that was only appended to cannot have
    pub older_than_checkpoint: bool,
}

impl ReplaySegment {
    /// Bytes between `start` and the member's size at scan time.
    pub fn remaining(&self) -> u64 {
        self.member.len().saturating_sub(self.start)
    }
}

/// The remembered file is gone from the family; whatever was left unread in
/// it has been skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLoss {
    pub file_id: FileId,
    pub position: u64,
}

/// Ordered list of files to read, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePlan {
    segments: Vec<ReplaySegment>,
    data_loss: Option<DataLoss>,
}

impl ResumePlan {
    /// Work out what to read given the last checkpoint and the family as
    /// scanned now. Pure: the same inputs always give the same plan.
    ///
    /// - The remembered file and every younger member are read, the first
    ///   from the remembered position and the rest from 0.
    /// - A remembered position past the end of the file restarts it at 0.
    /// - A remembered file whose modification time went backwards is flagged;
    ///   it is still resumed at the remembered position.
    /// - If the remembered file is no longer in the family the live file is
    ///   read from 0 and the plan carries a [`DataLoss`].
    /// - Without any tombstone the live file is read from 0.
    pub fn compute(tombstone: Option<&Tombstone>, family: &RotationFamily) -> Self {
        let family = family.clone().sorted();

        let Some(tombstone) = tombstone else {
            return Self {
                segments: Self::live_from_start(&family),
                data_loss: None,
            };
        };

        match family.slice_from(tombstone.file_id) {
            Some(members) => {
                let segments = members
                    .iter()
                    .enumerate()
                    .map(|(idx, member)| {
                        if idx > 0 {
                            return ReplaySegment {
                                member: member.clone(),
                                start: 0,
                                truncated: false,
                                older_than_checkpoint: false,
                            };
                        }
                        let truncated = tombstone.position > member.len();
                        let modified: DateTime<Utc> = member.modified().into();
                        ReplaySegment {
                            member: member.clone(),
                            start: if truncated { 0 } else { tombstone.position },
                            truncated,
                            older_than_checkpoint: modified < tombstone.log_modified_at,
                        }
                    })
                    .collect();
                Self {
                    segments,
                    data_loss: None,
                }
            }
            None => Self {
                segments: Self::live_from_start(&family),
                data_loss: Some(DataLoss {
                    file_id: tombstone.file_id,
                    position: tombstone.position,
                }),
            },
        }
    }

    fn live_from_start(family: &RotationFamily) -> Vec<ReplaySegment> {
        family
            .live()
            .map(|live| ReplaySegment {
                member: live.clone(),
                start: 0,
                truncated: false,
                older_than_checkpoint: false,
            })
            .into_iter()
            .collect()
    }

    pub fn segments(&self) -> &[ReplaySegment] {
        &self.segments
    }

    pub fn data_loss(&self) -> Option<DataLoss> {
        self.data_loss
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when there is anything to catch up on before following the
    /// live file: more than one file, or unread data in the first one.
    pub fn needs_replay(&self) -> bool {
        match self.segments.as_slice() {
            [] => false,
            [only] => only.remaining() > 0 || !only.member.is_live(),
            _ => true,
        }
    }

    /// True when the last segment is the live file.
    pub fn ends_live(&self) -> bool {
        self.segments.last().is_some_and(|s| s.member.is_live())
    }
}
