// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Phase of the harvester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineState {
    /// Loading the tombstone, scanning the family and planning
    Bootstrapping = 0,
    /// Catching up on rotated files or unread data
    Replaying = 1,
    /// Tailing the live file
    Following = 2,
    /// The live file is missing; waiting for it to reappear
    Reconnecting = 3,
}

impl EngineState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineState::Replaying,
            2 => EngineState::Following,
            3 => EngineState::Reconnecting,
            _ => EngineState::Bootstrapping,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Bootstrapping => "bootstrapping",
            EngineState::Replaying => "replaying",
            EngineState::Following => "following",
            EngineState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}
