// SPDX-License-Identifier: Apache-2.0

//! Rotation family enumeration.
//!
//! A rotation family is the live log file (`event_log`) plus every numbered
//! sibling the rotation writer has renamed it to (`event_log.1`,
//! `event_log.2`, ...). Enumeration only reports what exists; replay order is
//! applied separately with [`RotationFamily::sort_oldest_first`].

use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::Result;
use crate::identity::FileId;

/// Age rank of a family member. 0 is the live file, larger numbers are older.
///
/// The ordering is replay order: higher rotation numbers sort first and the
/// live generation always sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The live, actively written file.
    pub const LIVE: Generation = Generation(0);

    /// Generation for a rotation number. Returns `None` for 0, which is
    /// reserved for the live file.
    pub fn rotated(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    /// Parse the generation of `name` within the family named `base`.
    ///
    /// Returns `None` when `name` is not a family member: a different name, an
    /// empty or non-numeric suffix, a zero or zero-padded suffix, or a number
    /// too large to represent.
    pub fn parse(base: &str, name: &str) -> Option<Self> {
        if name == base {
            return Some(Self::LIVE);
        }

        let suffix = name.strip_prefix(base)?.strip_prefix('.')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // "event_log.01" would alias "event_log.1"
        if suffix.starts_with('0') {
            return None;
        }

        suffix.parse::<u32>().ok().and_then(Self::rotated)
    }

    /// The rotation number (0 for the live file).
    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn is_live(&self) -> bool {
        self.0 == 0
    }
}

impl Ord for Generation {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            (a, b) => b.cmp(&a),
        }
    }
}

impl PartialOrd for Generation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical file in a rotation family, as seen by a single directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationMember {
    /// Containing directory
    dir: PathBuf,
    /// File name within `dir`
    name: String,
    /// Size in bytes at scan time
    len: u64,
    /// Modification time at scan time
    modified: SystemTime,
    /// Identity resolved from the scanned metadata
    file_id: FileId,
    generation: Generation,
}

impl RotationMember {
    /// Build a member from metadata collected during a scan. No I/O.
    pub fn from_metadata(
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        generation: Generation,
        metadata: &Metadata,
    ) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            file_id: FileId::from_metadata(metadata),
            generation,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.generation.is_live()
    }
}

/// The members of one rotation family found by a directory scan.
#[derive(Debug, Clone, Default)]
pub struct RotationFamily {
    members: Vec<RotationMember>,
}

impl RotationFamily {
    /// Build a family from already collected members.
    pub fn from_members(members: Vec<RotationMember>) -> Self {
        Self { members }
    }

    /// Scan `dir` for `base` and its numbered siblings.
    ///
    /// The result is in directory order. Entries that vanish between listing
    /// and `stat`, and entries that are not regular files, are skipped.
    pub fn enumerate(dir: impl AsRef<Path>, base: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let mut members = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Failed to read directory entry in {:?}: {}", dir, e);
                    continue;
                }
            };

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(generation) = Generation::parse(base, name) else {
                continue;
            };

            let metadata = match entry_metadata(&entry) {
                Ok(m) => m,
                Err(e) => {
                    debug!("Skipping {:?}, metadata unavailable: {}", entry.path(), e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            members.push(RotationMember::from_metadata(
                dir, name, generation, &metadata,
            ));
        }

        Ok(Self { members })
    }

    /// Order members for replay: oldest rotation first, live file last.
    pub fn sort_oldest_first(&mut self) {
        self.members.sort_by_key(|m| m.generation);
    }

    /// Consume and return the family in replay order.
    pub fn sorted(mut self) -> Self {
        self.sort_oldest_first();
        self
    }

    /// The members from the one identified by `file_id` through the end of the
    /// family, in the family's current order.
    ///
    /// On a sorted family this is the remembered file followed by every younger
    /// rotation, ending with the live file. `None` when no member has that
    /// identity (it has been removed by retention).
    pub fn slice_from(&self, file_id: FileId) -> Option<&[RotationMember]> {
        self.members
            .iter()
            .position(|m| m.file_id.matches(&file_id))
            .map(|idx| &self.members[idx..])
    }

    /// The member with the given identity, if present.
    pub fn find(&self, file_id: FileId) -> Option<&RotationMember> {
        self.members.iter().find(|m| m.file_id.matches(&file_id))
    }

    /// The live (generation 0) member, if it exists yet.
    pub fn live(&self) -> Option<&RotationMember> {
        self.members.iter().find(|m| m.is_live())
    }

    pub fn members(&self) -> &[RotationMember] {
        &self.members
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RotationMember> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<'a> IntoIterator for &'a RotationFamily {
    type Item = &'a RotationMember;
    type IntoIter = std::slice::Iter<'a, RotationMember>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

// Symlinked members resolve to their target, matching FileId::from_path.
fn entry_metadata(entry: &fs::DirEntry) -> std::io::Result<Metadata> {
    let metadata = entry.metadata()?;
    if metadata.file_type().is_symlink() {
        fs::metadata(entry.path())
    } else {
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rotation_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in [
            "event_log.3",
            "event_log",
            "event_log.1",
            "event_log.4",
            "event_log.2",
        ] {
            fs::write(dir.path().join(name), format!("{}\n", name)).unwrap();
        }
        dir
    }

    fn names(family: &RotationFamily) -> Vec<&str> {
        family.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_generation_parse() {
        assert_eq!(Generation::parse("event_log", "event_log"), Some(Generation::LIVE));
        assert_eq!(
            Generation::parse("event_log", "event_log.12"),
            Generation::rotated(12)
        );
        assert_eq!(Generation::parse("event_log", "event_log."), None);
        assert_eq!(Generation::parse("event_log", "event_log.bak"), None);
        assert_eq!(Generation::parse("event_log", "event_log.1.gz"), None);
        assert_eq!(Generation::parse("event_log", "event_log.0"), None);
        assert_eq!(Generation::parse("event_log", "event_log.01"), None);
        assert_eq!(Generation::parse("event_log", "event_log.+1"), None);
        assert_eq!(Generation::parse("event_log", "event_log.99999999999"), None);
        assert_eq!(Generation::parse("event_log", "event_log_old"), None);
        assert_eq!(Generation::parse("event_log", "other_log.1"), None);
        assert_eq!(Generation::parse("event_log", "event_lo"), None);
    }

    #[test]
    fn test_generation_order() {
        let live = Generation::LIVE;
        let g1 = Generation::rotated(1).unwrap();
        let g2 = Generation::rotated(2).unwrap();

        assert!(g2 < g1);
        assert!(g1 < live);
        assert!(g2 < live);
        assert_eq!(live.cmp(&live), Ordering::Equal);

        let mut gens = vec![g1, live, g2];
        gens.sort();
        assert_eq!(gens, vec![g2, g1, live]);
    }

    #[test]
    fn test_enumerate_family() {
        let dir = rotation_dir();
        fs::write(dir.path().join("unrelated.log"), "x").unwrap();
        fs::write(dir.path().join("event_log.old"), "x").unwrap();
        fs::create_dir(dir.path().join("event_log.9")).unwrap();

        let family = RotationFamily::enumerate(dir.path(), "event_log").unwrap();
        assert_eq!(family.len(), 5);
        for member in &family {
            assert_eq!(member.dir(), dir.path());
            assert!(member.name().starts_with("event_log"));
            assert_eq!(member.len(), member.name().len() as u64 + 1);
        }
        assert_eq!(family.live().unwrap().name(), "event_log");
    }

    #[test]
    fn test_sort_oldest_first() {
        let dir = rotation_dir();
        let family = RotationFamily::enumerate(dir.path(), "event_log")
            .unwrap()
            .sorted();

        assert_eq!(
            names(&family),
            vec![
                "event_log.4",
                "event_log.3",
                "event_log.2",
                "event_log.1",
                "event_log"
            ]
        );
    }

    #[test]
    fn test_slice_from() {
        let dir = rotation_dir();
        let family = RotationFamily::enumerate(dir.path(), "event_log")
            .unwrap()
            .sorted();

        let target = family.members()[2].file_id();
        let sliced = family.slice_from(target).unwrap();
        assert_eq!(sliced.len(), 3);
        assert_eq!(sliced[0].file_id(), target);
        assert_eq!(sliced[0].name(), "event_log.2");
        assert_eq!(sliced[1].name(), "event_log.1");
        assert_eq!(sliced[2].name(), "event_log");
    }

    #[test]
    fn test_slice_from_every_index() {
        let dir = rotation_dir();
        let family = RotationFamily::enumerate(dir.path(), "event_log")
            .unwrap()
            .sorted();

        for (k, member) in family.iter().enumerate() {
            let sliced = family.slice_from(member.file_id()).unwrap();
            assert_eq!(sliced, &family.members()[k..]);
        }
    }

    #[test]
    fn test_slice_from_missing_identity() {
        let dir = rotation_dir();
        let family = RotationFamily::enumerate(dir.path(), "event_log")
            .unwrap()
            .sorted();

        let other = TempDir::new().unwrap();
        let stray = other.path().join("stray");
        fs::write(&stray, "x").unwrap();

        assert!(family.slice_from(FileId::from_path(&stray).unwrap()).is_none());
    }

    #[test]
    fn test_enumerate_empty_directory() {
        let dir = TempDir::new().unwrap();
        let family = RotationFamily::enumerate(dir.path(), "event_log").unwrap();
        assert!(family.is_empty());
        assert!(family.live().is_none());
    }

    #[test]
    fn test_enumerate_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = RotationFamily::enumerate(dir.path().join("missing"), "event_log");
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn test_rotated_only_family_has_no_live() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("event_log.1"), "a\n").unwrap();
        let family = RotationFamily::enumerate(dir.path(), "event_log").unwrap();
        assert_eq!(family.len(), 1);
        assert!(family.live().is_none());
    }

    #[test]
    fn test_member_identity_matches_path() {
        let dir = rotation_dir();
        let family = RotationFamily::enumerate(dir.path(), "event_log").unwrap();
        for member in &family {
            assert_eq!(member.file_id(), FileId::from_path(member.path()).unwrap());
        }
    }
}
