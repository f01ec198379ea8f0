// SPDX-License-Identifier: Apache-2.0

//! Byte-exact line reader with offset tracking.
//!
//! Lines are handed out as raw bytes with only the terminating `\n` removed.
//! The reader's offset always sits just past the last line handed out, so it
//! is the value to checkpoint.

use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::identity::FileId;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Result of a [`LineReader::read_lines`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Lines delivered
    pub lines: u64,
    /// Bytes consumed from the file, including line terminators
    pub bytes: u64,
    /// True when the stop predicate ended the read before end of file
    pub stopped: bool,
}

/// Reads lines from one open file starting at a byte offset.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    line: Vec<u8>,
}

impl LineReader {
    /// Open `path` and position at `offset`.
    pub fn open(path: impl AsRef<Path>, offset: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_file(path, file, offset)
    }

    /// Wrap an already open handle and position at `offset`.
    pub fn from_file(path: impl Into<PathBuf>, mut file: File, offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            path: path.into(),
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            offset,
            line: Vec::new(),
        })
    }

    /// Path the file was opened under. After a rotation the file may live
    /// elsewhere.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last delivered line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Metadata of the open handle (not of whatever the path names now).
    pub fn metadata(&self) -> Result<Metadata> {
        Ok(self.reader.get_ref().metadata()?)
    }

    /// Identity of the open handle.
    pub fn file_id(&self) -> Result<FileId> {
        Ok(FileId::from_file(self.reader.get_ref())?)
    }

    /// Move to `offset`, discarding anything buffered.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Read the next line.
    ///
    /// A final line without a terminator is returned only when
    /// `include_partial` is set; otherwise it is left unread so a later call
    /// sees the completed line. `None` at end of data.
    pub fn next_line(&mut self, include_partial: bool) -> Result<Option<&[u8]>> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(None);
        }

        if self.line.last() == Some(&b'\n') {
            self.offset += n as u64;
            self.line.pop();
            return Ok(Some(&self.line));
        }

        if include_partial {
            self.offset += n as u64;
            return Ok(Some(&self.line));
        }

        // Still being written; rewind so the whole line is read next time
        self.reader.seek(SeekFrom::Start(self.offset))?;
        self.line.clear();
        Ok(None)
    }

    /// Deliver lines to `on_line` until end of data or until `stop` returns
    /// true. `stop` is asked before each line with the number of lines
    /// delivered so far in this call.
    ///
    /// An error from `on_line` aborts the read; the offending line is not
    /// counted in the offset.
    pub fn read_lines<F, S>(
        &mut self,
        include_partial: bool,
        mut on_line: F,
        mut stop: S,
    ) -> Result<ReadSummary>
    where
        F: FnMut(&[u8]) -> Result<()>,
        S: FnMut(u64) -> bool,
    {
        let mut summary = ReadSummary::default();
        loop {
            if stop(summary.lines) {
                summary.stopped = true;
                return Ok(summary);
            }

            let start = self.offset;
            let Some(line) = self.next_line(include_partial)? else {
                return Ok(summary);
            };
            if let Err(e) = on_line(line) {
                self.offset = start;
                self.reader.seek(SeekFrom::Start(start))?;
                return Err(e);
            }
            summary.lines += 1;
            summary.bytes += self.offset - start;
        }
    }
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .finish()
    }
}
