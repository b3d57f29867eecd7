//! Append Log Writer
//!
//! Appends lines to the log while holding an exclusive `flock`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;

use crate::config::SyncStrategy;
use crate::error::Result;

use super::LogPosition;

/// Exclusive appender for one log file
///
/// The lock is taken in `lock()` and released on drop, so callers can keep
/// it across the log append and the matching index append.
pub struct LogWriter {
    file: File,
    sync_strategy: SyncStrategy,
}

impl LogWriter {
    /// Open (creating if needed) and lock the log exclusively
    pub fn lock(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        FileExt::lock_exclusive(&file)?;

        Ok(Self {
            file,
            sync_strategy,
        })
    }

    /// Append one complete line (must end with `\n`)
    ///
    /// If the file ends in a torn line, a newline is written first so the
    /// torn bytes stay an isolated undecodable line.
    pub fn append(&mut self, line: &[u8]) -> Result<LogPosition> {
        let mut offset = self.file.metadata()?.len();

        if offset > 0 && self.last_byte()? != b'\n' {
            self.file.write_all(b"\n")?;
            offset += 1;
            tracing::warn!(offset, "repaired torn tail before append");
        }

        self.file.write_all(line)?;
        self.file.flush()?;

        if self.sync_strategy == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }

        Ok(LogPosition {
            offset,
            length: line.len() as u64,
        })
    }

    fn last_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.file.seek(SeekFrom::End(-1))?;
        self.file.read_exact(&mut byte)?;
        Ok(byte[0])
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
