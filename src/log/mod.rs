//! Append Log Module
//!
//! Per-table data file holding one record version per line.
//!
//! ## Responsibilities
//! - Append encoded record lines under an exclusive file lock
//! - Report the byte position of every append (for the offset index)
//! - Read an exact byte range under a shared file lock
//! - Stream lines with their offsets (rebuild, scan, compaction)
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ {"_id":"1","name":"A","tag":"x1"}\n           │  offset 0
//! ├───────────────────────────────────────────────┤
//! │ {"_id":"2","name":"B","tag":"x2"}\n           │  offset 34
//! ├───────────────────────────────────────────────┤
//! │ {"_id":"1","city":"Skopje","name":"A"}\n      │  newer version of "1"
//! ├───────────────────────────────────────────────┤
//! │ {"_deleted":true,"_deleted_ts":..,"_id":"2"}\n│  tombstone for "2"
//! └───────────────────────────────────────────────┘
//! ```
//! No header and no length prefix. Bytes once written are never modified;
//! only compaction replaces the whole file.

mod reader;
mod writer;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::Result;

pub use reader::{LogLine, LogLines};
pub use writer::LogWriter;

/// Byte range of one appended line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub offset: u64,
    pub length: u64,
}

/// Handle to a table's append log file
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
    sync_strategy: SyncStrategy,
}

impl AppendLog {
    pub fn new(path: &Path, sync_strategy: SyncStrategy) -> Self {
        Self {
            path: path.to_path_buf(),
            sync_strategy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for appending, holding its exclusive lock until dropped
    pub fn writer(&self) -> Result<LogWriter> {
        LogWriter::lock(&self.path, self.sync_strategy)
    }

    /// Append one line and release the lock
    pub fn append(&self, line: &[u8]) -> Result<LogPosition> {
        self.writer()?.append(line)
    }

    /// Read exactly `length` bytes at `offset` under a shared lock
    ///
    /// Returns `None` if the range runs past the end of the file.
    pub fn read_at(&self, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        reader::read_range(&self.path, offset, length)
    }

    /// Stream every line from the start of the file
    pub fn lines(&self) -> Result<LogLines> {
        LogLines::open(&self.path, 0)
    }

    /// Stream lines starting at `offset`
    pub fn lines_from(&self, offset: u64) -> Result<LogLines> {
        LogLines::open(&self.path, offset)
    }

    /// Current file size in bytes (0 if missing)
    pub fn len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
