//! Append Log Reader
//!
//! Exact-range reads for lookups and line streaming for full passes.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use fs2::FileExt;

use crate::error::Result;

/// One raw line of the log and where it starts
#[derive(Debug, Clone)]
pub struct LogLine {
    pub offset: u64,
    /// Line bytes including the trailing `\n` (absent on a final torn line)
    pub bytes: Vec<u8>,
}

impl LogLine {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read `length` bytes at `offset` holding a shared lock
pub(super) fn read_range(path: &Path, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    FileExt::lock_shared(&file)?;

    let result = read_exact_at(&mut file, offset, length);
    let _ = FileExt::unlock(&file);

    match result {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_exact_at(file: &mut File, offset: u64, length: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = vec![0u8; length as usize];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Unlocked line iterator
///
/// A concurrent append may or may not be observed.
pub struct LogLines {
    reader: BufReader<File>,
    offset: u64,
}

impl LogLines {
    pub(super) fn open(path: &Path, start: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: start,
        })
    }
}

impl Iterator for LogLines {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut bytes = Vec::new();
        match self.reader.read_until(b'\n', &mut bytes) {
            Ok(0) => None,
            Ok(n) => {
                let line = LogLine {
                    offset: self.offset,
                    bytes,
                };
                self.offset += n as u64;
                Some(Ok(line))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
