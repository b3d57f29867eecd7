//! Lookup Engine
//!
//! Resolves a record id to its newest version through the offset index.
//!
//! ## Steps
//! 1. Load an index snapshot (rebuilt first if it is behind the log)
//! 2. On a miss, rebuild once and retry
//! 3. On a hit, read exactly `length` bytes at `offset` under a shared lock
//! 4. Decode; a tombstone means the record is absent
//!
//! A range that cannot be read or does not decode to the requested id is
//! treated like a miss (stale index) and repaired the same way.

use crate::error::Result;
use crate::index::IndexLocation;
use crate::log::AppendLog;
use crate::record::{decode_line, Record};
use crate::table::TableFiles;

/// Find the live record with `id`, or `None`
pub fn find_by_id(table: &TableFiles, id: &str) -> Result<Option<Record>> {
    if !table.exists() {
        return Ok(None);
    }

    let log = table.log();
    let index = table.index();
    let (mut snapshot, mut rebuilt) = index.load_current(&log)?;

    loop {
        let version = match snapshot.get(id) {
            Some(location) => read_version(&log, id, location)?,
            None => None,
        };

        match version {
            Some(record) if record.is_tombstone() => return Ok(None),
            Some(record) => return Ok(Some(record)),
            None if rebuilt => return Ok(None),
            None => {
                tracing::debug!(table = table.name(), id, "index miss, rebuilding");
                index.rebuild(&log)?;
                snapshot = index.load()?;
                rebuilt = true;
            }
        }
    }
}

/// Read and decode one indexed version; `None` if the index was wrong
fn read_version(log: &AppendLog, id: &str, location: IndexLocation) -> Result<Option<Record>> {
    let bytes = match log.read_at(location.offset, location.length)? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };

    match decode_line(&bytes) {
        Ok(record) if record.id() == id => Ok(Some(record)),
        Ok(record) => {
            tracing::warn!(expected = id, found = record.id(), "index points at another record");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(id, offset = location.offset, error = %e, "indexed range does not decode");
            Ok(None)
        }
    }
}
