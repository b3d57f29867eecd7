//! In-process scan
//!
//! The reference strategy: decode every line, keep the newest version per
//! id, test it. Independent of the offset index.

use std::collections::HashMap;

use crate::error::Result;
use crate::record::{decode_line, Record};
use crate::table::TableFiles;

use super::{Predicate, ScanStrategy};

/// Line-by-line scan with no external process
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessScan;

impl ScanStrategy for InProcessScan {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn scan(&self, table: &TableFiles, predicate: &Predicate) -> Result<Vec<Record>> {
        if !table.exists() {
            return Ok(Vec::new());
        }

        // id → (offset of newest version, the version if it is live and matches)
        let mut newest: HashMap<String, (u64, Option<Record>)> = HashMap::new();
        let mut skipped = 0u64;

        for line in table.log().lines()? {
            let line = line?;
            let record = match decode_line(&line.bytes) {
                Ok(record) => record,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let id = record.id().to_string();
            let keep = !record.is_tombstone() && predicate.matches(&record);
            newest.insert(id, (line.offset, keep.then_some(record)));
        }

        if skipped > 0 {
            tracing::debug!(table = table.name(), skipped, "skipped undecodable lines");
        }

        let mut live: Vec<(u64, Record)> = newest
            .into_values()
            .filter_map(|(offset, record)| record.map(|r| (offset, r)))
            .collect();
        live.sort_by_key(|(offset, _)| *offset);

        Ok(live.into_iter().map(|(_, record)| record).collect())
    }
}
