//! Cross-table joins
//!
//! A join replaces a field of each result with the first record of another
//! table whose field equals it. One extra `get` per join per record; no
//! planning.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::Record;

/// `field` of the queried table refers to `foreign_field` of `table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub field: String,
    pub table: String,
    pub foreign_field: String,
}

impl Join {
    pub fn new(
        field: impl Into<String>,
        table: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            table: table.into(),
            foreign_field: foreign_field.into(),
        }
    }
}

/// A result record plus the records its join fields resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub record: Record,
    /// join field → matching foreign record (`None` when nothing matched)
    pub joined: BTreeMap<String, Option<Record>>,
}

/// Serializes as the record with each joined field replaced by the foreign
/// record (or `null`)
impl Serialize for JoinedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.record.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields {
            match self.joined.get(key) {
                Some(foreign) => map.serialize_entry(key, foreign)?,
                None => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}
