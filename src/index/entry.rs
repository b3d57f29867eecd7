//! Index entry format
//!
//! One line per log append: `<id>:<offset>:<length>`.

use std::fmt;

/// Location of one record version inside the append log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub offset: u64,
    pub length: u64,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            id: id.into(),
            offset,
            length,
        }
    }

    /// Parse one index line; `None` for anything malformed
    ///
    /// ```
    /// use filedb::index::IndexEntry;
    ///
    /// let entry = IndexEntry::parse("abc:120:48\n").unwrap();
    /// assert_eq!(entry, IndexEntry::new("abc", 120, 48));
    /// assert!(IndexEntry::parse("abc:12").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        let mut parts = line.split(':');

        let id = parts.next().filter(|id| !id.is_empty())?;
        let offset = parts.next()?.parse().ok()?;
        let length = parts.next()?.parse().ok()?;

        if parts.next().is_some() {
            return None;
        }

        Some(Self::new(id, offset, length))
    }

    /// End of the byte range (exclusive)
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.offset, self.length)
    }
}
