//! Engine Module
//!
//! The document store entry point that coordinates all components.
//!
//! ## Responsibilities
//! - Table lifecycle (create, list, drop)
//! - Mutations as log appends (insert, update, delete)
//! - Reads by id (offset index) and by predicate (scanner)
//! - Maintenance (index rebuild, compaction)

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::compaction::{self, CompactionStats};
use crate::config::Config;
use crate::error::{FileDbError, Result};
use crate::index::{IndexEntry, RebuildStats};
use crate::join::{Join, JoinedRecord};
use crate::lookup;
use crate::partition::PartitionStore;
use crate::record::{encode_line, unix_timestamp, Fields, Record};
use crate::scan::{Predicate, Scanner};
use crate::table::{self, TableFiles};

/// The main storage engine
///
/// ## Concurrency Model
///
/// The engine has no threads of its own and holds no in-memory table state;
/// every call works directly on the files, so any number of engines (in one
/// or several processes) may share a data directory.
///
/// - **Appends** take an exclusive `flock` on the log and, while still
///   holding it, an exclusive `flock` on the index. Index entries therefore
///   land in the same order as their log lines.
/// - **Lookups** read the indexed byte range under a shared `flock`.
/// - **Scans and index loads** read without locks; a concurrent append may or
///   may not be seen.
/// - **Compaction** replaces both files by rename and excludes nobody; see
///   [`crate::compaction`] for the resulting gap.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Predicate scan strategies
    scanner: Scanner,
}

impl Engine {
    /// Open or create an engine with the given config
    pub fn open(config: Config) -> Result<Self> {
        if config.awk_program.as_os_str().is_empty() {
            return Err(FileDbError::Config("awk_program must not be empty".to_string()));
        }

        fs::create_dir_all(&config.data_dir)?;

        let scanner = Scanner::new(&config);
        tracing::debug!(data_dir = %config.data_dir.display(), "engine opened");

        Ok(Self { config, scanner })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Replace the scanner (e.g. to pin a strategy in tests)
    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    // =========================================================================
    // Table Lifecycle
    // =========================================================================

    /// Create a table's log and index if they do not exist
    pub fn create_table(&self, table: &str) -> Result<bool> {
        self.table(table)?.create()?;
        Ok(true)
    }

    /// Sorted names of all tables
    pub fn list_tables(&self) -> Result<Vec<String>> {
        table::list_tables(&self.config.data_dir)
    }

    /// Remove a table's log and index. Returns false if it did not exist.
    pub fn drop_table(&self, table: &str) -> Result<bool> {
        let dropped = self.table(table)?.remove()?;
        if dropped {
            tracing::info!(table, "table dropped");
        }
        Ok(dropped)
    }

    /// Remove every table and partition, leaving an empty data directory
    pub fn drop_database(&self) -> Result<()> {
        match fs::remove_dir_all(&self.config.data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.config.data_dir)?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "database dropped");
        Ok(())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert a record, creating the table if needed
    ///
    /// `_id` is generated when absent; a caller-supplied id is coerced to a
    /// string. Inserting an existing id appends a new version of it.
    pub fn insert(&self, table: &str, fields: Fields) -> Result<Record> {
        let table = self.table(table)?;
        table.create()?;

        let record = Record::for_insert(fields)?;
        self.append_version(&table, &record)?;
        Ok(record)
    }

    /// Append a new version of every record matching `predicate`
    ///
    /// Non-null values in `changes` overwrite, nulls remove the field, `_id`
    /// is ignored. Returns the number of records updated.
    pub fn update(
        &self,
        table: &str,
        changes: &Fields,
        predicate: Option<&Predicate>,
    ) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let files = self.table(table)?;
        let rows = self.get(table, predicate)?;
        for row in &rows {
            self.append_version(&files, &row.apply_changes(changes))?;
        }

        tracing::debug!(table, updated = rows.len(), "update applied");
        Ok(rows.len())
    }

    /// Append a tombstone for every record matching `predicate`
    ///
    /// Returns the number of records deleted.
    pub fn delete(&self, table: &str, predicate: Option<&Predicate>) -> Result<usize> {
        let files = self.table(table)?;
        let rows = self.get(table, predicate)?;
        let now = unix_timestamp();
        for row in &rows {
            self.append_version(&files, &Record::tombstone(row.id(), now))?;
        }

        tracing::debug!(table, deleted = rows.len(), "delete applied");
        Ok(rows.len())
    }

    /// Append one version to the log and its entry to the index
    fn append_version(&self, table: &TableFiles, record: &Record) -> Result<()> {
        let line = encode_line(record)?;

        let mut writer = table.log().writer()?;
        let position = writer.append(&line)?;
        table.index().append_entry(&IndexEntry::new(
            record.id(),
            position.offset,
            position.length,
        ))?;
        drop(writer);

        tracing::trace!(
            table = table.name(),
            id = record.id(),
            offset = position.offset,
            length = position.length,
            "version appended"
        );
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Find the live record with `id`
    pub fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>> {
        lookup::find_by_id(&self.table(table)?, id)
    }

    /// Live records matching `predicate` (all live records for `None`)
    ///
    /// A predicate of exactly `{_id: v}` is answered from the index; anything
    /// else scans the whole table.
    pub fn get(&self, table: &str, predicate: Option<&Predicate>) -> Result<Vec<Record>> {
        let files = self.table(table)?;
        if !files.exists() {
            return Ok(Vec::new());
        }

        if let Some(id) = predicate.and_then(Predicate::id_lookup) {
            return Ok(lookup::find_by_id(&files, &id)?.into_iter().collect());
        }

        let all = Predicate::all();
        self.scanner.scan(&files, predicate.unwrap_or(&all))
    }

    /// First record `get` would return
    pub fn get_one(&self, table: &str, predicate: Option<&Predicate>) -> Result<Option<Record>> {
        Ok(self.get(table, predicate)?.into_iter().next())
    }

    /// `get`, then resolve each join field with one `get` on the other table
    pub fn get_with_join(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        joins: &[Join],
    ) -> Result<Vec<JoinedRecord>> {
        let rows = self.get(table, predicate)?;
        let mut results = Vec::with_capacity(rows.len());

        for record in rows {
            let mut joined = BTreeMap::new();
            for join in joins {
                let value = match record.get(&join.field) {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => continue,
                };
                let lookup = Predicate::all().eq(join.foreign_field.as_str(), value);
                let foreign = self.get_one(&join.table, Some(&lookup))?;
                joined.insert(join.field.clone(), foreign);
            }
            results.push(JoinedRecord { record, joined });
        }

        Ok(results)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rewrite the table's index from its log. Returns false if the table
    /// does not exist.
    pub fn rebuild_index(&self, table: &str) -> Result<bool> {
        Ok(self.rebuild_index_stats(table)?.is_some())
    }

    /// `rebuild_index` returning the pass summary
    pub fn rebuild_index_stats(&self, table: &str) -> Result<Option<RebuildStats>> {
        let files = self.table(table)?;
        if !files.exists() {
            return Ok(None);
        }
        files.index().rebuild(&files.log()).map(Some)
    }

    /// Drop tombstones and superseded versions. Returns false if the table
    /// does not exist.
    pub fn compact_table(&self, table: &str) -> Result<bool> {
        Ok(self.compact_table_stats(table)?.is_some())
    }

    /// `compact_table` returning the pass summary
    pub fn compact_table_stats(&self, table: &str) -> Result<Option<CompactionStats>> {
        let files = self.table(table)?;
        if !files.exists() {
            return Ok(None);
        }
        compaction::compact(&files).map(Some)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Resolve a table's files
    pub fn table(&self, name: &str) -> Result<TableFiles> {
        TableFiles::new(&self.config.data_dir, name, self.config.sync_strategy)
    }

    /// Key/value partitions stored next to the tables
    pub fn partitions(&self) -> PartitionStore {
        PartitionStore::new(&self.config.data_dir)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
