//! Table files
//!
//! A table is a pair of sibling files in the data directory:
//! `{name}.db` (append log) and `{name}.idx` (offset index). They are
//! created together and removed together.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::SyncStrategy;
use crate::error::{FileDbError, Result};
use crate::index::OffsetIndex;
use crate::log::AppendLog;

/// Paths and handles for one table
#[derive(Debug, Clone)]
pub struct TableFiles {
    name: String,
    data_path: PathBuf,
    index_path: PathBuf,
    sync_strategy: SyncStrategy,
}

impl TableFiles {
    pub const DATA_EXTENSION: &'static str = "db";
    pub const INDEX_EXTENSION: &'static str = "idx";

    /// Resolve a table inside `data_dir`, validating its name
    pub fn new(data_dir: &Path, name: &str, sync_strategy: SyncStrategy) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(FileDbError::InvalidTable(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            data_path: data_dir.join(format!("{}.{}", name, Self::DATA_EXTENSION)),
            index_path: data_dir.join(format!("{}.{}", name, Self::INDEX_EXTENSION)),
            sync_strategy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// A table exists when its append log exists
    pub fn exists(&self) -> bool {
        self.data_path.is_file()
    }

    /// Create both files if missing; existing content is untouched
    pub fn create(&self) -> Result<()> {
        for path in [&self.data_path, &self.index_path] {
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(())
    }

    /// Remove both files. Returns false if the table did not exist.
    pub fn remove(&self) -> Result<bool> {
        let existed = self.exists();
        for path in [&self.data_path, &self.index_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(existed)
    }

    pub fn log(&self) -> AppendLog {
        AppendLog::new(&self.data_path, self.sync_strategy)
    }

    pub fn index(&self) -> OffsetIndex {
        OffsetIndex::new(&self.index_path, self.sync_strategy)
    }
}

/// List table names in `data_dir`, sorted
pub fn list_tables(data_dir: &Path) -> Result<Vec<String>> {
    let mut tables = Vec::new();

    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(TableFiles::DATA_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if is_valid_name(stem) {
                tables.push(stem.to_string());
            }
        }
    }

    tables.sort();
    Ok(tables)
}

/// Names are plain file stems: ASCII alphanumerics, `_` and `-`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Atomically replace `target` with a fully written temporary file
///
/// The replacement keeps the permissions of the file it replaces.
pub(crate) fn replace_file(tmp: NamedTempFile, target: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Directory holding `path`, for temporaries that must share its filesystem
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
