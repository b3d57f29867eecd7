//! Partition store
//!
//! Free-form JSON objects kept one file per key under
//! `{data_dir}/storage/{partition}/{key}`. Whole-file reads and writes, no
//! index, no versions.
//!
//! Partition and key names are single path components: anything except `.`,
//! `..`, and names holding a path separator or NUL (`site.json` is fine).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};
use tempfile::NamedTempFile;

use crate::error::{FileDbError, Result};
use crate::table::replace_file;

/// A JSON object stored under a partition key
pub type Document = Map<String, JsonValue>;

/// Key/value store rooted at `{data_dir}/storage`
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub const DIR_NAME: &'static str = "storage";

    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(Self::DIR_NAME),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` under `key`, keeping existing fields that `data` omits
    pub fn save(&self, partition: &str, key: &str, data: Document) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        let path = self.key_path(partition, key)?;
        fs::create_dir_all(&dir)?;

        let mut merged = self.read(partition, key)?.unwrap_or_default();
        merged.extend(data);

        let encoded =
            serde_json::to_vec(&merged).map_err(|e| FileDbError::Serialization(e.to_string()))?;

        // temporaries live outside the partition so `keys` never sees them
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        replace_file(tmp, &path)?;

        tracing::debug!(partition, key, "partition key saved");
        Ok(())
    }

    /// Read the object under `key`; `None` if missing or not an object
    pub fn read(&self, partition: &str, key: &str) -> Result<Option<Document>> {
        let path = self.key_path(partition, key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<JsonValue>(&bytes) {
            Ok(JsonValue::Object(map)) => Ok(Some(map)),
            Ok(_) | Err(_) => {
                tracing::warn!(partition, key, "partition file is not a JSON object");
                Ok(None)
            }
        }
    }

    /// Sorted keys of a partition (empty if it does not exist)
    pub fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let dir = self.partition_dir(partition)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_component(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Delete `key`. Returns false if it did not exist.
    pub fn remove(&self, partition: &str, key: &str) -> Result<bool> {
        let path = self.key_path(partition, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        if !is_valid_component(partition) {
            return Err(FileDbError::InvalidKey(partition.to_string()));
        }
        Ok(self.root.join(partition))
    }

    fn key_path(&self, partition: &str, key: &str) -> Result<PathBuf> {
        if !is_valid_component(key) {
            return Err(FileDbError::InvalidKey(key.to_string()));
        }
        Ok(self.partition_dir(partition)?.join(key))
    }
}

fn is_valid_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}
