//! Configuration for FileDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a FileDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {table}.db       (append log, one JSON record per line)
    ///     ├── {table}.idx      (offset index, "id:offset:length" per line)
    ///     └── storage/         (key/value partitions)
    pub data_dir: PathBuf,

    /// Sync strategy: whether each append is fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Scan Configuration
    // -------------------------------------------------------------------------
    /// Which scan strategies predicate queries may use
    pub scan_mode: ScanMode,

    /// Program used by the accelerated scan path
    pub awk_program: PathBuf,
}

/// Append sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Flush to the OS after every append and leave durability to the kernel
    OsBuffered,

    /// fsync after every append (safest, slowest)
    EveryWrite,
}

/// Predicate scan strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Try the external filter first, fall back to the in-process scan
    Auto,

    /// Always scan in-process
    InProcess,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./filedb_data"),
            sync_strategy: SyncStrategy::OsBuffered,
            scan_mode: ScanMode::Auto,
            awk_program: PathBuf::from("awk"),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all tables)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the append sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the scan mode
    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.config.scan_mode = mode;
        self
    }

    /// Set the program used for accelerated scans
    pub fn awk_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.awk_program = program.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
