//! Error types for FileDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using FileDbError
pub type Result<T> = std::result::Result<T, FileDbError>;

/// Unified error type for FileDB operations
///
/// Absent records are never an error: lookups return `Ok(None)` and scans
/// return an empty vector.
#[derive(Debug, Error)]
pub enum FileDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// A file could not be opened, locked, read, written, or renamed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    /// A log line is not a well-formed record
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid partition key: {0:?}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Scan Errors
    // -------------------------------------------------------------------------
    /// The external filter process is missing or failed
    #[error("External scan failed: {0}")]
    ExternalScan(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
