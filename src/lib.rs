//! # FileDB
//!
//! A schema-less document store on plain files:
//! - One append-only JSON-lines log per table (`{table}.db`)
//! - An `id:offset:length` index per table (`{table}.idx`) for lookups by id
//! - Updates and deletes as new versions and tombstones; last write wins
//! - Predicate scans through `awk`, with an equivalent in-process fallback
//! - Compaction to drop superseded versions and tombstones
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │       insert / update / delete / get / find_by_id           │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │ append               │ id                    │ predicate
//!        ▼                      ▼                       ▼
//! ┌─────────────┐        ┌─────────────┐         ┌─────────────┐
//! │ Append Log  │◀───────│   Lookup    │         │   Scanner   │
//! │ {table}.db  │  seek  │             │         │ awk │ in-proc│
//! └──────┬──────┘        └──────┬──────┘         └──────┬──────┘
//!        │                      ▼                       │
//!        │               ┌─────────────┐                │
//!        └──────────────▶│Offset Index │◀───────────────┘
//!          entry/append  │ {table}.idx │  newest-version check
//!                        └─────────────┘
//!                               ▲
//!                        ┌──────┴──────┐
//!                        │  Compactor  │  rewrites log + index
//!                        └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use filedb::{fields, Engine, Predicate};
//!
//! let engine = Engine::open_path(std::path::Path::new("./filedb_data"))?;
//! let user = engine.insert("users", fields! { "name" => "Ana", "city" => "Skopje" })?;
//!
//! let found = engine.find_by_id("users", user.id())?;
//! assert_eq!(found.as_ref(), Some(&user));
//!
//! let skopje = engine.get("users", Some(&Predicate::all().like("city", "skop")))?;
//! assert_eq!(skopje.len(), 1);
//! # Ok::<(), filedb::FileDbError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod log;
pub mod index;
pub mod table;
pub mod lookup;
pub mod scan;
pub mod compaction;
pub mod join;
pub mod partition;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FileDbError, Result};
pub use config::{Config, ScanMode, SyncStrategy};
pub use engine::Engine;
pub use join::{Join, JoinedRecord};
pub use record::{Fields, Record, Value};
pub use scan::Predicate;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FileDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
