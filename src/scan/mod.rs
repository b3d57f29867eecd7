//! Predicate Scanner Module
//!
//! Evaluates a predicate over every logical record of a table.
//!
//! ## Responsibilities
//! - Resolve last-write-wins: only the newest version of each id counts
//! - Drop tombstones, undecodable lines, and non-matching records
//! - Prefer the external `awk` filter when it is usable, fall back to the
//!   in-process scan
//!
//! ## Strategies
//! ```text
//!               Scanner::scan(table, predicate)
//!                          │
//!          ┌───────────────┴────────────────┐
//!          ▼ (ScanMode::Auto)               ▼ (fallback / ScanMode::InProcess)
//!   ┌─────────────┐                  ┌─────────────┐
//!   │  AwkScan    │  unavailable ──▶ │InProcessScan│
//!   │ prefilter + │  or error        │ full decode │
//!   │ index check │                  │  pass       │
//!   └─────────────┘                  └─────────────┘
//! ```
//! Both strategies return the same records in the same order (file order of
//! each record's newest version). Every non-id query is a full table pass.

mod external;
mod in_process;
mod predicate;

use crate::config::{Config, ScanMode};
use crate::error::Result;
use crate::record::Record;
use crate::table::TableFiles;

pub use external::AwkScan;
pub use in_process::InProcessScan;
pub use predicate::{contains_ignore_ascii_case, Condition, MatchOp, Predicate, LIKE_SUFFIX};

/// One way of evaluating a predicate over a table
pub trait ScanStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether the strategy can run on this machine
    fn is_available(&self) -> bool {
        true
    }

    /// Live records whose newest version matches `predicate`, in log order
    fn scan(&self, table: &TableFiles, predicate: &Predicate) -> Result<Vec<Record>>;
}

/// Strategy selector used by the engine
pub struct Scanner {
    mode: ScanMode,
    accelerated: Box<dyn ScanStrategy>,
    fallback: Box<dyn ScanStrategy>,
}

impl Scanner {
    pub fn new(config: &Config) -> Self {
        Self::with_strategies(
            config.scan_mode,
            Box::new(AwkScan::new(&config.awk_program)),
            Box::new(InProcessScan),
        )
    }

    pub fn with_strategies(
        mode: ScanMode,
        accelerated: Box<dyn ScanStrategy>,
        fallback: Box<dyn ScanStrategy>,
    ) -> Self {
        Self {
            mode,
            accelerated,
            fallback,
        }
    }

    /// Scan with the accelerated strategy when it is available, falling back
    /// on any failure
    pub fn scan(&self, table: &TableFiles, predicate: &Predicate) -> Result<Vec<Record>> {
        if self.mode == ScanMode::Auto && self.accelerated.is_available() {
            match self.accelerated.scan(table, predicate) {
                Ok(records) => return Ok(records),
                Err(e) => {
                    tracing::warn!(
                        table = table.name(),
                        strategy = self.accelerated.name(),
                        error = %e,
                        "accelerated scan failed, falling back to {}",
                        self.fallback.name()
                    );
                }
            }
        }

        self.fallback.scan(table, predicate)
    }
}
