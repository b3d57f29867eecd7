//! Accelerated scan through an external `awk` process
//!
//! `awk` is only a prefilter. The program it runs is compiled from the
//! predicate so that it never rejects a line whose record would match; every
//! line it prints is decoded and checked again with the in-process matcher.
//!
//! For every line `awk` reports its byte offset, its length and the `_id`
//! it can see (`"_id":"..."` with no escapes), plus the full text for
//! candidates. Those are checked against the offset index: each decodable
//! line must have an entry with its id and length at its offset, and the
//! newer line that supersedes a candidate must really hold that id. A
//! mismatch means the index is out of step; it is rebuilt and the scan rerun
//! once, then the scan fails so the caller falls back. With the index
//! verified, a candidate survives only if its offset is the newest one
//! indexed for its id, which resolves last-write-wins without decoding the
//! rest of the log.
//!
//! Needles reach `awk` through `ENVIRON`, never through program text or a
//! shell, and the log is fed on stdin, so neither values nor paths need
//! escaping. `LC_ALL=C` makes `length` count bytes and `tolower` fold ASCII
//! only, matching `contains_ignore_ascii_case`.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::error::{FileDbError, Result};
use crate::index::IndexSnapshot;
use crate::log::AppendLog;
use crate::record::{decode_line, Record, Value};
use crate::table::TableFiles;

use super::{Condition, MatchOp, Predicate, ScanStrategy};

const NEEDLE_ENV_PREFIX: &str = "FILEDB_NEEDLE_";

/// Lines starting at or past this byte position are not read
const LOG_END_ENV: &str = "FILEDB_LOG_END";

/// Scan strategy backed by an `awk` subprocess
#[derive(Debug, Clone)]
pub struct AwkScan {
    program: PathBuf,
    available: OnceLock<bool>,
}

impl AwkScan {
    pub fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            available: OnceLock::new(),
        }
    }

    /// Run a no-op program once
    fn runs(&self) -> bool {
        let ok = Command::new(&self.program)
            .arg("BEGIN { exit 0 }")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);

        if !ok {
            tracing::info!(program = %self.program.display(), "awk not usable, scans run in-process");
        }
        ok
    }

    fn run(&self, filter: &AwkFilter, input: File, log_end: u64) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .arg(&filter.program)
            .envs(filter.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(LOG_END_ENV, log_end.to_string())
            .env("LC_ALL", "C")
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                FileDbError::ExternalScan(format!("cannot run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            return Err(FileDbError::ExternalScan(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }

    /// One pass over the log; `None` if the index does not match it
    fn scan_once(
        &self,
        table: &TableFiles,
        log: &AppendLog,
        snapshot: &IndexSnapshot,
        predicate: &Predicate,
    ) -> Result<Option<Vec<Record>>> {
        let log_end = log.len()?;
        let filter = AwkFilter::compile(predicate);
        let stdout = self.run(&filter, File::open(log.path())?, log_end)?;

        let mut records = Vec::new();
        let mut candidates = 0u64;
        // offsets known to hold a decodable line with their indexed id
        let mut verified = HashSet::new();
        // offsets that superseded a candidate and still need that proof
        let mut superseding = HashSet::new();

        for raw in stdout.split(|&b| b == b'\n') {
            if raw.is_empty() {
                continue;
            }

            let output = parse_output_line(raw)?;
            let entry = snapshot.entry_at(output.offset);

            if let Some(entry) = entry {
                let terminated = output.length + 1;
                let at_eof = output.offset + output.length == log_end;
                if entry.length != terminated && !(at_eof && entry.length == output.length) {
                    return Ok(None);
                }
                if !output.id.is_empty() && output.id != entry.id.as_bytes() {
                    return Ok(None);
                }
            }

            let line = match output.line {
                Some(line) => line,
                None => {
                    // an id awk could read was compared above
                    let consistent = match entry {
                        Some(_) if !output.id.is_empty() => true,
                        Some(entry) => {
                            let ok = holds_record(log, output.offset, output.length, Some(&entry.id))?;
                            if ok {
                                verified.insert(output.offset);
                            }
                            ok
                        }
                        None => !holds_record(log, output.offset, output.length, None)?,
                    };
                    if !consistent {
                        return Ok(None);
                    }
                    continue;
                }
            };
            candidates += 1;

            let record = match (decode_line(line), entry) {
                (Ok(record), Some(entry)) if entry.id == record.id() => record,
                (Err(_), None) => continue,
                _ => return Ok(None),
            };
            verified.insert(output.offset);

            let newest = match snapshot.get(record.id()) {
                Some(location) => location.offset,
                None => return Ok(None),
            };
            if newest != output.offset {
                superseding.insert(newest);
                continue;
            }

            if !record.is_tombstone() && predicate.matches(&record) {
                records.push(record);
            }
        }

        for offset in superseding.difference(&verified) {
            let entry = match snapshot.entry_at(*offset) {
                Some(entry) => entry,
                None => return Ok(None),
            };
            if !holds_record(log, entry.offset, entry.length, Some(&entry.id))? {
                return Ok(None);
            }
        }

        tracing::debug!(
            table = table.name(),
            candidates,
            matched = records.len(),
            "awk scan finished"
        );

        Ok(Some(records))
    }
}

impl ScanStrategy for AwkScan {
    fn name(&self) -> &'static str {
        "awk"
    }

    /// Checked on first use, then remembered
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.runs())
    }

    fn scan(&self, table: &TableFiles, predicate: &Predicate) -> Result<Vec<Record>> {
        if !table.exists() {
            return Ok(Vec::new());
        }

        let log = table.log();
        let index = table.index();

        for attempt in 0..2 {
            let (snapshot, _) = index.load_current(&log)?;
            if let Some(records) = self.scan_once(table, &log, &snapshot, predicate)? {
                return Ok(records);
            }
            if attempt == 0 {
                tracing::debug!(table = table.name(), "awk output disagrees with index, rebuilding");
                index.rebuild(&log)?;
            }
        }

        Err(FileDbError::ExternalScan(format!(
            "offset index of {} does not match its log",
            table.name()
        )))
    }
}

/// Whether the bytes at `offset` decode to a record (with `id`, if given)
fn holds_record(log: &AppendLog, offset: u64, length: u64, id: Option<&str>) -> Result<bool> {
    let bytes = match log.read_at(offset, length)? {
        Some(bytes) => bytes,
        None => return Ok(false),
    };
    Ok(match decode_line(&bytes) {
        Ok(record) => id.map_or(true, |id| record.id() == id),
        Err(_) => false,
    })
}

/// One line of `awk` output: `<offset> <length>\t<id>[\t<line>]`
#[derive(Debug, PartialEq)]
struct OutputLine<'a> {
    offset: u64,
    /// Line length without its newline
    length: u64,
    /// `_id` spotted by `awk`; empty when it could not tell
    id: &'a [u8],
    /// Text of a candidate line
    line: Option<&'a [u8]>,
}

fn parse_output_line(raw: &[u8]) -> Result<OutputLine<'_>> {
    let malformed = || {
        FileDbError::ExternalScan(format!(
            "unexpected output line: {:?}",
            String::from_utf8_lossy(raw)
        ))
    };

    let mut parts = raw.splitn(3, |&b| b == b'\t');
    let header = parts.next().ok_or_else(malformed)?;
    let id = parts.next().ok_or_else(malformed)?;
    let line = parts.next();

    let header = std::str::from_utf8(header).map_err(|_| malformed())?;
    let (offset, length) = header.split_once(' ').ok_or_else(malformed)?;

    Ok(OutputLine {
        offset: offset.parse().map_err(|_| malformed())?,
        length: length.parse().map_err(|_| malformed())?,
        id,
        line,
    })
}

// =============================================================================
// Filter Compilation
// =============================================================================

/// A substring every matching line must contain
#[derive(Debug, Clone, PartialEq)]
struct Needle {
    text: String,
    /// Compare against `tolower($0)` instead of `$0`
    fold_case: bool,
}

/// Per-line program; `@COND@` is the needle test
const PROGRAM: &str = r#"BEGIN { limit = ENVIRON["@LIMIT@"] + 0 }
{
    if (off >= limit) exit
    id = match($0, /"_id":"[^"\\]*"/) ? substr($0, RSTART + 7, RLENGTH - 8) : ""
    if (@COND@) printf "%.0f %d\t%s\t%s\n", off, length($0), id, $0
    else printf "%.0f %d\t%s\n", off, length($0), id
    off += length($0) + 1
}
"#;

/// Compiled awk program plus the environment carrying its needles
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AwkFilter {
    pub(crate) program: String,
    pub(crate) env: Vec<(String, String)>,
}

impl AwkFilter {
    pub(crate) fn compile(predicate: &Predicate) -> Self {
        let mut terms = Vec::new();
        let mut env = Vec::new();

        for needle in predicate.conditions().iter().flat_map(needles) {
            let var = format!("{}{}", NEEDLE_ENV_PREFIX, env.len());
            let subject = if needle.fold_case { "tolower($0)" } else { "$0" };
            terms.push(format!("index({}, ENVIRON[\"{}\"]) > 0", subject, var));
            env.push((var, needle.text));
        }

        let condition = if terms.is_empty() {
            "1".to_string()
        } else {
            terms.join(" && ")
        };

        let program = PROGRAM
            .replace("@LIMIT@", LOG_END_ENV)
            .replace("@COND@", &condition);

        Self { program, env }
    }
}

/// Substrings implied by one condition on a line written by our encoder
///
/// Returns nothing when a safe prefilter cannot be derived; the condition is
/// then only checked after decoding.
fn needles(condition: &Condition) -> Vec<Needle> {
    let exact = |text: String| Needle {
        text,
        fold_case: false,
    };

    match condition.op {
        MatchOp::Exact => {
            let key = json_string(&condition.field);
            match &condition.value {
                // also matches records without the field
                Value::Null => Vec::new(),
                Value::Bool(b) => vec![exact(key), exact(b.to_string())],
                // numeric text has many spellings (30, 30.0, "30", 3e1)
                Value::Number(_) => vec![exact(key)],
                Value::String(s) if s.parse::<f64>().is_ok() => vec![exact(key)],
                Value::String(s) => vec![exact(key), exact(json_string(s))],
            }
        }
        MatchOp::Like => {
            let text = condition.value.to_text().to_ascii_lowercase();
            // characters the encoder escapes would not appear verbatim
            let verbatim = !text.is_empty()
                && !text.bytes().any(|b| b == b'"' || b == b'\\' || b < 0x20);
            if verbatim {
                vec![Needle {
                    text,
                    fold_case: true,
                }]
            } else {
                Vec::new()
            }
        }
    }
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}
