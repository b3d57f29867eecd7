//! Tests for predicate scans
//!
//! These tests verify:
//! - Exact and LIKE matching semantics
//! - Only the newest live version of each record is returned
//! - The awk and in-process strategies return identical results
//! - Failed accelerated scans fall back transparently

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use filedb::config::{Config, ScanMode, SyncStrategy};
use filedb::engine::Engine;
use filedb::record::{Record, Value};
use filedb::scan::{AwkScan, InProcessScan, Predicate, ScanStrategy, Scanner};
use filedb::table::TableFiles;
use filedb::{fields, Fields};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_strategy(SyncStrategy::OsBuffered)
        .scan_mode(ScanMode::InProcess)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn awk() -> Option<AwkScan> {
    let scan = AwkScan::new(Path::new("awk"));
    if scan.is_available() {
        Some(scan)
    } else {
        eprintln!("awk not available, skipping");
        None
    }
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(Record::id).collect()
}

fn scan_both(engine: &Engine, awk: &AwkScan, table: &str, predicate: &Predicate) -> Vec<Record> {
    let files = engine.table(table).unwrap();
    let reference = InProcessScan.scan(&files, predicate).unwrap();
    let accelerated = awk.scan(&files, predicate).unwrap();
    assert_eq!(accelerated, reference, "strategies differ for {:?}", predicate);
    reference
}

/// Damage an index the way an external edit or a lost append would:
/// drop one line, swap two, or cut out a run. The last line always stays.
fn damage_index(lines: &mut Vec<String>, rng: &mut StdRng) {
    if lines.len() < 3 {
        return;
    }
    let last = lines.len() - 1;
    match rng.gen_range(0u8..3) {
        0 => {
            lines.remove(rng.gen_range(0..last));
        }
        1 => {
            let a = rng.gen_range(0..last);
            let b = rng.gen_range(0..last);
            lines.swap(a, b);
        }
        _ => {
            let start = rng.gen_range(0..last);
            let end = rng.gen_range(start..last) + 1;
            lines.drain(start..end);
        }
    }
}

fn seed_people(engine: &Engine) {
    for f in [
        fields! { "_id" => "1", "name" => "Ana", "age" => 30, "city" => "Skopje" },
        fields! { "_id" => "2", "name" => "anastasia", "age" => "30", "admin" => true },
        fields! { "_id" => "3", "name" => "Bob", "age" => 30.5, "city" => Value::Null },
        fields! { "_id" => "4", "name" => "BOBBY", "age" => "thirty", "admin" => false },
    ] {
        engine.insert("people", f).unwrap();
    }
}

// =============================================================================
// Matching Semantics Tests
// =============================================================================

#[test]
fn test_empty_predicate_returns_all_live_records() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);

    let files = engine.table("people").unwrap();
    let all = InProcessScan.scan(&files, &Predicate::all()).unwrap();

    assert_eq!(ids(&all), vec!["1", "2", "3", "4"]);
}

#[test]
fn test_exact_match_is_loose_across_strings_and_numbers() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    let files = engine.table("people").unwrap();

    let by_number = InProcessScan
        .scan(&files, &Predicate::all().eq("age", 30))
        .unwrap();
    let by_text = InProcessScan
        .scan(&files, &Predicate::all().eq("age", "30"))
        .unwrap();

    assert_eq!(ids(&by_number), vec!["1", "2"]);
    assert_eq!(ids(&by_text), vec!["1", "2"]);
}

#[test]
fn test_null_matches_missing_and_null_fields() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    let files = engine.table("people").unwrap();

    let no_city = InProcessScan
        .scan(&files, &Predicate::all().eq("city", Value::Null))
        .unwrap();

    assert_eq!(ids(&no_city), vec!["2", "3", "4"]);
}

#[test]
fn test_like_is_case_insensitive_substring() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    let files = engine.table("people").unwrap();

    let ana = InProcessScan
        .scan(&files, &Predicate::all().like("name", "ANA"))
        .unwrap();
    let bob = InProcessScan
        .scan(&files, &Predicate::from_fields(&fields! { "name%" => "bob" }))
        .unwrap();

    assert_eq!(ids(&ana), vec!["1", "2"]);
    assert_eq!(ids(&bob), vec!["3", "4"]);
}

#[test]
fn test_conditions_are_conjunctive() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    let files = engine.table("people").unwrap();

    let predicate = Predicate::all().like("name", "ana").eq("admin", true);
    let result = InProcessScan.scan(&files, &predicate).unwrap();

    assert_eq!(ids(&result), vec!["2"]);
}

#[test]
fn test_scan_missing_table_is_empty() {
    let (_temp, engine) = setup_temp_engine();
    let files = engine.table("ghost").unwrap();

    assert!(InProcessScan.scan(&files, &Predicate::all()).unwrap().is_empty());
    if let Some(awk) = awk() {
        assert!(awk.scan(&files, &Predicate::all()).unwrap().is_empty());
    }
}

// =============================================================================
// Version Resolution Tests
// =============================================================================

#[test]
fn test_superseded_versions_do_not_match() {
    let (_temp, engine) = setup_temp_engine();
    engine
        .insert("t", fields! { "_id" => "1", "name" => "old" })
        .unwrap();
    engine
        .insert("t", fields! { "_id" => "2", "name" => "other" })
        .unwrap();
    engine
        .update(
            "t",
            &fields! { "name" => "new" },
            Some(&Predicate::all().eq("_id", "1")),
        )
        .unwrap();

    let files = engine.table("t").unwrap();
    let old = InProcessScan
        .scan(&files, &Predicate::all().eq("name", "old"))
        .unwrap();
    let all = InProcessScan.scan(&files, &Predicate::all()).unwrap();

    assert!(old.is_empty());
    // ordered by each record's newest version
    assert_eq!(ids(&all), vec!["2", "1"]);
}

#[test]
fn test_tombstoned_records_do_not_match() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    engine
        .delete("people", Some(&Predicate::all().eq("name", "Ana")))
        .unwrap();

    let files = engine.table("people").unwrap();
    let result = InProcessScan
        .scan(&files, &Predicate::all().like("name", "ana"))
        .unwrap();

    assert_eq!(ids(&result), vec!["2"]);
}

#[test]
fn test_undecodable_lines_are_skipped() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    let files = engine.table("people").unwrap();

    let mut log = OpenOptions::new()
        .append(true)
        .open(files.data_path())
        .unwrap();
    log.write_all(b"not json at all\n{\"_id\":\"5\",\"na").unwrap();
    drop(log);

    let all = InProcessScan.scan(&files, &Predicate::all()).unwrap();
    assert_eq!(all.len(), 4);

    if let Some(awk) = awk() {
        assert_eq!(awk.scan(&files, &Predicate::all()).unwrap(), all);
    }
}

// =============================================================================
// Strategy Equivalence Tests
// =============================================================================

#[test]
fn test_awk_matches_in_process_on_fixed_queries() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    engine
        .insert("people", fields! { "_id" => "5", "name" => "say \"hi\"", "note" => "tab\there" })
        .unwrap();
    engine
        .insert("people", fields! { "_id" => "6", "name" => "Ćirilica Ана", "age" => 1e3 })
        .unwrap();

    let queries = vec![
        Predicate::all(),
        Predicate::all().eq("name", "Ana"),
        Predicate::all().eq("name", "ana"),
        Predicate::all().eq("age", 30),
        Predicate::all().eq("age", "30"),
        Predicate::all().eq("age", 1000),
        Predicate::all().eq("age", "thirty"),
        Predicate::all().eq("admin", true),
        Predicate::all().eq("admin", false),
        Predicate::all().eq("city", Value::Null),
        Predicate::all().eq("_id", "3"),
        Predicate::all().like("name", "ANA"),
        Predicate::all().like("name", "\"hi\""),
        Predicate::all().like("name", "ана"),
        Predicate::all().like("note", "\t"),
        Predicate::all().like("name", ""),
        Predicate::all().like("age", "30"),
        Predicate::all().like("name", "b").eq("age", "thirty"),
    ];

    for predicate in &queries {
        scan_both(&engine, &awk, "people", predicate);
    }
}

#[test]
fn test_awk_scan_rebuilds_missing_index() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);
    engine
        .update(
            "people",
            &fields! { "name" => "Zed" },
            Some(&Predicate::all().eq("_id", "1")),
        )
        .unwrap();

    let files = engine.table("people").unwrap();
    fs::remove_file(files.index_path()).unwrap();

    let result = scan_both(&engine, &awk, "people", &Predicate::all().eq("name", "Zed"));
    assert_eq!(ids(&result), vec!["1"]);
    assert!(files.index_path().exists());
}

#[test]
fn test_awk_sees_record_missing_from_middle_of_index() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "k" => "x" }).unwrap();
    engine.insert("t", fields! { "_id" => "2", "k" => "x" }).unwrap();

    // the remaining entry still reaches the end of the log
    let files = engine.table("t").unwrap();
    let index = fs::read_to_string(files.index_path()).unwrap();
    let second = index.lines().nth(1).unwrap().to_string();
    fs::write(files.index_path(), format!("{}\n", second)).unwrap();

    let result = scan_both(&engine, &awk, "t", &Predicate::all().eq("k", "x"));
    assert_eq!(ids(&result), vec!["1", "2"]);
}

#[test]
fn test_awk_returns_newest_version_when_its_entry_is_lost() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "v" => 1 }).unwrap();
    engine.insert("t", fields! { "_id" => "2", "v" => 1 }).unwrap();
    engine
        .update("t", &fields! { "v" => 2 }, Some(&Predicate::all().eq("_id", "1")))
        .unwrap();
    engine.insert("t", fields! { "_id" => "3", "v" => 1 }).unwrap();

    // drop the entry of the update; the index now names the first version
    let files = engine.table("t").unwrap();
    let kept: String = fs::read_to_string(files.index_path())
        .unwrap()
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 2)
        .map(|(_, l)| format!("{}\n", l))
        .collect();
    fs::write(files.index_path(), &kept).unwrap();
    let live_v1 = scan_both(&engine, &awk, "t", &Predicate::all().eq("v", 1));
    assert_eq!(ids(&live_v1), vec!["2", "3"]);

    fs::write(files.index_path(), &kept).unwrap();
    let all = scan_both(&engine, &awk, "t", &Predicate::all());
    assert_eq!(ids(&all), vec!["2", "1", "3"]);
    assert_eq!(all[1].get("v"), Some(&Value::from(2)));
}

#[test]
fn test_awk_rebuilds_index_naming_wrong_ids() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "name" => "A" }).unwrap();
    engine.insert("t", fields! { "_id" => "2", "name" => "B" }).unwrap();

    // offsets still tile the log, but each names the other record
    let files = engine.table("t").unwrap();
    fs::write(files.index_path(), "2:0:23\n1:23:23\n").unwrap();

    let result = scan_both(&engine, &awk, "t", &Predicate::all().eq("name", "A"));
    assert_eq!(ids(&result), vec!["1"]);
    assert_eq!(
        fs::read_to_string(files.index_path()).unwrap(),
        "1:0:23\n2:23:23\n"
    );
}

#[test]
fn test_awk_rejects_entry_with_wrong_length() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "name" => "A" }).unwrap();
    engine.insert("t", fields! { "_id" => "2", "name" => "B" }).unwrap();

    // one entry swallowing both lines
    let files = engine.table("t").unwrap();
    fs::write(files.index_path(), "1:0:46\n").unwrap();

    let result = scan_both(&engine, &awk, "t", &Predicate::all());
    assert_eq!(ids(&result), vec!["1", "2"]);
}

#[test]
fn test_awk_checks_ids_of_lines_it_skips() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "name" => "A" }).unwrap();
    engine.insert("t", fields! { "_id" => "2", "name" => "B" }).unwrap();

    // the second line is labelled as a newer version of "1"
    let files = engine.table("t").unwrap();
    fs::write(files.index_path(), "1:0:23\n1:23:23\n").unwrap();

    let result = scan_both(&engine, &awk, "t", &Predicate::all().eq("name", "A"));
    assert_eq!(ids(&result), vec!["1"]);
    assert_eq!(
        fs::read_to_string(files.index_path()).unwrap(),
        "1:0:23\n2:23:23\n"
    );
}

#[test]
fn test_awk_checks_line_that_supersedes_a_candidate() {
    let Some(awk) = awk() else { return };
    let (_temp, engine) = setup_temp_engine();
    engine.insert("t", fields! { "_id" => "1", "name" => "A" }).unwrap();

    let files = engine.table("t").unwrap();
    let mut log = OpenOptions::new()
        .append(true)
        .open(files.data_path())
        .unwrap();
    log.write_all(b"{\"_id\":\"1\",\"na\n").unwrap();

    // a torn line indexed as the newest "1"
    fs::write(files.index_path(), "1:0:23\n1:23:15\n").unwrap();

    let result = scan_both(&engine, &awk, "t", &Predicate::all().eq("name", "A"));
    assert_eq!(ids(&result), vec!["1"]);
    assert_eq!(fs::read_to_string(files.index_path()).unwrap(), "1:0:23\n");
}

/// Random mutation histories checked under random predicates
#[test]
fn test_awk_matches_in_process_on_random_histories() {
    let Some(awk) = awk() else { return };

    let names = ["Ana", "ana", "BOB", "Bo b", "30", "x\"y", "Ана", ""];
    let cities = ["Skopje", "skopje", "Ohrid", "Bitola"];
    let needles = ["an", "AN", "o", "b", "30", "kop", "\"", "на", "zz"];

    let random_value = |rng: &mut StdRng| -> Value {
        match rng.gen_range(0u8..6) {
            0 => Value::Null,
            1 => Value::from(rng.gen_bool(0.5)),
            2 => Value::from(rng.gen_range(28i64..32)),
            3 => Value::from(rng.gen_range(28i64..32).to_string()),
            4 => Value::from(*names.choose(rng).unwrap()),
            _ => Value::from(*cities.choose(rng).unwrap()),
        }
    };

    for seed in 0..12u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (_temp, engine) = setup_temp_engine();
        let index_path = engine.table("t").unwrap().index_path().to_path_buf();

        for _ in 0..60 {
            let id = rng.gen_range(1u32..12).to_string();
            match rng.gen_range(0u8..10) {
                0..=5 => {
                    let mut f = Fields::new();
                    f.insert("_id".to_string(), Value::from(id));
                    for field in ["name", "age", "city", "admin"] {
                        if rng.gen_bool(0.7) {
                            f.insert(field.to_string(), random_value(&mut rng));
                        }
                    }
                    engine.insert("t", f).unwrap();
                }
                6..=7 => {
                    let changes = fields! { "city" => random_value(&mut rng) };
                    engine
                        .update("t", &changes, Some(&Predicate::all().eq("_id", id)))
                        .unwrap();
                }
                _ => {
                    engine
                        .delete("t", Some(&Predicate::all().eq("_id", id)))
                        .unwrap();
                }
            }
        }

        // a third of the seeds run against a damaged index
        let damaged = if seed % 3 == 2 {
            let mut lines: Vec<String> = fs::read_to_string(&index_path)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect();
            damage_index(&mut lines, &mut rng);
            Some(lines.iter().map(|l| format!("{}\n", l)).collect::<String>())
        } else {
            None
        };

        for _ in 0..40 {
            // scans repair the index, so damage it again every time
            if let Some(contents) = &damaged {
                fs::write(&index_path, contents).unwrap();
            }

            let mut predicate = Predicate::all();
            for _ in 0..rng.gen_range(0usize..3) {
                let field = *["name", "age", "city", "admin", "missing"].choose(&mut rng).unwrap();
                predicate = if rng.gen_bool(0.3) {
                    predicate.like(field, *needles.choose(&mut rng).unwrap())
                } else {
                    predicate.eq(field, random_value(&mut rng))
                };
            }
            scan_both(&engine, &awk, "t", &predicate);
        }
    }
}

// =============================================================================
// Fallback Tests
// =============================================================================

#[test]
fn test_missing_awk_falls_back_to_in_process() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);

    let scanner = Scanner::with_strategies(
        ScanMode::Auto,
        Box::new(AwkScan::new(Path::new("/nonexistent/awk"))),
        Box::new(InProcessScan),
    );
    let engine = engine.with_scanner(scanner);

    let result = engine
        .get("people", Some(&Predicate::all().like("name", "bob")))
        .unwrap();
    assert_eq!(ids(&result), vec!["3", "4"]);
}

/// Accelerated strategy that reports itself unusable
struct Unavailable;

impl ScanStrategy for Unavailable {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn scan(&self, _table: &TableFiles, _predicate: &Predicate) -> filedb::Result<Vec<Record>> {
        panic!("scan must not run when the strategy is unavailable");
    }
}

#[test]
fn test_unavailable_strategy_is_not_tried() {
    let (_temp, engine) = setup_temp_engine();
    seed_people(&engine);

    let scanner =
        Scanner::with_strategies(ScanMode::Auto, Box::new(Unavailable), Box::new(InProcessScan));
    let engine = engine.with_scanner(scanner);

    let result = engine
        .get("people", Some(&Predicate::all().eq("admin", true)))
        .unwrap();
    assert_eq!(ids(&result), vec!["2"]);
}

#[test]
fn test_missing_awk_reports_unavailable() {
    assert!(!AwkScan::new(Path::new("/nonexistent/awk")).is_available());
}

#[test]
fn test_failing_awk_program_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .awk_program("false")
        .build();
    let engine = Engine::open(config).unwrap();
    seed_people(&engine);

    let result = engine
        .get("people", Some(&Predicate::all().eq("age", 30)))
        .unwrap();
    assert_eq!(ids(&result), vec!["1", "2"]);
}

#[test]
fn test_auto_mode_uses_awk_when_available() {
    if awk().is_none() {
        return;
    }
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(Config::builder().data_dir(temp_dir.path()).build()).unwrap();
    seed_people(&engine);

    let result = engine
        .get("people", Some(&Predicate::all().like("name", "ana")))
        .unwrap();
    assert_eq!(ids(&result), vec!["1", "2"]);
}
