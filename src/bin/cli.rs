//! FileDB CLI
//!
//! Command-line interface for a FileDB data directory.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use filedb::partition::Document;
use filedb::{Config, Engine, Fields, Join, Predicate, ScanMode, SyncStrategy, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// FileDB CLI
#[derive(Parser, Debug)]
#[command(name = "filedb-cli")]
#[command(about = "CLI for the FileDB document store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./filedb_data")]
    data_dir: String,

    /// fsync after every append
    #[arg(long)]
    sync: bool,

    /// Never use the external awk filter
    #[arg(long)]
    in_process: bool,

    /// Program used for accelerated scans
    #[arg(long, default_value = "awk")]
    awk: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a table
    Create { table: String },

    /// List tables
    List,

    /// Insert a record from field=value pairs
    Insert {
        table: String,
        /// field=value (values are parsed as JSON scalars, else strings)
        fields: Vec<String>,
    },

    /// Find a record by id
    Find { table: String, id: String },

    /// Query records; `field=value` is exact, `field%=value` is LIKE
    Get {
        table: String,
        conditions: Vec<String>,

        /// field=table.foreign_field join (repeatable)
        #[arg(long = "join")]
        joins: Vec<String>,

        /// Print only the first match (ignored with --join)
        #[arg(long)]
        first: bool,
    },

    /// Update matching records: changes before `--where`, conditions after
    Update {
        table: String,
        /// field=value (null removes the field)
        changes: Vec<String>,

        #[arg(long = "where", num_args = 1..)]
        conditions: Vec<String>,
    },

    /// Delete matching records
    Delete { table: String, conditions: Vec<String> },

    /// Rebuild a table's offset index from its log
    Rebuild { table: String },

    /// Compact a table's log
    Compact { table: String },

    /// Drop a table
    Drop { table: String },

    /// Drop every table and partition
    DropDatabase,

    /// Save field=value pairs under a partition key (merged)
    Save {
        partition: String,
        key: String,
        fields: Vec<String>,
    },

    /// Read a partition key, or list keys when no key is given
    Read { partition: String, key: Option<String> },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filedb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .sync_strategy(if args.sync {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::OsBuffered
        })
        .scan_mode(if args.in_process {
            ScanMode::InProcess
        } else {
            ScanMode::Auto
        })
        .awk_program(&args.awk)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&engine, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Create { table } => print_json(&engine.create_table(&table)?)?,
        Commands::List => {
            for table in engine.list_tables()? {
                println!("{}", table);
            }
        }
        Commands::Insert { table, fields } => {
            print_json(&engine.insert(&table, parse_fields(&fields)?)?)?
        }
        Commands::Find { table, id } => print_json(&engine.find_by_id(&table, &id)?)?,
        Commands::Get {
            table,
            conditions,
            joins,
            first,
        } => {
            let predicate = parse_predicate(&conditions)?;
            if first && joins.is_empty() {
                print_json(&engine.get_one(&table, predicate.as_ref())?)?;
            } else if joins.is_empty() {
                for record in engine.get(&table, predicate.as_ref())? {
                    print_json(&record)?;
                }
            } else {
                let joins = joins
                    .iter()
                    .map(|arg| parse_join(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                for record in engine.get_with_join(&table, predicate.as_ref(), &joins)? {
                    print_json(&record)?;
                }
            }
        }
        Commands::Update {
            table,
            changes,
            conditions,
        } => {
            let predicate = parse_predicate(&conditions)?;
            let count = engine.update(&table, &parse_fields(&changes)?, predicate.as_ref())?;
            print_json(&count)?
        }
        Commands::Delete { table, conditions } => {
            let predicate = parse_predicate(&conditions)?;
            print_json(&engine.delete(&table, predicate.as_ref())?)?
        }
        Commands::Rebuild { table } => print_json(&engine.rebuild_index(&table)?)?,
        Commands::Compact { table } => print_json(&engine.compact_table(&table)?)?,
        Commands::Drop { table } => print_json(&engine.drop_table(&table)?)?,
        Commands::DropDatabase => engine.drop_database()?,
        Commands::Save {
            partition,
            key,
            fields,
        } => {
            let document: Document = parse_fields(&fields)?
                .into_iter()
                .map(|(k, v)| serde_json::to_value(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()?;
            engine.partitions().save(&partition, &key, document)?;
        }
        Commands::Read { partition, key } => match key {
            Some(key) => print_json(&engine.partitions().read(&partition, &key)?)?,
            None => {
                for key in engine.partitions().keys(&partition)? {
                    println!("{}", key);
                }
            }
        },
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// `field=value` → (field, value); values parse as JSON scalars when possible
fn parse_pair(pair: &str) -> Result<(String, Value), String> {
    let (field, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {:?}", pair))?;
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
    Ok((field.to_string(), value))
}

fn parse_fields(pairs: &[String]) -> Result<Fields, String> {
    pairs.iter().map(|p| parse_pair(p)).collect()
}

fn parse_predicate(pairs: &[String]) -> Result<Option<Predicate>, String> {
    if pairs.is_empty() {
        return Ok(None);
    }
    Ok(Some(Predicate::from_fields(&parse_fields(pairs)?)))
}

/// `author_id=users._id` → Join
fn parse_join(arg: &str) -> Result<Join, String> {
    let (field, target) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected field=table.field, got {:?}", arg))?;
    let (table, foreign_field) = target
        .split_once('.')
        .ok_or_else(|| format!("expected field=table.field, got {:?}", arg))?;
    Ok(Join::new(field, table, foreign_field))
}
