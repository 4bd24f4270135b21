//! VELLUM CLI
//!
//! Operates on a redb-backed object store with superuser permissions, and
//! decodes bitmask permission tables into SQL predicates.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vellum_core::{CoreResult, LabelDelta, LabelSet, ObjectId, UserId};
use vellum_policy::{Operation, Principal, from_bitmasks};
use vellum_storage::{Attributes, ObjectDraft, ObjectStore, RedbBackend, StoreConfig};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(about = "VELLUM - versioned, label-gated object store", long_about = None)]
struct Cli {
    /// Path to the store database
    #[arg(long, default_value = "vellum.redb", global = true)]
    db: PathBuf,
    /// JSON store configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Store(StoreCommand),
    /// Print the SQL predicate for a bitmask permission table
    Predicate {
        /// JSON file of `[label, allow, deny]` rows
        #[arg(long)]
        bitmasks: PathBuf,
        /// Operation bits, as `read=1,update=2`
        #[arg(long, value_delimiter = ',', value_parser = parse_bits)]
        bits: Vec<(Operation, u64)>,
        /// Operation to build the predicate for
        #[arg(long, default_value = "read")]
        operation: Operation,
        /// Labels column name
        #[arg(long, default_value = "labels")]
        column: String,
        /// Exclude rows carrying any of these labels
        #[arg(long, value_parser = parse_labels)]
        exclude: Option<LabelSet>,
    },
}

#[derive(Subcommand)]
enum StoreCommand {
    /// Create an object
    Create {
        /// Labels, comma separated
        #[arg(short, long, default_value = "", value_parser = parse_labels)]
        labels: LabelSet,
        /// Attributes as a JSON object
        #[arg(short, long, default_value = "{}")]
        attrs: String,
        /// Requested object ID
        #[arg(long)]
        id: Option<ObjectId>,
    },
    /// Print the current version of an object
    Read {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
        /// Version to read instead of the current one
        #[arg(long)]
        version: Option<u64>,
    },
    /// Print an object with its retired versions
    History {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
    },
    /// Change an object's labels
    Relabel {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
        /// Labels to add
        #[arg(long, default_value = "", value_parser = parse_labels)]
        add: LabelSet,
        /// Labels to remove
        #[arg(long, default_value = "", value_parser = parse_labels)]
        remove: LabelSet,
    },
    /// Mark an object deleted
    Delete {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
    },
    /// Clear an object's deleted mark
    Undelete {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
    },
    /// Remove an object and its history
    Erase {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
    },
    /// Remove an object's retired versions
    EraseHistory {
        /// Object ID
        #[arg(short, long)]
        id: ObjectId,
    },
    /// Count objects
    Count {
        /// Skip objects carrying any of these labels
        #[arg(long, value_parser = parse_labels)]
        exclude: Option<LabelSet>,
    },
}

fn parse_labels(list: &str) -> CoreResult<LabelSet> {
    let list: String = list.chars().filter(|c| !c.is_whitespace()).collect();
    LabelSet::parse(&format!("{{{list}}}"))
}

fn parse_bits(pair: &str) -> std::result::Result<(Operation, u64), String> {
    let (operation, bit) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected operation=bit, got {pair:?}"))?;
    let bit = bit
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("bad bit for {operation}: {e}"))?;
    Ok((Operation::new(operation.trim()), bit))
}

fn open_store(cli: &Cli) -> Result<ObjectStore> {
    let config = match &cli.config {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::default(),
    };
    let backend = RedbBackend::open(&cli.db)
        .wrap_err_with(|| format!("opening {}", cli.db.display()))?;
    debug!(db = %cli.db.display(), "store opened");
    Ok(ObjectStore::with_config(Arc::new(backend), config)?)
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn predicate(
    bitmasks: &Path,
    bits: &[(Operation, u64)],
    operation: &Operation,
    column: &str,
    exclude: Option<&LabelSet>,
) -> Result<Value> {
    let json = std::fs::read_to_string(bitmasks)
        .wrap_err_with(|| format!("reading {}", bitmasks.display()))?;
    let rows: Vec<(u64, u64, u64)> = serde_json::from_str(&json)?;
    let statement = from_bitmasks(&rows, bits)?;
    Ok(json!({
        "statement": statement.describe(),
        "predicate": statement.sql_condition(operation, column, exclude),
    }))
}

fn execute(store: &ObjectStore, command: &StoreCommand) -> Result<Value> {
    let principal = Principal::superuser(UserId::SYSTEM);
    let value = match command {
        StoreCommand::Create { labels, attrs, id } => {
            let attributes: Attributes = serde_json::from_str(attrs)?;
            let draft = ObjectDraft::new()
                .with_labels(labels.clone())
                .with_attributes(attributes);
            let object = store.create(&principal, draft, None, *id)?;
            serde_json::to_value(&*object)?
        }
        StoreCommand::Read { id, version: None } => match store.read(&principal, *id)? {
            Some(object) => serde_json::to_value(&*object)?,
            None => return Err(eyre!("object {id} not found")),
        },
        StoreCommand::Read {
            id,
            version: Some(version),
        } => serde_json::to_value(&*store.read_version(&principal, *id, *version)?)?,
        StoreCommand::History { id } => {
            let history = store
                .history(&principal, *id)?
                .ok_or_else(|| eyre!("object {id} not found"))?;
            json!({
                "object": &*history.object,
                "versions": history.versions,
            })
        }
        StoreCommand::Relabel { id, add, remove } => {
            let changes = LabelDelta::new(add.clone(), remove.clone());
            serde_json::to_value(&*store.relabel(&principal, *id, &changes)?)?
        }
        StoreCommand::Delete { id } => serde_json::to_value(&*store.delete(&principal, *id)?)?,
        StoreCommand::Undelete { id } => {
            serde_json::to_value(&*store.undelete(&principal, *id)?)?
        }
        StoreCommand::Erase { id } => {
            store.erase(&principal, *id)?;
            json!({ "erased": id })
        }
        StoreCommand::EraseHistory { id } => {
            let removed = store.erase_history(&principal, *id)?;
            json!({ "id": id, "removed_versions": removed })
        }
        StoreCommand::Count { exclude } => {
            json!({ "count": store.count_objects(exclude.as_ref())? })
        }
    };
    Ok(value)
}

fn run(cli: &Cli) -> Result<Value> {
    match &cli.command {
        Commands::Predicate {
            bitmasks,
            bits,
            operation,
            column,
            exclude,
        } => predicate(bitmasks, bits, operation, column, exclude.as_ref()),
        Commands::Store(command) => {
            let store = open_store(cli)?;
            let value = execute(&store, command)?;
            debug!(stats = ?store.statistics(), "command finished");
            Ok(value)
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vellum=info,vellum_storage=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let value = run(&cli)?;
    print(&value)
}
