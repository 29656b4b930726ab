//! abstats CLI
//!
//! Offline access to the event database: run reports, rank a time, import
//! exported events.

use abstats_engine::store::SqliteEventStore;
use abstats_engine::{default_db_path, ExperimentAnalyzer, Report, TrackRequest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "abstats")]
#[command(about = "A/B experiment statistics", long_about = None)]
struct Cli {
    /// Event database (defaults to ~/.abstats/events.db)
    #[arg(long, env = "ABSTATS_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full statistical report for an experiment
    Report {
        experiment_id: String,
    },

    /// Percentile rank of one completion time
    Percentile {
        experiment_id: String,

        /// Variant the user played (A or B)
        variant: String,

        /// Completion time in seconds
        time: f64,
    },

    /// Import events from a JSON-lines file
    Import {
        /// One tracked event per line
        file: PathBuf,

        /// Override the experiment id of every imported event
        #[arg(long)]
        experiment_id: Option<String>,
    },

    /// List experiments with recorded events
    List,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let store = SqliteEventStore::new(&db_path)
        .with_context(|| format!("Failed to open event database {}", db_path.display()))?;

    match cli.command {
        Commands::Report { experiment_id } => {
            let analyzer = ExperimentAnalyzer::new(&store, experiment_id);
            print_report(&Report::from_result(analyzer.analyze())?)?;
        }
        Commands::Percentile {
            experiment_id,
            variant,
            time,
        } => {
            let analyzer = ExperimentAnalyzer::new(&store, experiment_id);
            print_report(&Report::from_result(analyzer.user_percentile(time, &variant))?)?;
        }
        Commands::Import {
            file,
            experiment_id,
        } => {
            let imported = import_events(&store, &file, experiment_id.as_deref())?;
            println!("Imported {imported} events into {}", store.path().display());
        }
        Commands::List => {
            for id in store.experiment_ids()? {
                println!("{id}");
            }
        }
    }

    Ok(())
}

fn print_report<T: Serialize>(report: &Report<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn import_events(store: &SqliteEventStore, path: &Path, experiment_id: Option<&str>) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut imported = 0;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut request: TrackRequest = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), index + 1))?;
        if let Some(id) = experiment_id {
            request.experiment_id = Some(id.to_string());
        }
        store
            .record_event(&request)
            .with_context(|| format!("{}:{}: rejected event", path.display(), index + 1))?;
        imported += 1;
    }

    log::info!("Imported {imported} events from {}", path.display());
    Ok(imported)
}
