// Public-API clippy lints that don't pay off for a crate consumed by the API
// binary and the CLI only.
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod bayesian;
pub mod charts;
pub mod comparison;
pub mod dataset;
pub mod errors;
pub mod metrics;
pub mod percentile;
pub mod store;

pub use analysis::{AnalysisSummary, ExperimentAnalyzer, Report};
pub use errors::{AnalysisError, AnalysisResult, ErrorCode, ErrorDomain};
pub use store::{EventStore, MemoryEventStore, RawEvent, SqliteEventStore, TrackRequest};

use std::path::PathBuf;

/// Default database location, `~/.abstats/events.db`.
pub fn default_db_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("No home directory"))?
        .join(".abstats");
    Ok(dir.join("events.db"))
}
