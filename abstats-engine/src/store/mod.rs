//! Event store adapter.
//!
//! The analysis engine only ever reads events through the [`EventStore`]
//! trait: one non-mutating query per analysis, returning every event recorded
//! for an experiment in no particular order.
//!
//! # Module Structure
//!
//! - [`models`]: Raw record and ingestion payload shapes
//! - [`schema`]: Database schema
//! - [`db`]: SQLite-backed store
//!
//! # Example
//!
//! ```ignore
//! use abstats_engine::store::{EventStore, SqliteEventStore};
//!
//! let store = SqliteEventStore::new("events.db")?;
//! let events = store.fetch_events("homepage-cta")?;
//! ```

mod db;
mod models;
mod schema;

pub use db::SqliteEventStore;
pub use models::{RawEvent, TrackRequest};

use anyhow::Result;

/// Read access to recorded events, shared by every concurrent analysis.
pub trait EventStore: Send + Sync {
    /// All events for an experiment, unordered and possibly empty.
    fn fetch_events(&self, experiment_id: &str) -> Result<Vec<RawEvent>>;
}

/// In-memory store, used for offline analysis of exported events.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    events: Vec<RawEvent>,
}

impl MemoryEventStore {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: RawEvent) {
        self.events.push(event);
    }
}

impl EventStore for MemoryEventStore {
    fn fetch_events(&self, experiment_id: &str) -> Result<Vec<RawEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.experiment_id == experiment_id)
            .cloned()
            .collect())
    }
}
