#![allow(dead_code)]

use abstats_engine::store::{SqliteEventStore, TrackRequest};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Event database in a temp directory that is removed on drop
pub struct TestStore {
    _temp_dir: TempDir,
    pub store: SqliteEventStore,
}

impl TestStore {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        let store = SqliteEventStore::new(temp_dir.path().join("events.db"))?;
        Ok(Self {
            _temp_dir: temp_dir,
            store,
        })
    }

    /// Record one event through the ingestion path
    pub fn track(&self, fields: Value) -> Result<()> {
        let request: TrackRequest = serde_json::from_value(fields)?;
        self.store.record_event(&request)?;
        Ok(())
    }

    /// Write a row straight into the table, bypassing ingestion checks
    pub fn insert_raw(&self, variant: &str, action_type: &str, timestamp: &str) -> Result<()> {
        let conn = rusqlite::Connection::open(self.store.path())?;
        conn.execute(
            "INSERT INTO events (id, experiment_id, variant, action_type, timestamp)
             VALUES (?1, 'exp', ?2, ?3, ?4)",
            rusqlite::params![format!("raw-{variant}-{action_type}"), variant, action_type, timestamp],
        )?;
        Ok(())
    }

    /// `total` started rows for a variant, the first `converted` of them converted
    pub fn seed_conversions(&self, experiment_id: &str, variant: &str, converted: usize, total: usize) -> Result<()> {
        for i in 0..total {
            self.track(json!({
                "experiment_id": experiment_id,
                "user_id": format!("{variant}-{i}"),
                "variant": variant,
                "action_type": "started",
                "converted": i < converted,
                "timestamp": "2024-05-01T10:00:00Z",
            }))?;
        }
        Ok(())
    }

    /// One successful completion per time
    pub fn seed_completions(&self, experiment_id: &str, variant: &str, times: &[f64]) -> Result<()> {
        for (i, time) in times.iter().enumerate() {
            self.track(json!({
                "experiment_id": experiment_id,
                "user_id": format!("{variant}-done-{i}"),
                "variant": variant,
                "action_type": "completed",
                "converted": true,
                "success": true,
                "completion_time": time,
                "timestamp": format!("2024-05-{:02}T12:00:00Z", i + 1),
            }))?;
        }
        Ok(())
    }
}
