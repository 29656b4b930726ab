//! SQLite-backed event store.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::parse_timestamp;

use super::models::{RawEvent, TrackRequest};
use super::schema::init_schema;
use super::EventStore;

/// Event store backed by a SQLite database file.
///
/// Holds only the path; every call opens its own connection so concurrent
/// requests never share a handle.
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    db_path: PathBuf,
}

impl SqliteEventStore {
    /// Create or open the event database at the given path
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let store = Self { db_path };
        let conn = store.connection()?;
        init_schema(&conn)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("unable to open database {}", self.db_path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Persist one tracked event and return it as stored.
    ///
    /// Null fields are dropped; the timestamp is stamped here when the
    /// payload does not carry one, and rejected when it does not parse.
    pub fn record_event(&self, request: &TrackRequest) -> Result<RawEvent> {
        let experiment_id = match request.experiment_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => bail!("experiment_id is required"),
        };

        let timestamp = match request.timestamp.as_deref() {
            Some(ts) if parse_timestamp(ts).is_none() => bail!("Unparsable timestamp '{ts}'"),
            Some(ts) => ts.to_string(),
            None => Utc::now().to_rfc3339(),
        };

        let event = RawEvent {
            id: Some(uuid::Uuid::new_v4().to_string()),
            experiment_id,
            user_id: request.user_id_text(),
            variant: request.variant.clone(),
            action_type: request.action_type.clone(),
            converted: request.converted.clone(),
            completion_time: request.completion_time.clone(),
            success: request.success.clone(),
            correct_words_count: request.correct_words_count.clone(),
            total_guesses_count: request.total_guesses_count.clone(),
            timestamp: Some(timestamp),
            metadata: request.metadata.clone(),
        };

        let conn = self.connection()?;
        conn.execute(
            r"
            INSERT INTO events (
                id, experiment_id, user_id, variant, action_type, converted,
                completion_time, success, correct_words_count, total_guesses_count,
                timestamp, metadata
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
            params![
                &event.id,
                &event.experiment_id,
                &event.user_id,
                &event.variant,
                &event.action_type,
                json_column(&event.converted),
                json_column(&event.completion_time),
                json_column(&event.success),
                json_column(&event.correct_words_count),
                json_column(&event.total_guesses_count),
                &event.timestamp,
                json_column(&event.metadata),
            ],
        )?;

        log::debug!(
            "Recorded event {} for experiment {}",
            event.id.as_deref().unwrap_or("?"),
            event.experiment_id
        );

        Ok(event)
    }

    /// Total number of stored events across all experiments
    pub fn event_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Distinct experiment ids with at least one event, alphabetically
    pub fn experiment_ids(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT experiment_id FROM events ORDER BY experiment_id")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        ids.collect::<Result<Vec<String>, _>>().map_err(Into::into)
    }
}

impl EventStore for SqliteEventStore {
    fn fetch_events(&self, experiment_id: &str) -> Result<Vec<RawEvent>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, experiment_id, user_id, variant, action_type, converted,
                   completion_time, success, correct_words_count, total_guesses_count,
                   timestamp, metadata
            FROM events
            WHERE experiment_id = ?1
            ",
        )?;

        let events = stmt.query_map([experiment_id], |row| {
            Ok(RawEvent {
                id: row.get(0)?,
                experiment_id: row.get(1)?,
                user_id: row.get(2)?,
                variant: row.get(3)?,
                action_type: row.get(4)?,
                converted: parse_json_column(row.get(5)?),
                completion_time: parse_json_column(row.get(6)?),
                success: parse_json_column(row.get(7)?),
                correct_words_count: parse_json_column(row.get(8)?),
                total_guesses_count: parse_json_column(row.get(9)?),
                timestamp: row.get(10)?,
                metadata: parse_json_column(row.get(11)?),
            })
        })?;

        events
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read events for experiment {experiment_id}"))
    }
}

fn json_column(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Rows written by other tools may hold bare text rather than JSON; keep it as a string.
fn parse_json_column(raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
    }
}
