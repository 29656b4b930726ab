//! Database schema for the events table.

use anyhow::Result;
use rusqlite::Connection;

/// Initialize the events schema.
///
/// Idempotent: uses CREATE TABLE IF NOT EXISTS so it can run on every open.
/// Loosely-typed columns hold the JSON spelling of whatever the client sent.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                experiment_id TEXT NOT NULL,
                user_id TEXT,
                variant TEXT,
                action_type TEXT,
                converted TEXT,
                completion_time TEXT,
                success TEXT,
                correct_words_count TEXT,
                total_guesses_count TEXT,
                timestamp TEXT,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_experiment ON events(experiment_id);
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_variant ON events(experiment_id, variant);
        ",
    )?;

    Ok(())
}
