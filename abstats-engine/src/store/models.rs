//! Record shapes exchanged with the event store.
//!
//! Stored events are deliberately loosely typed: the ingestion endpoint accepts
//! whatever the client sends for flags and timings, and the dataset loader is
//! responsible for coercing them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event exactly as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub experiment_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub converted: Value,
    #[serde(default)]
    pub completion_time: Value,
    #[serde(default)]
    pub success: Value,
    #[serde(default)]
    pub correct_words_count: Value,
    #[serde(default)]
    pub total_guesses_count: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl RawEvent {
    /// Minimal record for an experiment; remaining fields are null.
    pub fn new(experiment_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: None,
            experiment_id: experiment_id.into(),
            user_id: None,
            variant: None,
            action_type: None,
            converted: Value::Null,
            completion_time: Value::Null,
            success: Value::Null,
            correct_words_count: Value::Null,
            total_guesses_count: Value::Null,
            timestamp: Some(timestamp.into()),
            metadata: Value::Null,
        }
    }
}

/// Ingestion payload accepted by `POST /api/track`.
///
/// Every field is optional at the type level so a partial payload still
/// deserializes; `experiment_id` is validated by the store before insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub experiment_id: Option<String>,
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub converted: Value,
    #[serde(default)]
    pub completion_time: Value,
    #[serde(default)]
    pub success: Value,
    #[serde(default)]
    pub correct_words_count: Value,
    #[serde(default)]
    pub total_guesses_count: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl TrackRequest {
    /// The user id as text; numeric ids are kept in their JSON spelling.
    pub fn user_id_text(&self) -> Option<String> {
        match &self.user_id {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
