//! Dataset loading: typed, variant-partitioned events for one experiment.
//!
//! Raw records are coerced field by field. Flags and timings are forgiving
//! (anything unparsable becomes `false` / `None`), timestamps are not: an
//! unparsable timestamp fails the whole load because the date range of the
//! dataset can no longer be established.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{AnalysisError, AnalysisResult};
use crate::store::RawEvent;

/// Experiment arm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variant {
    A,
    B,
    /// Any other label; counted in the sample size, excluded from per-variant metrics
    Other(String),
}

impl Variant {
    /// Exact, case-sensitive match; padded labels are `Other`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "A" => Self::A,
            "B" => Self::B,
            other => Self::Other(other.to_string()),
        }
    }

    /// Parse a caller-supplied label, rejecting anything but the two arms
    pub fn parse_arm(raw: &str) -> AnalysisResult<Self> {
        match Self::parse(raw) {
            Self::Other(_) => Err(AnalysisError::invalid_variant(raw)),
            arm => Ok(arm),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_arm(&self) -> bool {
        matches!(self, Self::A | Self::B)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Funnel step recorded by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionType {
    Started,
    Completed,
    Repeated,
    Other(String),
}

impl ActionType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "started" => Self::Started,
            "completed" => Self::Completed,
            "repeated" => Self::Repeated,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A normalized event.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: Option<String>,
    pub experiment_id: String,
    pub user_id: Option<String>,
    pub variant: Variant,
    pub action_type: ActionType,
    pub converted: bool,
    pub completion_time: Option<f64>,
    pub success: Option<bool>,
    pub correct_words_count: Option<i64>,
    pub total_guesses_count: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl Event {
    /// Coerce a raw record.
    pub fn from_raw(raw: RawEvent) -> AnalysisResult<Self> {
        let timestamp = match raw.timestamp.as_deref() {
            Some(text) => {
                parse_timestamp(text).ok_or_else(|| AnalysisError::malformed_timestamp(text))?
            }
            None => {
                return Err(AnalysisError::malformed_record("event has no timestamp")
                    .with_details(serde_json::json!({ "id": raw.id })));
            }
        };

        Ok(Self {
            id: raw.id,
            experiment_id: raw.experiment_id,
            user_id: raw.user_id,
            variant: raw
                .variant
                .as_deref()
                .map_or_else(|| Variant::Other(String::new()), Variant::parse),
            action_type: raw
                .action_type
                .as_deref()
                .map_or_else(|| ActionType::Other(String::new()), ActionType::parse),
            converted: truthy(&raw.converted),
            completion_time: coerce_f64(&raw.completion_time),
            success: coerce_optional_bool(&raw.success),
            correct_words_count: coerce_i64(&raw.correct_words_count),
            total_guesses_count: coerce_i64(&raw.total_guesses_count),
            timestamp,
            metadata: raw.metadata,
        })
    }

    /// Only successful completions contribute to completion-time statistics
    pub fn is_successful_completion(&self) -> bool {
        self.action_type == ActionType::Completed && self.success == Some(true)
    }
}

/// First and last event timestamp across the whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// All events for one experiment. Rebuilt for every request, never shared.
#[derive(Debug, Clone)]
pub struct Dataset {
    experiment_id: String,
    events: Vec<Event>,
}

impl Dataset {
    /// Normalize the raw records fetched for `experiment_id`.
    ///
    /// An empty input yields an empty dataset; callers decide how to report it.
    pub fn load(experiment_id: &str, raw: Vec<RawEvent>) -> AnalysisResult<Self> {
        let mut events = Vec::with_capacity(raw.len());
        for record in raw {
            if record.experiment_id != experiment_id {
                return Err(AnalysisError::malformed_record(&format!(
                    "event belongs to experiment '{}', expected '{experiment_id}'",
                    record.experiment_id
                )));
            }
            events.push(Event::from_raw(record).inspect_err(|e| {
                log::warn!("Rejecting dataset for {experiment_id}: {e}");
            })?);
        }

        log::debug!("Loaded {} events for experiment {experiment_id}", events.len());

        Ok(Self::from_events(experiment_id, events))
    }

    pub fn from_events(experiment_id: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            events,
        }
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Fail fast on an empty dataset
    pub fn ensure_not_empty(&self) -> AnalysisResult<()> {
        if self.is_empty() {
            Err(AnalysisError::no_data())
        } else {
            Ok(())
        }
    }

    /// Events belonging to one variant
    pub fn variant_events<'a>(&'a self, variant: &'a Variant) -> impl Iterator<Item = &'a Event> {
        self.events.iter().filter(move |e| &e.variant == variant)
    }

    /// Completion times of successful completions for one variant, nulls dropped
    pub fn completion_times(&self, variant: &Variant) -> Vec<f64> {
        self.variant_events(variant)
            .filter(|e| e.is_successful_completion())
            .filter_map(|e| e.completion_time)
            .collect()
    }

    /// Completion times pooled across both arms
    pub fn pooled_completion_times(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter(|e| e.variant.is_arm() && e.is_successful_completion())
            .filter_map(|e| e.completion_time)
            .collect()
    }

    pub fn date_range(&self) -> Option<DateRange> {
        let start = self.events.iter().map(|e| e.timestamp).min()?;
        let end = self.events.iter().map(|e| e.timestamp).max()?;
        Some(DateRange { start, end })
    }
}

/// RFC 3339, or a naive ISO-8601 datetime taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Truthiness of a loosely-typed flag.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "1" | "yes" | "y"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn coerce_optional_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        other => Some(truthy(other)),
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

#[allow(clippy::cast_possible_truncation)]
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
