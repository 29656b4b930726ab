//! Per-variant funnel counts, rates and completion-time statistics.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::dataset::{ActionType, Dataset, Variant};
use crate::errors::{AnalysisError, AnalysisResult};

/// Two-sided confidence level for the mean completion time
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Descriptive statistics of the completion-time sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStats {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for a single sample
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub count: usize,
    /// Present only with at least two samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_upper: Option<f64>,
}

/// Funnel counts with rates rounded for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSummary {
    pub started: usize,
    pub completed: usize,
    pub repeated: usize,
    pub completion_rate: f64,
    pub repeat_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub variant: String,
    pub n_users: usize,
    pub n_started: usize,
    pub n_completed: usize,
    pub n_repeated: usize,
    pub conversions: usize,
    /// conversions / n_users, in [0, 1]
    pub conversion_rate: f64,
    /// n_completed / n_started * 100
    pub completion_rate: f64,
    /// n_repeated / n_completed * 100
    pub repeat_rate: f64,
    pub funnel: FunnelSummary,
    pub time_stats: Option<TimeStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_completion_time: Option<f64>,
}

impl VariantMetrics {
    /// Number of rows that did not convert
    pub fn non_conversions(&self) -> usize {
        self.n_users - self.conversions
    }

    pub fn mean_time(&self) -> Option<f64> {
        self.time_stats.as_ref().map(|s| s.mean)
    }
}

/// Compute the metrics of one variant.
pub fn variant_metrics(dataset: &Dataset, variant: &Variant) -> AnalysisResult<VariantMetrics> {
    dataset.ensure_not_empty()?;

    let mut n_users = 0;
    let mut n_started = 0;
    let mut n_completed = 0;
    let mut n_repeated = 0;
    let mut conversions = 0;

    for event in dataset.variant_events(variant) {
        n_users += 1;
        match event.action_type {
            ActionType::Started => n_started += 1,
            ActionType::Completed => n_completed += 1,
            ActionType::Repeated => n_repeated += 1,
            ActionType::Other(_) => {}
        }
        if event.converted {
            conversions += 1;
        }
    }

    let conversion_rate = ratio(conversions, n_users);
    let completion_rate = ratio(n_completed, n_started) * 100.0;
    let repeat_rate = ratio(n_repeated, n_completed) * 100.0;
    let time_stats = time_stats(&dataset.completion_times(variant))?;

    Ok(VariantMetrics {
        variant: variant.to_string(),
        n_users,
        n_started,
        n_completed,
        n_repeated,
        conversions,
        conversion_rate,
        completion_rate,
        repeat_rate,
        funnel: FunnelSummary {
            started: n_started,
            completed: n_completed,
            repeated: n_repeated,
            completion_rate: round_to(completion_rate, 1),
            repeat_rate: round_to(repeat_rate, 1),
        },
        avg_completion_time: time_stats.as_ref().map(|s| s.mean),
        time_stats,
    })
}

/// Descriptive statistics with a Student-t confidence interval for the mean.
///
/// Returns `None` for an empty sample.
pub fn time_stats(sample: &[f64]) -> AnalysisResult<Option<TimeStats>> {
    if sample.is_empty() {
        return Ok(None);
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = mean(&sorted);
    let std = sample_std(&sorted);

    let (ci_lower, ci_upper) = if count >= 2 {
        let (lower, upper) = t_interval(mean, std, count)?;
        (Some(lower), Some(upper))
    } else {
        (None, None)
    };

    Ok(Some(TimeStats {
        mean,
        median: quantile(&sorted, 0.5),
        std,
        min: sorted[0],
        max: sorted[count - 1],
        q25: quantile(&sorted, 0.25),
        q75: quantile(&sorted, 0.75),
        count,
        ci_lower,
        ci_upper,
    }))
}

#[allow(clippy::cast_precision_loss)]
fn t_interval(mean: f64, std: f64, count: usize) -> AnalysisResult<(f64, f64)> {
    let n = count as f64;
    let dist = StudentsT::new(0.0, 1.0, n - 1.0)
        .map_err(|e| AnalysisError::numeric_failure("Student-t interval", &e.to_string()))?;
    let t_crit = dist.inverse_cdf(1.0 - (1.0 - CONFIDENCE_LEVEL) / 2.0);
    let margin = t_crit * std / n.sqrt();
    Ok((mean - margin, mean + margin))
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance with the n - 1 denominator; 0 below two values
#[allow(clippy::cast_precision_loss)]
pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub(crate) fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Linear-interpolation quantile of an ascending, non-empty slice
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
