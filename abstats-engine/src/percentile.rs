//! Percentile ranking of a single completion time.
//!
//! The raw percentile uses the mean-rank convention: with `left` values
//! strictly below the score and `right` values at or below it,
//!
//! ```text
//! raw = (left + right + (right > left ? 1 : 0)) * 50 / n
//! ```
//!
//! so a score tied with k sample values sits at the average of the ranks
//! those values span. The reported percentile is `100 - raw`: lower times
//! rank higher. For `[8, 9, 10, 11, 12]` and a time of 10 the raw rank is
//! 60 and the reported percentile 40, i.e. faster than the two slower
//! players out of five.

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Variant};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::metrics::round_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileReport {
    pub user_time: f64,
    pub variant: String,
    pub variant_percentile: f64,
    pub overall_percentile: f64,
    pub faster_than_variant: String,
    pub faster_than_overall: String,
}

/// Rank `user_time` against the variant's and the pooled completion times.
///
/// `Ok(None)` when the variant has no qualifying samples.
pub fn user_percentile(
    dataset: &Dataset,
    variant: &Variant,
    user_time: f64,
) -> AnalysisResult<Option<PercentileReport>> {
    dataset.ensure_not_empty()?;
    if !variant.is_arm() {
        return Err(AnalysisError::invalid_variant(variant.as_str()));
    }
    if !user_time.is_finite() {
        return Err(AnalysisError::invalid_value("user_time", "must be a finite number"));
    }

    let variant_times = dataset.completion_times(variant);
    if variant_times.is_empty() {
        return Ok(None);
    }
    let overall_times = dataset.pooled_completion_times();

    let variant_percentile = round_to(100.0 - percentile_of_score(&variant_times, user_time), 1);
    let overall_percentile = round_to(100.0 - percentile_of_score(&overall_times, user_time), 1);

    Ok(Some(PercentileReport {
        user_time,
        variant: variant.to_string(),
        variant_percentile,
        overall_percentile,
        faster_than_variant: format!(
            "Faster than {variant_percentile:.1}% of Variant {variant} players"
        ),
        faster_than_overall: format!("Faster than {overall_percentile:.1}% of all players"),
    }))
}

/// Mean-rank percentile of `score` within `sample`, in [0, 100].
#[allow(clippy::cast_precision_loss)]
pub fn percentile_of_score(sample: &[f64], score: f64) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let left = sample.iter().filter(|&&v| v < score).count();
    let right = sample.iter().filter(|&&v| v <= score).count();
    let plus_one = usize::from(right > left);
    (left + right + plus_one) as f64 * 50.0 / sample.len() as f64
}
