//! Cross-variant hypothesis tests and the relative-difficulty summary.
//!
//! Two tests run when their preconditions hold:
//!
//! - `completion_time`: pooled-variance two-sample t-test plus Cohen's d,
//!   when both variants have at least two completion-time samples.
//! - `success_rate`: chi-square test of independence on the 2x2 table of
//!   conversions vs. non-conversions, when both variants have at least five
//!   rows and no cell of the table is zero.
//!
//! A test whose preconditions fail is omitted from the result, not reported
//! as an error.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, StudentsT};

use crate::dataset::{Dataset, Variant};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::metrics::{mean, round_to, sample_variance, variant_metrics, VariantMetrics};

/// Fixed significance threshold
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Minimum rows per variant for the success-rate test
pub const MIN_USERS_FOR_RATE_TEST: usize = 5;

/// Minimum completion-time samples per variant for the t-test
pub const MIN_SAMPLES_FOR_TIME_TEST: usize = 2;

/// Relative difference below which the variants count as equally hard, in percent
pub const SIMILAR_DIFFICULTY_PERCENT: f64 = 5.0;

/// Magnitude label for Cohen's d.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn from_cohens_d(d: f64) -> Self {
        let magnitude = d.abs();
        if magnitude < 0.2 {
            Self::Negligible
        } else if magnitude < 0.5 {
            Self::Small
        } else if magnitude < 0.8 {
            Self::Medium
        } else {
            Self::Large
        }
    }
}

/// Completion-time comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTest {
    /// Absent when both samples are constant but differ, so the statistic is unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_statistic: Option<f64>,
    pub p_value: f64,
    pub significant: bool,
    /// (mean_a - mean_b) / pooled_std; negative when A is faster
    pub cohens_d: f64,
    pub effect_size: EffectSize,
    pub degrees_of_freedom: usize,
    pub mean_a: f64,
    pub mean_b: f64,
}

/// Conversion comparison on the 2x2 contingency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRateTest {
    pub chi_square: f64,
    pub p_value: f64,
    pub significant: bool,
    pub degrees_of_freedom: usize,
    /// `[[a_success, a_fail], [b_success, b_fail]]`
    pub contingency: [[usize; 2]; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalTests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<TimeTest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<SuccessRateTest>,
}

/// Relative difficulty of B against A. Empty when either variant lacks time stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifficultyAnalysis {
    /// mean_b / mean_a, only when mean_a > 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_harder: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    /// Conversion-rate difference B - A, in percentage points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate_diff: Option<f64>,
}

impl DifficultyAnalysis {
    pub fn is_empty(&self) -> bool {
        self.difficulty_ratio.is_none() && self.success_rate_diff.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub variant_a: VariantMetrics,
    pub variant_b: VariantMetrics,
    pub statistical_tests: StatisticalTests,
    pub difficulty_analysis: DifficultyAnalysis,
}

/// Compare both variants of the dataset.
pub fn compare(dataset: &Dataset) -> AnalysisResult<ComparisonResult> {
    dataset.ensure_not_empty()?;

    let variant_a = variant_metrics(dataset, &Variant::A)?;
    let variant_b = variant_metrics(dataset, &Variant::B)?;
    if variant_a.n_users == 0 || variant_b.n_users == 0 {
        return Err(AnalysisError::insufficient_variant_data(
            variant_a.n_users,
            variant_b.n_users,
        ));
    }

    let times_a = dataset.completion_times(&Variant::A);
    let times_b = dataset.completion_times(&Variant::B);

    let statistical_tests = StatisticalTests {
        completion_time: completion_time_test(&times_a, &times_b)?,
        success_rate: success_rate_test(&variant_a, &variant_b)?,
    };
    let difficulty_analysis = difficulty_analysis(&variant_a, &variant_b);

    Ok(ComparisonResult {
        variant_a,
        variant_b,
        statistical_tests,
        difficulty_analysis,
    })
}

/// Pooled-variance t-test and Cohen's d, or `None` below two samples per side.
#[allow(clippy::cast_precision_loss)]
pub fn completion_time_test(times_a: &[f64], times_b: &[f64]) -> AnalysisResult<Option<TimeTest>> {
    if times_a.len() < MIN_SAMPLES_FOR_TIME_TEST || times_b.len() < MIN_SAMPLES_FOR_TIME_TEST {
        return Ok(None);
    }

    let n1 = times_a.len() as f64;
    let n2 = times_b.len() as f64;
    let mean_a = mean(times_a);
    let mean_b = mean(times_b);
    let pooled_std = pooled_std(times_a, times_b);
    let degrees_of_freedom = times_a.len() + times_b.len() - 2;

    let cohens_d = if pooled_std == 0.0 {
        0.0
    } else {
        (mean_a - mean_b) / pooled_std
    };

    let se = pooled_std * (1.0 / n1 + 1.0 / n2).sqrt();
    let (t_statistic, p_value) = if se > 0.0 {
        let t = (mean_a - mean_b) / se;
        let dist = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
            .map_err(|e| AnalysisError::numeric_failure("t-test", &e.to_string()))?;
        (Some(t), (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
    } else if mean_a == mean_b {
        (Some(0.0), 1.0)
    } else {
        // no spread on either side: the groups separate perfectly
        (None, 0.0)
    };

    Ok(Some(TimeTest {
        t_statistic,
        p_value,
        significant: p_value < SIGNIFICANCE_LEVEL,
        cohens_d,
        effect_size: EffectSize::from_cohens_d(cohens_d),
        degrees_of_freedom,
        mean_a,
        mean_b,
    }))
}

/// Standard deviation pooled with (n1 - 1) and (n2 - 1) weights
#[allow(clippy::cast_precision_loss)]
pub fn pooled_std(times_a: &[f64], times_b: &[f64]) -> f64 {
    let n1 = times_a.len() as f64;
    let n2 = times_b.len() as f64;
    let weighted = (n1 - 1.0) * sample_variance(times_a) + (n2 - 1.0) * sample_variance(times_b);
    (weighted / (n1 + n2 - 2.0)).sqrt()
}

/// Chi-square test on conversions, or `None` when a cell would be empty.
pub fn success_rate_test(
    a: &VariantMetrics,
    b: &VariantMetrics,
) -> AnalysisResult<Option<SuccessRateTest>> {
    if a.n_users < MIN_USERS_FOR_RATE_TEST || b.n_users < MIN_USERS_FOR_RATE_TEST {
        return Ok(None);
    }

    let contingency = [
        [a.conversions, a.non_conversions()],
        [b.conversions, b.non_conversions()],
    ];
    if contingency.iter().flatten().any(|&cell| cell == 0) {
        return Ok(None);
    }

    let chi_square = chi_square_2x2(contingency);
    let dist = ChiSquared::new(1.0)
        .map_err(|e| AnalysisError::numeric_failure("chi-square test", &e.to_string()))?;
    let p_value = dist.sf(chi_square).clamp(0.0, 1.0);

    Ok(Some(SuccessRateTest {
        chi_square,
        p_value,
        significant: p_value < SIGNIFICANCE_LEVEL,
        degrees_of_freedom: 1,
        contingency,
    }))
}

/// Pearson statistic with Yates' continuity correction.
///
/// Each |observed - expected| is reduced by at most 0.5, never past zero.
#[allow(clippy::cast_precision_loss)]
pub fn chi_square_2x2(table: [[usize; 2]; 2]) -> f64 {
    let total: usize = table.iter().flatten().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let row_totals = [table[0][0] + table[0][1], table[1][0] + table[1][1]];
    let col_totals = [table[0][0] + table[1][0], table[0][1] + table[1][1]];

    let mut chi_sq = 0.0;
    for (i, row) in table.iter().enumerate() {
        for (j, &observed) in row.iter().enumerate() {
            let expected = row_totals[i] as f64 * col_totals[j] as f64 / total;
            if expected > 0.0 {
                let deviation = ((observed as f64 - expected).abs() - 0.5).max(0.0);
                chi_sq += deviation * deviation / expected;
            }
        }
    }
    chi_sq
}

/// Difficulty of B relative to A from mean completion times.
pub fn difficulty_analysis(a: &VariantMetrics, b: &VariantMetrics) -> DifficultyAnalysis {
    let (Some(mean_a), Some(mean_b)) = (a.mean_time(), b.mean_time()) else {
        return DifficultyAnalysis::default();
    };

    let success_rate_diff = Some(round_to((b.conversion_rate - a.conversion_rate) * 100.0, 2));
    if mean_a <= 0.0 {
        return DifficultyAnalysis {
            success_rate_diff,
            ..DifficultyAnalysis::default()
        };
    }

    let ratio = mean_b / mean_a;
    let percent_harder = (ratio - 1.0) * 100.0;
    let interpretation = if percent_harder.abs() < SIMILAR_DIFFICULTY_PERCENT {
        "similar difficulty".to_string()
    } else if percent_harder > 0.0 {
        format!("Variant B is {percent_harder:.1}% harder")
    } else {
        format!("Variant A is {:.1}% harder", percent_harder.abs())
    };

    DifficultyAnalysis {
        difficulty_ratio: Some(round_to(ratio, 3)),
        percent_harder: Some(round_to(percent_harder, 1)),
        interpretation: Some(interpretation),
        success_rate_diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Event;
    use crate::store::RawEvent;
    use serde_json::json;

    fn row(variant: &str, converted: bool) -> Event {
        Event::from_raw(RawEvent {
            variant: Some(variant.to_string()),
            action_type: Some("started".to_string()),
            converted: json!(converted),
            ..RawEvent::new("exp", "2024-05-01T10:00:00Z")
        })
        .unwrap()
    }

    fn completion(variant: &str, seconds: f64) -> Event {
        Event::from_raw(RawEvent {
            variant: Some(variant.to_string()),
            action_type: Some("completed".to_string()),
            converted: json!(true),
            success: json!(true),
            completion_time: json!(seconds),
            ..RawEvent::new("exp", "2024-05-01T10:00:00Z")
        })
        .unwrap()
    }

    fn conversions(variant: &str, converted: usize, total: usize) -> Vec<Event> {
        (0..total).map(|i| row(variant, i < converted)).collect()
    }

    #[test]
    fn test_effect_size_boundaries() {
        assert_eq!(EffectSize::from_cohens_d(0.0), EffectSize::Negligible);
        assert_eq!(EffectSize::from_cohens_d(-0.19), EffectSize::Negligible);
        assert_eq!(EffectSize::from_cohens_d(0.2), EffectSize::Small);
        assert_eq!(EffectSize::from_cohens_d(0.5), EffectSize::Medium);
        assert_eq!(EffectSize::from_cohens_d(-0.8), EffectSize::Large);
    }

    #[test]
    fn test_chi_square_with_continuity_correction() {
        // expected 7.5 / 2.5 per row, |O - E| = 1.5 corrected to 1.0
        let chi = chi_square_2x2([[6, 4], [9, 1]]);
        let expected = 2.0 / 7.5 + 2.0 / 2.5;
        assert!((chi - expected).abs() < 1e-12);
    }

    #[test]
    fn test_chi_square_identical_rows_is_zero() {
        assert_eq!(chi_square_2x2([[5, 5], [5, 5]]), 0.0);
    }

    #[test]
    fn test_success_rate_test_on_contingency() {
        let mut events = conversions("A", 6, 10);
        events.extend(conversions("B", 9, 10));
        let result = compare(&Dataset::from_events("exp", events)).unwrap();

        let test = result.statistical_tests.success_rate.unwrap();
        assert_eq!(test.contingency, [[6, 4], [9, 1]]);
        assert_eq!(test.degrees_of_freedom, 1);
        assert!((test.chi_square - 1.066_667).abs() < 1e-5);
        assert!((test.p_value - 0.3017).abs() < 1e-3);
        assert!(!test.significant);
    }

    #[test]
    fn test_success_rate_test_omitted_on_zero_cell() {
        let mut events = conversions("A", 10, 10);
        events.extend(conversions("B", 4, 10));
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        assert!(result.statistical_tests.success_rate.is_none());
    }

    #[test]
    fn test_success_rate_test_omitted_below_min_users() {
        let mut events = conversions("A", 2, 4);
        events.extend(conversions("B", 4, 10));
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        assert!(result.statistical_tests.success_rate.is_none());
    }

    #[test]
    fn test_missing_variant_is_structured_error() {
        let events = conversions("A", 3, 6);
        let err = compare(&Dataset::from_events("exp", events)).unwrap_err();
        assert_eq!(err.message, "Need data from both variants");
    }

    #[test]
    fn test_completion_time_test_large_negative_effect() {
        let a = [10.0, 12.0, 11.0, 13.0, 10.0];
        let b = [15.0, 16.0, 14.0, 17.0, 15.0];
        let test = completion_time_test(&a, &b).unwrap().unwrap();

        // pooled variance (6.8 + 5.2) / 8 = 1.5
        let d = (11.2 - 15.4) / 1.5f64.sqrt();
        assert!((test.cohens_d - d).abs() < 1e-12);
        assert!(test.cohens_d < 0.0);
        assert_eq!(test.effect_size, EffectSize::Large);
        assert_eq!(test.degrees_of_freedom, 8);

        let t = (11.2 - 15.4) / (1.5f64.sqrt() * 0.4f64.sqrt());
        assert!((test.t_statistic.unwrap() - t).abs() < 1e-9);
        assert!(test.p_value < 0.001);
        assert!(test.significant);
    }

    #[test]
    fn test_cohens_d_sign_follows_a_minus_b() {
        let test = completion_time_test(&[20.0, 22.0, 21.0], &[10.0, 12.0, 11.0])
            .unwrap()
            .unwrap();
        assert!(test.cohens_d > 0.0);
    }

    #[test]
    fn test_zero_pooled_std_gives_zero_effect() {
        let test = completion_time_test(&[5.0, 5.0], &[5.0, 5.0, 5.0]).unwrap().unwrap();
        assert_eq!(test.cohens_d, 0.0);
        assert_eq!(test.effect_size, EffectSize::Negligible);
        assert_eq!(test.t_statistic, Some(0.0));
        assert_eq!(test.p_value, 1.0);
        assert!(!test.significant);
    }

    #[test]
    fn test_constant_but_different_samples_are_significant() {
        let test = completion_time_test(&[5.0, 5.0, 5.0], &[9.0, 9.0, 9.0]).unwrap().unwrap();
        assert_eq!(test.t_statistic, None);
        assert_eq!(test.p_value, 0.0);
        assert!(test.significant);
        assert_eq!(test.cohens_d, 0.0);
        assert_eq!(test.mean_b, 9.0);

        let body = serde_json::to_value(&test).unwrap();
        assert!(body.get("t_statistic").is_none());
        assert_eq!(body["p_value"], 0.0);
    }

    #[test]
    fn test_completion_time_test_requires_two_samples() {
        assert!(completion_time_test(&[5.0], &[5.0, 6.0]).unwrap().is_none());
        assert!(completion_time_test(&[5.0, 6.0], &[]).unwrap().is_none());
    }

    #[test]
    fn test_difficulty_labels() {
        let mut events = vec![completion("A", 10.0), completion("B", 12.0)];
        events.push(row("A", false));
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        let difficulty = result.difficulty_analysis;
        assert_eq!(difficulty.difficulty_ratio, Some(1.2));
        assert_eq!(difficulty.percent_harder, Some(20.0));
        assert_eq!(difficulty.interpretation.as_deref(), Some("Variant B is 20.0% harder"));
        // A converts 1 of 2, B 1 of 1
        assert_eq!(difficulty.success_rate_diff, Some(50.0));

        let events = vec![completion("A", 10.0), completion("B", 8.0)];
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        assert_eq!(
            result.difficulty_analysis.interpretation.as_deref(),
            Some("Variant A is 20.0% harder")
        );

        let events = vec![completion("A", 10.0), completion("B", 10.4)];
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        assert_eq!(
            result.difficulty_analysis.interpretation.as_deref(),
            Some("similar difficulty")
        );
    }

    #[test]
    fn test_difficulty_empty_without_time_stats() {
        let mut events = conversions("A", 2, 5);
        events.push(completion("B", 9.0));
        let result = compare(&Dataset::from_events("exp", events)).unwrap();
        assert!(result.difficulty_analysis.is_empty());
        assert_eq!(serde_json::to_value(&result.difficulty_analysis).unwrap(), json!({}));
    }
}
