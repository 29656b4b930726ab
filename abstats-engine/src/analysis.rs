//! Analysis façade: one entry point per report the API serves.
//!
//! Every call fetches a fresh snapshot from the store and computes from it;
//! nothing is cached between calls. Expected data conditions come back as
//! [`Report::Error`] values, infrastructure failures as `Err`.

use serde::{Deserialize, Serialize};

use crate::bayesian::{beta_binomial, BayesianAnalysis};
use crate::charts::{self, ComparisonCharts, FunnelChart, TimeDistribution};
use crate::comparison::{compare, DifficultyAnalysis, StatisticalTests, SIGNIFICANCE_LEVEL};
use crate::dataset::{Dataset, DateRange, Variant};
use crate::errors::{AnalysisError, AnalysisResult, ErrorDomain};
use crate::metrics::{variant_metrics, VariantMetrics};
use crate::percentile::{user_percentile, PercentileReport};
use crate::store::EventStore;

/// Tagged outcome serialized as `{status: "success", ...}` or
/// `{status: "error", message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Report<T> {
    Success(T),
    Error { message: String },
}

impl<T> Report<T> {
    /// Fold data conditions into `Report::Error`, keep store and internal
    /// failures as `Err` for the transport layer.
    pub fn from_result(result: AnalysisResult<T>) -> Result<Self, AnalysisError> {
        match result {
            Ok(value) => Ok(Self::Success(value)),
            Err(err) if matches!(err.domain, ErrorDomain::Store | ErrorDomain::Internal) => Err(err),
            Err(err) => Ok(Self::Error {
                message: err.message,
            }),
        }
    }
}

/// Conversion test outcome repeated at the top level of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentistSummary {
    pub p_value: Option<f64>,
    pub significant: bool,
}

/// Full experiment report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub experiment_id: String,
    pub variant_a: VariantMetrics,
    pub variant_b: VariantMetrics,
    pub statistical_tests: StatisticalTests,
    pub difficulty_analysis: DifficultyAnalysis,
    pub bayesian: BayesianAnalysis,
    pub frequentist: FrequentistSummary,
    /// Every row of the experiment, including unknown variants
    pub sample_size: usize,
    pub date_range: DateRange,
}

/// Runs analyses for one experiment against a shared store.
pub struct ExperimentAnalyzer<'a> {
    store: &'a dyn EventStore,
    experiment_id: String,
}

impl<'a> ExperimentAnalyzer<'a> {
    pub fn new(store: &'a dyn EventStore, experiment_id: impl Into<String>) -> Self {
        Self {
            store,
            experiment_id: experiment_id.into(),
        }
    }

    /// Fetch and normalize the current snapshot.
    pub fn load_dataset(&self) -> AnalysisResult<Dataset> {
        let raw = self
            .store
            .fetch_events(&self.experiment_id)
            .map_err(|e| AnalysisError::store_query_failed(&self.experiment_id, &format!("{e:#}")))?;
        Dataset::load(&self.experiment_id, raw)
    }

    /// Metrics, hypothesis tests, difficulty and the Bayesian estimate.
    pub fn analyze(&self) -> AnalysisResult<AnalysisSummary> {
        let dataset = self.load_dataset()?;
        dataset.ensure_not_empty()?;

        let comparison = compare(&dataset)?;
        let bayesian = beta_binomial(&comparison.variant_a, &comparison.variant_b)?;
        let frequentist = match &comparison.statistical_tests.success_rate {
            Some(test) => FrequentistSummary {
                p_value: Some(test.p_value),
                significant: test.p_value < SIGNIFICANCE_LEVEL,
            },
            None => FrequentistSummary {
                p_value: None,
                significant: false,
            },
        };
        let date_range = dataset.date_range().ok_or_else(AnalysisError::no_data)?;

        log::info!(
            "Analyzed experiment {}: {} events, P(B > A) = {}",
            dataset.experiment_id(),
            dataset.len(),
            bayesian.prob_b_better
        );

        Ok(AnalysisSummary {
            experiment_id: self.experiment_id.clone(),
            variant_a: comparison.variant_a,
            variant_b: comparison.variant_b,
            statistical_tests: comparison.statistical_tests,
            difficulty_analysis: comparison.difficulty_analysis,
            bayesian,
            frequentist,
            sample_size: dataset.len(),
            date_range,
        })
    }

    /// Rank one completion time; no samples for the variant is a data condition.
    pub fn user_percentile(&self, user_time: f64, variant: &str) -> AnalysisResult<PercentileReport> {
        let dataset = self.load_dataset()?;
        dataset.ensure_not_empty()?;
        let variant = Variant::parse_arm(variant)?;

        user_percentile(&dataset, &variant, user_time)?
            .ok_or_else(|| AnalysisError::insufficient_samples(variant.as_str()))
    }

    pub fn funnel_chart(&self) -> AnalysisResult<FunnelChart> {
        let dataset = self.load_dataset()?;
        let (a, b) = metrics_pair(&dataset)?;
        Ok(charts::funnel_chart(&a, &b))
    }

    pub fn time_distribution(&self) -> AnalysisResult<TimeDistribution> {
        let dataset = self.load_dataset()?;
        dataset.ensure_not_empty()?;
        Ok(charts::time_distribution(&dataset))
    }

    pub fn comparison_charts(&self) -> AnalysisResult<ComparisonCharts> {
        let dataset = self.load_dataset()?;
        let (a, b) = metrics_pair(&dataset)?;
        Ok(charts::comparison_charts(&a, &b))
    }
}

fn metrics_pair(dataset: &Dataset) -> AnalysisResult<(VariantMetrics, VariantMetrics)> {
    dataset.ensure_not_empty()?;
    let a = variant_metrics(dataset, &Variant::A)?;
    let b = variant_metrics(dataset, &Variant::B)?;
    if a.n_users == 0 || b.n_users == 0 {
        return Err(AnalysisError::insufficient_variant_data(a.n_users, b.n_users));
    }
    Ok((a, b))
}
