//! Plain data handed to the chart renderer.
//!
//! Nothing here knows about a charting library; each struct carries the
//! series a renderer needs for one figure.

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Variant};
use crate::metrics::{mean, round_to, VariantMetrics};

pub const FUNNEL_STAGES: [&str; 3] = ["Started", "Completed", "Repeated"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSeries {
    pub variant: String,
    /// Counts aligned with `FunnelChart::stages`
    pub values: [usize; 3],
    /// Each stage as a percentage of the first
    pub percent_of_initial: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelChart {
    pub title: String,
    pub stages: [String; 3],
    pub series: [FunnelSeries; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub variant: String,
    pub times: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDistribution {
    pub title: String,
    pub empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub series: Vec<TimeSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub variant: String,
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRateChart {
    pub title: String,
    pub bars: [Bar; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBar {
    pub variant: String,
    pub mean: f64,
    pub label: String,
    /// Distance from the mean down to the lower CI bound
    pub error_minus: f64,
    /// Distance from the mean up to the upper CI bound
    pub error_plus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgTimeChart {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub bars: Vec<TimeBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonCharts {
    pub success_rate_chart: SuccessRateChart,
    pub avg_time_chart: AvgTimeChart,
}

pub fn funnel_chart(a: &VariantMetrics, b: &VariantMetrics) -> FunnelChart {
    FunnelChart {
        title: "User Funnel: Variant A vs B".to_string(),
        stages: FUNNEL_STAGES.map(String::from),
        series: [funnel_series(a), funnel_series(b)],
    }
}

#[allow(clippy::cast_precision_loss)]
fn funnel_series(metrics: &VariantMetrics) -> FunnelSeries {
    let values = [metrics.n_started, metrics.n_completed, metrics.n_repeated];
    let initial = values[0];
    let percent_of_initial = values.map(|v| {
        if initial == 0 {
            0.0
        } else {
            round_to(v as f64 / initial as f64 * 100.0, 1)
        }
    });
    FunnelSeries {
        variant: metrics.variant.clone(),
        values,
        percent_of_initial,
    }
}

pub fn time_distribution(dataset: &Dataset) -> TimeDistribution {
    let series: Vec<TimeSeries> = [Variant::A, Variant::B]
        .iter()
        .map(|variant| {
            let times = dataset.completion_times(variant);
            let mean = (!times.is_empty()).then(|| mean(&times));
            TimeSeries {
                variant: variant.to_string(),
                times,
                mean,
            }
        })
        .collect();

    let empty = series.iter().all(|s| s.times.is_empty());
    TimeDistribution {
        title: "Completion Time Distribution".to_string(),
        empty,
        message: empty.then(|| "No completion data available yet".to_string()),
        series,
    }
}

pub fn success_rate_comparison(a: &VariantMetrics, b: &VariantMetrics) -> SuccessRateChart {
    let bar = |m: &VariantMetrics| {
        let value = m.conversion_rate * 100.0;
        Bar {
            variant: format!("Variant {}", m.variant),
            value,
            label: format!("{value:.1}%"),
        }
    };
    SuccessRateChart {
        title: "Success Rate Comparison".to_string(),
        bars: [bar(a), bar(b)],
    }
}

pub fn avg_time_comparison(a: &VariantMetrics, b: &VariantMetrics) -> AvgTimeChart {
    let title = "Average Completion Time (with 95% CI)".to_string();
    let (Some(stats_a), Some(stats_b)) = (&a.time_stats, &b.time_stats) else {
        return AvgTimeChart {
            title,
            message: Some("Not enough data for comparison".to_string()),
            bars: Vec::new(),
        };
    };

    let bars = [(a, stats_a), (b, stats_b)]
        .into_iter()
        .map(|(m, s)| TimeBar {
            variant: format!("Variant {}", m.variant),
            mean: s.mean,
            label: format!("{:.2}s", s.mean),
            error_minus: s.ci_lower.map_or(0.0, |lo| s.mean - lo),
            error_plus: s.ci_upper.map_or(0.0, |hi| hi - s.mean),
        })
        .collect();

    AvgTimeChart {
        title,
        message: None,
        bars,
    }
}

pub fn comparison_charts(a: &VariantMetrics, b: &VariantMetrics) -> ComparisonCharts {
    ComparisonCharts {
        success_rate_chart: success_rate_comparison(a, b),
        avg_time_chart: avg_time_comparison(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Event;
    use crate::metrics::variant_metrics;
    use crate::store::RawEvent;
    use serde_json::json;

    fn event(variant: &str, action: &str, time: Option<f64>) -> Event {
        Event::from_raw(RawEvent {
            variant: Some(variant.to_string()),
            action_type: Some(action.to_string()),
            converted: json!(action == "completed"),
            success: json!(action == "completed"),
            completion_time: time.map_or(serde_json::Value::Null, |t| json!(t)),
            ..RawEvent::new("exp", "2024-05-01T10:00:00Z")
        })
        .unwrap()
    }

    fn sample() -> Dataset {
        Dataset::from_events(
            "exp",
            vec![
                event("A", "started", None),
                event("A", "started", None),
                event("A", "completed", Some(10.0)),
                event("A", "completed", Some(14.0)),
                event("B", "started", None),
                event("B", "completed", Some(20.0)),
            ],
        )
    }

    #[test]
    fn test_funnel_chart_percentages() {
        let data = sample();
        let a = variant_metrics(&data, &Variant::A).unwrap();
        let b = variant_metrics(&data, &Variant::B).unwrap();
        let chart = funnel_chart(&a, &b);

        assert_eq!(chart.stages[1], "Completed");
        assert_eq!(chart.series[0].values, [2, 2, 0]);
        assert_eq!(chart.series[0].percent_of_initial, [100.0, 100.0, 0.0]);
        assert_eq!(chart.series[1].values, [1, 1, 0]);
    }

    #[test]
    fn test_time_distribution_series() {
        let chart = time_distribution(&sample());
        assert!(!chart.empty);
        assert_eq!(chart.series[0].times, vec![10.0, 14.0]);
        assert_eq!(chart.series[0].mean, Some(12.0));
        assert_eq!(chart.series[1].times, vec![20.0]);

        let empty = time_distribution(&Dataset::from_events("exp", vec![event("A", "started", None)]));
        assert!(empty.empty);
        assert_eq!(empty.message.as_deref(), Some("No completion data available yet"));
    }

    #[test]
    fn test_avg_time_error_bars() {
        let data = sample();
        let a = variant_metrics(&data, &Variant::A).unwrap();
        let b = variant_metrics(&data, &Variant::B).unwrap();
        let chart = avg_time_comparison(&a, &b);

        assert!(chart.message.is_none());
        assert_eq!(chart.bars.len(), 2);
        assert!(chart.bars[0].error_minus > 0.0);
        assert!((chart.bars[0].error_minus - chart.bars[0].error_plus).abs() < 1e-9);
        // single sample: no interval, zero-length bars
        assert_eq!(chart.bars[1].error_minus, 0.0);
        assert_eq!(chart.bars[1].label, "20.00s");
    }

    #[test]
    fn test_avg_time_without_stats() {
        let data = Dataset::from_events(
            "exp",
            vec![event("A", "completed", Some(5.0)), event("B", "started", None)],
        );
        let a = variant_metrics(&data, &Variant::A).unwrap();
        let b = variant_metrics(&data, &Variant::B).unwrap();
        let chart = avg_time_comparison(&a, &b);
        assert!(chart.bars.is_empty());
        assert_eq!(chart.message.as_deref(), Some("Not enough data for comparison"));
    }

    #[test]
    fn test_success_rate_labels() {
        let data = sample();
        let a = variant_metrics(&data, &Variant::A).unwrap();
        let b = variant_metrics(&data, &Variant::B).unwrap();
        let chart = success_rate_comparison(&a, &b);
        assert_eq!(chart.bars[0].label, "50.0%");
        assert_eq!(chart.bars[1].variant, "Variant B");
    }
}
