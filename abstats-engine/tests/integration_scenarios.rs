mod common;

use abstats_engine::comparison::EffectSize;
use abstats_engine::{ExperimentAnalyzer, Report};
use common::TestStore;
use serde_json::json;

#[test]
fn test_empty_experiment_reports_no_data() {
    let db = TestStore::new().unwrap();
    let report = Report::from_result(ExperimentAnalyzer::new(&db.store, "missing").analyze()).unwrap();

    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        json!({"status": "error", "message": "No data available"})
    );
}

#[test]
fn test_success_rate_contingency() {
    let db = TestStore::new().unwrap();
    db.seed_conversions("exp", "A", 6, 10).unwrap();
    db.seed_conversions("exp", "B", 9, 10).unwrap();

    let summary = ExperimentAnalyzer::new(&db.store, "exp").analyze().unwrap();
    let test = summary.statistical_tests.success_rate.unwrap();

    assert_eq!(test.contingency, [[6, 4], [9, 1]]);
    assert_eq!(test.degrees_of_freedom, 1);
    // Yates-corrected
    assert!((test.chi_square - 1.066_667).abs() < 1e-5);
    assert!((test.p_value - 0.3017).abs() < 1e-3);
    assert_eq!(summary.frequentist.p_value, Some(test.p_value));
    assert!(summary.statistical_tests.completion_time.is_none());
    assert_eq!(summary.sample_size, 20);
}

#[test]
fn test_completion_time_large_effect() {
    let db = TestStore::new().unwrap();
    db.seed_completions("exp", "A", &[10.0, 12.0, 11.0, 13.0, 10.0]).unwrap();
    db.seed_completions("exp", "B", &[15.0, 16.0, 14.0, 17.0, 15.0]).unwrap();

    let summary = ExperimentAnalyzer::new(&db.store, "exp").analyze().unwrap();
    let test = summary.statistical_tests.completion_time.unwrap();

    assert!(test.cohens_d < -1.0);
    assert_eq!(test.effect_size, EffectSize::Large);
    assert!(test.significant);
    assert_eq!(
        summary.difficulty_analysis.interpretation.as_deref(),
        Some("Variant B is 37.5% harder")
    );
}

#[test]
fn test_percentile_in_middle_of_sample() {
    let db = TestStore::new().unwrap();
    db.seed_completions("exp", "A", &[8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
    db.seed_conversions("exp", "B", 1, 3).unwrap();

    let report = ExperimentAnalyzer::new(&db.store, "exp")
        .user_percentile(10.0, "A")
        .unwrap();

    // mean-rank convention: raw 60, inverted to 40
    assert_eq!(report.variant_percentile, 40.0);
    assert_eq!(report.overall_percentile, 40.0);
    assert_eq!(report.faster_than_variant, "Faster than 40.0% of Variant A players");
}

#[test]
fn test_single_sample_omits_interval() {
    let db = TestStore::new().unwrap();
    db.seed_completions("exp", "A", &[42.0]).unwrap();
    db.seed_conversions("exp", "B", 1, 2).unwrap();

    let report = Report::from_result(ExperimentAnalyzer::new(&db.store, "exp").analyze()).unwrap();
    let body = serde_json::to_value(&report).unwrap();
    let stats = &body["variant_a"]["time_stats"];

    assert_eq!(body["status"], "success");
    assert_eq!(stats["mean"], 42.0);
    assert!(stats.get("ci_lower").is_none());
    assert!(stats.get("ci_upper").is_none());
    assert!(body["variant_b"]["time_stats"].is_null());
    assert_eq!(body["difficulty_analysis"], json!({}));
}

#[test]
fn test_loose_field_types_are_coerced() {
    let db = TestStore::new().unwrap();
    for (variant, converted, time) in [("A", json!("yes"), json!("12.5")), ("B", json!(0), json!("n/a"))] {
        db.track(json!({
            "experiment_id": "exp",
            "user_id": 17,
            "variant": variant,
            "action_type": "completed",
            "converted": converted,
            "success": "true",
            "completion_time": time,
            "metadata": {"source": "import"},
        }))
        .unwrap();
    }

    let summary = ExperimentAnalyzer::new(&db.store, "exp").analyze().unwrap();
    assert_eq!(summary.variant_a.conversions, 1);
    assert_eq!(summary.variant_b.conversions, 0);
    assert_eq!(summary.variant_a.avg_completion_time, Some(12.5));
    assert!(summary.variant_b.time_stats.is_none());
}

#[test]
fn test_malformed_timestamp_fails_request() {
    let db = TestStore::new().unwrap();
    db.seed_conversions("exp", "A", 1, 1).unwrap();
    db.insert_raw("B", "started", "last tuesday").unwrap();

    let report = Report::from_result(ExperimentAnalyzer::new(&db.store, "exp").analyze()).unwrap();
    match report {
        Report::Error { message } => assert!(message.contains("last tuesday")),
        Report::Success(_) => panic!("expected an error report"),
    }
}

#[test]
fn test_bayesian_estimate_is_reproducible() {
    let db = TestStore::new().unwrap();
    db.seed_conversions("exp", "A", 12, 40).unwrap();
    db.seed_conversions("exp", "B", 20, 40).unwrap();

    let analyzer = ExperimentAnalyzer::new(&db.store, "exp");
    let first = analyzer.analyze().unwrap().bayesian;
    let second = analyzer.analyze().unwrap().bayesian;

    assert_eq!(first.prob_b_better.to_bits(), second.prob_b_better.to_bits());
    assert!(first.prob_b_better > 0.9);
    assert_eq!(first.variant_a.alpha, 13.0);
    assert_eq!(first.variant_b.beta, 21.0);
}

#[test]
fn test_experiments_are_partitioned() {
    let db = TestStore::new().unwrap();
    db.seed_conversions("exp-1", "A", 2, 5).unwrap();
    db.seed_conversions("exp-1", "B", 3, 5).unwrap();
    db.seed_conversions("exp-2", "A", 1, 1).unwrap();

    let summary = ExperimentAnalyzer::new(&db.store, "exp-1").analyze().unwrap();
    assert_eq!(summary.sample_size, 10);

    let report = Report::from_result(ExperimentAnalyzer::new(&db.store, "exp-2").analyze()).unwrap();
    assert_eq!(
        report,
        Report::Error {
            message: "Need data from both variants".to_string()
        }
    );
}
