//! Integration tests for anomaly detection with configured detectors

use auditlens::analytics::models::{DetectionMethod, Severity, TrendDataPoint};
use auditlens::config::{AnalyticsConfig, DetectorConfig};
use auditlens::models::MetricType;
use auditlens::AnomalyDetector;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn tuesday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, 10, 0, 0).unwrap()
}

#[test]
fn test_conversion_spike_is_flagged() {
    let detector = AnomalyDetector::default();
    let history = [100.0, 102.0, 98.0, 101.0, 99.0];

    let alert = detector
        .detect(150.0, &history, MetricType::Conversions, tuesday())
        .expect("spike should be reported");

    assert!(alert.deviation_percentage > 49.0 && alert.deviation_percentage < 51.0);
    assert!(matches!(alert.severity, Severity::High | Severity::Critical));
    assert!(alert.triggered_methods.contains(&DetectionMethod::ZScore));
    assert_eq!(alert.expected_value, 100.0);
    assert!(!alert.possible_causes.is_empty());
    assert!(!alert.recommended_actions.is_empty());
}

#[test]
fn test_flat_history_never_divides_by_zero() {
    let detector = AnomalyDetector::default();
    let history = [5.0, 5.0, 5.0, 5.0, 5.0];

    let summary = detector.evaluate(10.0, &history);
    assert!(!summary.is_anomaly());
    for outcome in &summary.outcomes {
        assert!(outcome.magnitude.is_finite());
    }
    assert!(detector
        .detect(10.0, &history, MetricType::Clicks, tuesday())
        .is_none());
}

#[test]
fn test_short_history_short_circuits() {
    let detector = AnomalyDetector::default();
    assert!(detector
        .detect(1_000_000.0, &[1.0, 2.0, 3.0], MetricType::Roas, tuesday())
        .is_none());
}

#[test]
fn test_tuned_config_changes_sensitivity() {
    let history = [100.0, 102.0, 98.0, 101.0, 99.0, 100.0];

    let strict = AnomalyDetector::default();
    assert!(strict
        .detect(101.5, &history, MetricType::Impressions, tuesday())
        .is_none());

    let loose = AnomalyDetector::new(DetectorConfig {
        z_threshold: 1.0,
        ..Default::default()
    });
    let alert = loose
        .detect(101.5, &history, MetricType::Impressions, tuesday())
        .expect("lower threshold should fire");
    assert_eq!(alert.severity, Severity::Low);
}

#[test]
fn test_detector_from_app_config() {
    let config = AnalyticsConfig::default();
    let detector = AnomalyDetector::new(config.detector.clone());
    assert_eq!(detector.config().min_historical_points, 5);
}

#[test]
fn test_pattern_scan_over_series() {
    let start = tuesday();
    let values = [50.0, 52.0, 50.0, 52.0, 50.0, 52.0, 50.0, 52.0, 50.0, 52.0, 120.0];

    let points: Vec<TrendDataPoint> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            TrendDataPoint::new(start + Duration::days(i as i64), *v, MetricType::Clicks)
        })
        .collect();

    let alerts = AnomalyDetector::default().detect_pattern_anomalies(&points);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].actual_value, 120.0);
    assert_eq!(alerts[0].timestamp, start + Duration::days(10));
}

#[test]
fn test_detect_many_orders_by_severity() {
    let detector = AnomalyDetector::default();
    let stable = [100.0, 101.0, 99.0, 100.0, 100.0];
    let observations = [
        (MetricType::Impressions, 103.0, &stable[..]),
        (MetricType::Conversions, 300.0, &stable[..]),
        (MetricType::Clicks, 100.0, &stable[..]),
    ];

    let alerts = detector.detect_many(&observations, tuesday());
    assert!(!alerts.is_empty());
    assert_eq!(alerts[0].metric_type, MetricType::Conversions);
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert!(alerts.windows(2).all(|w| w[0].severity >= w[1].severity));
}
