//! Integration tests for trend analysis over a stored audit history

use async_trait::async_trait;
use auditlens::analytics::export::trends_to_json;
use auditlens::analytics::models::{Granularity, TrendDirection};
use auditlens::config::TrendConfig;
use auditlens::models::{AuditId, AuditResult, AuditSummary, MetricType};
use auditlens::storage::{AuditRepository, InMemoryAuditRepository};
use auditlens::{AnalyticsError, TrendAnalyzer, TrendRequest};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
}

fn audit(id: AuditId, customer_id: &str, days: i64, metrics: &[(&str, f64)]) -> AuditResult {
    AuditResult {
        id,
        customer_id: customer_id.to_string(),
        created_at: start() + Duration::days(days),
        summary: AuditSummary {
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            total_issues: None,
        },
        details: None,
    }
}

/// Five daily audits with clicks rising by 10 a day and flat spend
fn seeded_repository() -> Arc<InMemoryAuditRepository> {
    let audits = (0..5).map(|day| {
        audit(
            day + 1,
            "acme",
            day,
            &[("clicks", 10.0 + 10.0 * day as f64), ("total_spend", 500.0)],
        )
    });
    let repo = InMemoryAuditRepository::with_audits(audits);
    repo.insert(audit(100, "other", 2, &[("clicks", 9_999.0)]));
    Arc::new(repo)
}

fn request(metrics: Vec<MetricType>) -> TrendRequest {
    auditlens::logging::init_tracing("auditlens=debug");
    TrendRequest::new("acme", metrics, start(), start() + Duration::days(10))
        .with_granularity(Granularity::Daily)
}

struct FailingRepository;

#[async_trait]
impl AuditRepository for FailingRepository {
    async fn get_audit(&self, _id: AuditId) -> anyhow::Result<Option<AuditResult>> {
        anyhow::bail!("timeout")
    }

    async fn list_audits(
        &self,
        _customer_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditResult>> {
        anyhow::bail!("timeout")
    }
}

#[tokio::test]
async fn test_linear_growth_is_increasing() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let trends = analyzer
        .analyze(&request(vec![MetricType::Clicks, MetricType::TotalSpend]))
        .await
        .unwrap();

    let clicks = &trends[&MetricType::Clicks];
    assert_eq!(clicks.data_points.len(), 5);
    assert!((clicks.slope - 10.0).abs() < 1e-9);
    assert!((clicks.trend_strength - 1.0).abs() < 1e-9);
    assert_eq!(clicks.trend_direction, TrendDirection::Increasing);
    assert_eq!(clicks.anomalies_detected, 0);
    assert_eq!(clicks.start_date, start());
    assert_eq!(clicks.end_date, start() + Duration::days(10));

    let spend = &trends[&MetricType::TotalSpend];
    assert_eq!(spend.trend_direction, TrendDirection::Stable);
    assert!(spend.insights.is_empty());
}

#[tokio::test]
async fn test_metric_without_values_is_omitted() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let trends = analyzer
        .analyze(&request(vec![MetricType::Roas]))
        .await
        .unwrap();

    assert!(trends.is_empty());
}

#[tokio::test]
async fn test_forecast_extends_series() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let trends = analyzer
        .analyze(&request(vec![MetricType::Clicks]).with_forecast(2))
        .await
        .unwrap();

    let forecast = trends[&MetricType::Clicks].forecast.as_ref().unwrap();
    assert_eq!(forecast.len(), 2);
    assert!((forecast[0].value - 60.0).abs() < 1e-9);
    assert!((forecast[1].value - 70.0).abs() < 1e-9);
    assert_eq!(forecast[1].timestamp, start() + Duration::days(6));

    let report = trends_to_json(&trends);
    assert_eq!(report["clicks"]["forecast"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["clicks"]["trend_direction"], "increasing");
}

#[tokio::test]
async fn test_unknown_customer_yields_empty_map() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let request = TrendRequest::new(
        "nobody",
        vec![MetricType::Clicks],
        start(),
        start() + Duration::days(10),
    );

    assert!(analyzer.analyze(&request).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_yields_empty_map() {
    let analyzer = TrendAnalyzer::new(Arc::new(FailingRepository), TrendConfig::default());
    let trends = analyzer
        .analyze(&request(vec![MetricType::Clicks]))
        .await
        .unwrap();

    assert!(trends.is_empty());
}

#[tokio::test]
async fn test_inverted_range_rejected() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let request = TrendRequest::new(
        "acme",
        vec![MetricType::Clicks],
        start() + Duration::days(10),
        start(),
    );

    let err = analyzer.analyze(&request).await.unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_analysis_is_deterministic() {
    let analyzer = TrendAnalyzer::new(seeded_repository(), TrendConfig::default());
    let request = request(vec![MetricType::Clicks]).with_forecast(3);

    let first = analyzer.analyze(&request).await.unwrap();
    let second = analyzer.analyze(&request).await.unwrap();
    assert_eq!(first, second);
}
