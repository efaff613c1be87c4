//! Result types produced by the analytics components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{AuditId, MetricType};

/// Time bucket size used to build a trend series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
        }
    }

    /// Forecast spacing. Months and quarters are approximated as 30 and 90 days.
    pub fn step(self) -> chrono::Duration {
        match self {
            Granularity::Daily => chrono::Duration::days(1),
            Granularity::Weekly => chrono::Duration::weeks(1),
            Granularity::Monthly => chrono::Duration::days(30),
            Granularity::Quarterly => chrono::Duration::days(90),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        })
    }
}

/// One observation in a trend series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub metric_type: MetricType,
    /// Set by the anomaly pass
    pub is_anomaly: bool,
    pub anomaly_score: f64,
}

impl TrendDataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64, metric_type: MetricType) -> Self {
        Self {
            timestamp,
            value,
            metric_type,
            is_anomaly: false,
            anomaly_score: 0.0,
        }
    }
}

/// Trend analysis of one metric over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric_type: MetricType,
    pub granularity: Granularity,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Chronological
    pub data_points: Vec<TrendDataPoint>,
    pub trend_direction: TrendDirection,
    pub trend_strength: f64,
    pub slope: f64,
    pub forecast: Option<Vec<TrendDataPoint>>,
    pub seasonality_detected: bool,
    pub anomalies_detected: usize,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ZScore,
    Iqr,
    TrendResidual,
}

/// Outcome of a single detection method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutcome {
    pub method: DetectionMethod,
    pub triggered: bool,
    pub magnitude: f64,
}

impl DetectorOutcome {
    pub fn quiet(method: DetectionMethod) -> Self {
        Self {
            method,
            triggered: false,
            magnitude: 0.0,
        }
    }
}

/// Combined outcome of all detection methods for one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub outcomes: Vec<DetectorOutcome>,
}

impl DetectionSummary {
    /// Any single method firing is enough
    pub fn is_anomaly(&self) -> bool {
        self.outcomes.iter().any(|o| o.triggered)
    }

    pub fn magnitude(&self, method: DetectionMethod) -> f64 {
        self.outcomes
            .iter()
            .find(|o| o.method == method)
            .map(|o| o.magnitude)
            .unwrap_or(0.0)
    }

    pub fn triggered_methods(&self) -> Vec<DetectionMethod> {
        self.outcomes
            .iter()
            .filter(|o| o.triggered)
            .map(|o| o.method)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub metric_type: MetricType,
    pub timestamp: DateTime<Utc>,
    pub expected_value: f64,
    pub actual_value: f64,
    pub deviation_percentage: f64,
    pub z_score: f64,
    pub severity: Severity,
    pub triggered_methods: Vec<DetectionMethod>,
    pub possible_causes: Vec<String>,
    pub recommended_actions: Vec<String>,
}

/// Absolute and percent deltas between two audits.
///
/// Percent deltas of inverse metrics (wasted spend, cost per conversion) are
/// positive when the metric went down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub spend_change: f64,
    pub spend_change_pct: f64,
    pub wasted_spend_change: f64,
    pub wasted_spend_change_pct: f64,
    pub cost_per_conversion_change: f64,
    pub cost_per_conversion_change_pct: f64,
    pub roas_change: f64,
    pub roas_change_pct: f64,
    pub ctr_change: f64,
    pub ctr_change_pct: f64,
    pub conversion_rate_change: f64,
    pub conversion_rate_change_pct: f64,
    pub quality_score_change: f64,
    pub quality_score_change_pct: f64,
    pub impressions_change: f64,
    pub impressions_change_pct: f64,
    pub clicks_change: f64,
    pub clicks_change_pct: f64,
    pub conversions_change: f64,
    pub conversions_change_pct: f64,
    pub issues_resolved: u64,
    pub new_issues: u64,
    pub keywords_added: u64,
    pub keywords_removed: u64,
    /// Keyed by rate metric name (`ctr`, `conversion_rate`); absent when not tested
    pub is_statistically_significant: BTreeMap<String, bool>,
    pub p_values: BTreeMap<String, f64>,
}

/// Per-entity percent changes keyed by entity name, then metric name
pub type Breakdown = BTreeMap<String, BTreeMap<String, f64>>;

/// Recommendation changes between two audits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationComparison {
    /// False while no recommendation history source is wired in
    pub available: bool,
    pub implemented: Vec<String>,
    pub pending: Vec<String>,
    pub new: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub baseline_audit_id: AuditId,
    pub comparison_audit_id: AuditId,
    pub baseline_date: DateTime<Utc>,
    pub comparison_date: DateTime<Utc>,
    pub metrics: ComparisonMetrics,
    pub insights: Vec<String>,
    pub warnings: Vec<String>,
    pub campaign_breakdown: Breakdown,
    pub ad_group_breakdown: Breakdown,
    pub recommendations: Option<RecommendationComparison>,
    pub generated_at: DateTime<Utc>,
}
