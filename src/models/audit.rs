use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type AuditId = i64;

/// A point-in-time audit snapshot as handed over by the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub id: AuditId,
    pub customer_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: AuditSummary,
    #[serde(default)]
    pub details: Option<AuditDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Named numeric values, keyed by the field names in [`MetricType::field_name`]
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_issues: Option<u64>,
}

/// Nested breakdowns attached to an audit, when the collector produced them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(default)]
    pub campaigns: Option<Vec<BreakdownEntry>>,
    #[serde(default)]
    pub ad_groups: Option<Vec<BreakdownEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub name: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl AuditResult {
    /// Typed metric lookup. Absent fields yield `None`, never zero.
    pub fn metric(&self, metric: MetricType) -> Option<f64> {
        get_metric(self, metric)
    }

    /// Metric value with the comparison policy applied: absent counts as zero.
    pub fn metric_or_zero(&self, metric: MetricType) -> f64 {
        self.metric(metric).unwrap_or(0.0)
    }

    pub fn campaigns(&self) -> Option<&[BreakdownEntry]> {
        self.details.as_ref()?.campaigns.as_deref()
    }

    pub fn ad_groups(&self) -> Option<&[BreakdownEntry]> {
        self.details.as_ref()?.ad_groups.as_deref()
    }
}

/// Identifier for one numeric series tracked across audits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    TotalSpend,
    WastedSpend,
    CostPerConversion,
    Roas,
    Ctr,
    ConversionRate,
    QualityScore,
    Impressions,
    Clicks,
    Conversions,
    KeywordsAnalyzed,
    IssuesCount,
}

/// Where a metric lives inside an audit summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Metrics(&'static str),
    TotalIssues,
}

/// Severity tier used when grading anomalies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricTier {
    Critical,
    HighSensitivity,
    Other,
}

impl MetricType {
    pub const ALL: [MetricType; 12] = [
        MetricType::TotalSpend,
        MetricType::WastedSpend,
        MetricType::CostPerConversion,
        MetricType::Roas,
        MetricType::Ctr,
        MetricType::ConversionRate,
        MetricType::QualityScore,
        MetricType::Impressions,
        MetricType::Clicks,
        MetricType::Conversions,
        MetricType::KeywordsAnalyzed,
        MetricType::IssuesCount,
    ];

    pub fn field(self) -> MetricField {
        match self {
            MetricType::TotalSpend => MetricField::Metrics("total_spend"),
            MetricType::WastedSpend => MetricField::Metrics("wasted_spend"),
            MetricType::CostPerConversion => MetricField::Metrics("cost_per_conversion"),
            MetricType::Roas => MetricField::Metrics("roas"),
            MetricType::Ctr => MetricField::Metrics("ctr"),
            MetricType::ConversionRate => MetricField::Metrics("conversion_rate"),
            MetricType::QualityScore => MetricField::Metrics("avg_quality_score"),
            MetricType::Impressions => MetricField::Metrics("impressions"),
            MetricType::Clicks => MetricField::Metrics("clicks"),
            MetricType::Conversions => MetricField::Metrics("conversions"),
            MetricType::KeywordsAnalyzed => MetricField::Metrics("keywords_analyzed"),
            MetricType::IssuesCount => MetricField::TotalIssues,
        }
    }

    /// Field name in `summary.metrics`, or `total_issues` for the issue count
    pub fn field_name(self) -> &'static str {
        match self.field() {
            MetricField::Metrics(name) => name,
            MetricField::TotalIssues => "total_issues",
        }
    }

    /// Reverse lookup of [`MetricType::field_name`]
    pub fn from_field_name(name: &str) -> Option<MetricType> {
        MetricType::ALL
            .into_iter()
            .find(|metric| metric.field_name() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::TotalSpend => "total_spend",
            MetricType::WastedSpend => "wasted_spend",
            MetricType::CostPerConversion => "cost_per_conversion",
            MetricType::Roas => "roas",
            MetricType::Ctr => "ctr",
            MetricType::ConversionRate => "conversion_rate",
            MetricType::QualityScore => "quality_score",
            MetricType::Impressions => "impressions",
            MetricType::Clicks => "clicks",
            MetricType::Conversions => "conversions",
            MetricType::KeywordsAnalyzed => "keywords_analyzed",
            MetricType::IssuesCount => "issues_count",
        }
    }

    /// Human-readable label used in insights and alerts
    pub fn label(self) -> &'static str {
        match self {
            MetricType::TotalSpend => "Total spend",
            MetricType::WastedSpend => "Wasted spend",
            MetricType::CostPerConversion => "Cost per conversion",
            MetricType::Roas => "ROAS",
            MetricType::Ctr => "CTR",
            MetricType::ConversionRate => "Conversion rate",
            MetricType::QualityScore => "Quality score",
            MetricType::Impressions => "Impressions",
            MetricType::Clicks => "Clicks",
            MetricType::Conversions => "Conversions",
            MetricType::KeywordsAnalyzed => "Keywords analyzed",
            MetricType::IssuesCount => "Issues",
        }
    }

    pub fn tier(self) -> MetricTier {
        match self {
            MetricType::Conversions | MetricType::ConversionRate | MetricType::Roas => {
                MetricTier::Critical
            }
            MetricType::Ctr | MetricType::CostPerConversion | MetricType::WastedSpend => {
                MetricTier::HighSensitivity
            }
            _ => MetricTier::Other,
        }
    }

    /// Metrics where a decrease is an improvement
    pub fn is_inverse(self) -> bool {
        matches!(
            self,
            MetricType::WastedSpend | MetricType::CostPerConversion | MetricType::IssuesCount
        )
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read one metric out of an audit snapshot.
///
/// Returns `None` when the field is missing or not a finite number, so callers
/// decide explicitly whether absence means "skip" or "zero".
pub fn get_metric(audit: &AuditResult, metric: MetricType) -> Option<f64> {
    let value = match metric.field() {
        MetricField::Metrics(name) => audit.summary.metrics.get(name).copied(),
        MetricField::TotalIssues => audit.summary.total_issues.map(|n| n as f64),
    };
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn audit_with(metrics: &[(&str, f64)], total_issues: Option<u64>) -> AuditResult {
        AuditResult {
            id: 1,
            customer_id: "cust-1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            summary: AuditSummary {
                metrics: metrics
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect(),
                total_issues,
            },
            details: None,
        }
    }

    #[test]
    fn test_get_metric_reads_field_table() {
        let audit = audit_with(&[("total_spend", 1200.0), ("avg_quality_score", 6.5)], Some(4));

        assert_eq!(get_metric(&audit, MetricType::TotalSpend), Some(1200.0));
        assert_eq!(get_metric(&audit, MetricType::QualityScore), Some(6.5));
        assert_eq!(get_metric(&audit, MetricType::IssuesCount), Some(4.0));
    }

    #[test]
    fn test_missing_metric_is_none_not_zero() {
        let audit = audit_with(&[], None);

        assert_eq!(get_metric(&audit, MetricType::Roas), None);
        assert_eq!(get_metric(&audit, MetricType::IssuesCount), None);
        assert_eq!(audit.metric_or_zero(MetricType::Roas), 0.0);
    }

    #[test]
    fn test_non_finite_metric_is_ignored() {
        let audit = audit_with(&[("ctr", f64::NAN)], None);
        assert_eq!(get_metric(&audit, MetricType::Ctr), None);
    }

    #[test]
    fn test_summary_deserializes_from_loose_json() {
        let audit: AuditResult = serde_json::from_value(serde_json::json!({
            "id": 7,
            "customer_id": "cust-9",
            "created_at": "2024-05-01T08:30:00Z",
            "summary": { "metrics": { "clicks": 40.0 }, "total_issues": 3 }
        }))
        .unwrap();

        assert_eq!(audit.metric(MetricType::Clicks), Some(40.0));
        assert_eq!(audit.metric(MetricType::IssuesCount), Some(3.0));
        assert!(audit.campaigns().is_none());
    }

    #[test]
    fn test_metric_tiers() {
        assert_eq!(MetricType::Roas.tier(), MetricTier::Critical);
        assert_eq!(MetricType::WastedSpend.tier(), MetricTier::HighSensitivity);
        assert_eq!(MetricType::Impressions.tier(), MetricTier::Other);
        assert!(MetricType::CostPerConversion.is_inverse());
        assert!(!MetricType::Ctr.is_inverse());
    }

    #[test]
    fn test_field_name_round_trip() {
        for metric in MetricType::ALL {
            assert_eq!(MetricType::from_field_name(metric.field_name()), Some(metric));
        }
        assert_eq!(MetricType::from_field_name("unknown"), None);
    }
}
