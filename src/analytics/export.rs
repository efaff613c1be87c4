//! JSON report shapes for downstream consumers

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::analytics::models::{ComparisonResult, TrendAnalysis};
use crate::models::MetricType;

/// Sectioned report of a comparison.
///
/// Deltas live under `metrics`, grouped the way account reviews read them.
pub fn comparison_to_json(result: &ComparisonResult) -> Value {
    let m = &result.metrics;

    let significance: Map<String, Value> = m
        .is_statistically_significant
        .iter()
        .map(|(metric, significant)| {
            let p_value = m.p_values.get(metric).copied().unwrap_or(1.0);
            (
                metric.clone(),
                json!({ "significant": significant, "p_value": p_value }),
            )
        })
        .collect();

    let cost_efficiency = json!({
        "spend_change": m.spend_change,
        "spend_change_pct": m.spend_change_pct,
        "wasted_spend_change": m.wasted_spend_change,
        "wasted_spend_change_pct": m.wasted_spend_change_pct,
        "cost_per_conversion_change": m.cost_per_conversion_change,
        "cost_per_conversion_change_pct": m.cost_per_conversion_change_pct,
        "roas_change": m.roas_change,
        "roas_change_pct": m.roas_change_pct,
    });
    let performance = json!({
        "ctr_change": m.ctr_change,
        "ctr_change_pct": m.ctr_change_pct,
        "conversion_rate_change": m.conversion_rate_change,
        "conversion_rate_change_pct": m.conversion_rate_change_pct,
        "quality_score_change": m.quality_score_change,
        "quality_score_change_pct": m.quality_score_change_pct,
    });
    let volume = json!({
        "impressions_change": m.impressions_change,
        "impressions_change_pct": m.impressions_change_pct,
        "clicks_change": m.clicks_change,
        "clicks_change_pct": m.clicks_change_pct,
        "conversions_change": m.conversions_change,
        "conversions_change_pct": m.conversions_change_pct,
    });
    let optimization = json!({
        "issues_resolved": m.issues_resolved,
        "new_issues": m.new_issues,
        "keywords_added": m.keywords_added,
        "keywords_removed": m.keywords_removed,
    });

    json!({
        "baseline_audit_id": result.baseline_audit_id,
        "comparison_audit_id": result.comparison_audit_id,
        "baseline_date": result.baseline_date.to_rfc3339(),
        "comparison_date": result.comparison_date.to_rfc3339(),
        "generated_at": result.generated_at.to_rfc3339(),
        "metrics": {
            "cost_efficiency": cost_efficiency,
            "performance": performance,
            "volume": volume,
            "optimization": optimization,
            "statistical_significance": significance,
        },
        "insights": result.insights,
        "warnings": result.warnings,
        "campaign_breakdown": result.campaign_breakdown,
        "ad_group_breakdown": result.ad_group_breakdown,
        "recommendations": result.recommendations,
    })
}

/// Trend results keyed by metric name
pub fn trends_to_json(trends: &BTreeMap<MetricType, TrendAnalysis>) -> Value {
    let entries: Map<String, Value> = trends
        .iter()
        .map(|(metric, analysis)| {
            let points: Vec<Value> = analysis
                .data_points
                .iter()
                .map(|p| {
                    json!({
                        "timestamp": p.timestamp.to_rfc3339(),
                        "value": p.value,
                        "is_anomaly": p.is_anomaly,
                        "anomaly_score": p.anomaly_score,
                    })
                })
                .collect();

            let forecast: Option<Vec<Value>> = analysis.forecast.as_ref().map(|f| {
                f.iter()
                    .map(|p| json!({ "timestamp": p.timestamp.to_rfc3339(), "value": p.value }))
                    .collect()
            });

            (
                metric.as_str().to_string(),
                json!({
                    "granularity": analysis.granularity.as_str(),
                    "start_date": analysis.start_date.to_rfc3339(),
                    "end_date": analysis.end_date.to_rfc3339(),
                    "trend_direction": analysis.trend_direction.to_string(),
                    "trend_strength": analysis.trend_strength,
                    "slope": analysis.slope,
                    "seasonality_detected": analysis.seasonality_detected,
                    "anomalies_detected": analysis.anomalies_detected,
                    "data_points": points,
                    "forecast": forecast,
                    "insights": analysis.insights,
                }),
            )
        })
        .collect();

    Value::Object(entries)
}
