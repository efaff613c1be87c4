//! Period-over-period comparison of two audit snapshots

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::models::{
    Breakdown, ComparisonMetrics, ComparisonResult, RecommendationComparison,
};
use crate::analytics::stats;
use crate::analytics::tracking::{self, AccountState, ImplementationRecord, Recommendation};
use crate::config::{ComparisonOptions, InsightThresholds};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{AuditId, AuditResult, BreakdownEntry, MetricType};
use crate::storage::AuditRepository;

pub struct AuditComparator {
    repository: Arc<dyn AuditRepository>,
    thresholds: InsightThresholds,
}

impl AuditComparator {
    pub fn new(repository: Arc<dyn AuditRepository>, thresholds: InsightThresholds) -> Self {
        Self {
            repository,
            thresholds,
        }
    }

    /// Fetch both audits and compare them.
    ///
    /// Fails with [`AnalyticsError::NotFound`] if either id does not resolve
    /// or cannot be fetched.
    pub async fn compare(
        &self,
        baseline_id: AuditId,
        comparison_id: AuditId,
        options: &ComparisonOptions,
    ) -> AnalyticsResult<ComparisonResult> {
        options.validate()?;

        let baseline = self.fetch(baseline_id).await?;
        let comparison = self.fetch(comparison_id).await?;

        self.compare_audits(&baseline, &comparison, options)
    }

    async fn fetch(&self, id: AuditId) -> AnalyticsResult<AuditResult> {
        match self.repository.get_audit(id).await {
            Ok(Some(audit)) => Ok(audit),
            Ok(None) => Err(AnalyticsError::NotFound { id }),
            Err(e) => {
                warn!(audit_id = id, "Failed to fetch audit for comparison: {}", e);
                Err(AnalyticsError::NotFound { id })
            }
        }
    }

    /// Compare two already-fetched audits
    pub fn compare_audits(
        &self,
        baseline: &AuditResult,
        comparison: &AuditResult,
        options: &ComparisonOptions,
    ) -> AnalyticsResult<ComparisonResult> {
        options.validate()?;

        let metrics = calculate_metrics(baseline, comparison, options);
        let (insights, warnings) = self.generate_insights(&metrics, options);

        let campaign_breakdown = if options.include_campaign_breakdown {
            compare_breakdowns(baseline.campaigns(), comparison.campaigns(), "campaign")
        } else {
            Breakdown::new()
        };

        let ad_group_breakdown = if options.include_ad_group_breakdown {
            compare_breakdowns(baseline.ad_groups(), comparison.ad_groups(), "ad group")
        } else {
            Breakdown::new()
        };

        let recommendations = options.include_recommendations.then(|| {
            info!(
                baseline_audit_id = baseline.id,
                comparison_audit_id = comparison.id,
                "Recommendation history is not available, returning empty recommendation comparison"
            );
            RecommendationComparison::default()
        });

        debug!(
            baseline_audit_id = baseline.id,
            comparison_audit_id = comparison.id,
            insights = insights.len(),
            warnings = warnings.len(),
            "Compared audits"
        );

        Ok(ComparisonResult {
            baseline_audit_id: baseline.id,
            comparison_audit_id: comparison.id,
            baseline_date: baseline.created_at,
            comparison_date: comparison.created_at,
            metrics,
            insights,
            warnings,
            campaign_breakdown,
            ad_group_breakdown,
            recommendations,
            generated_at: Utc::now(),
        })
    }

    /// See [`tracking::track_implementation`]
    pub fn track_implementation(
        &self,
        recommendations: &[Recommendation],
        account_state: &AccountState,
    ) -> Vec<ImplementationRecord> {
        tracking::track_implementation(recommendations, account_state)
    }

    fn generate_insights(
        &self,
        metrics: &ComparisonMetrics,
        options: &ComparisonOptions,
    ) -> (Vec<String>, Vec<String>) {
        let t = &self.thresholds;
        let mut insights = Vec::new();
        let mut warnings = Vec::new();

        // Inverse metric: positive percent means wasted spend went down
        if metrics.wasted_spend_change_pct > t.wasted_spend_pct {
            insights.push(format!(
                "Wasted spend reduced by {:.1}% (${:.2} saved)",
                metrics.wasted_spend_change_pct,
                -metrics.wasted_spend_change
            ));
        } else if metrics.wasted_spend_change_pct < -t.wasted_spend_pct {
            warnings.push(format!(
                "Wasted spend increased by {:.1}% (${:.2} more)",
                metrics.wasted_spend_change_pct.abs(),
                metrics.wasted_spend_change
            ));
        }

        if metrics.roas_change_pct > t.roas_pct {
            insights.push(format!("ROAS improved by {:.1}%", metrics.roas_change_pct));
        } else if metrics.roas_change_pct < -t.roas_pct {
            warnings.push(format!(
                "ROAS declined by {:.1}%",
                metrics.roas_change_pct.abs()
            ));
        }

        if metrics.ctr_change_pct > t.ctr_pct {
            insights.push(format!("CTR improved by {:.1}%", metrics.ctr_change_pct));
        } else if metrics.ctr_change_pct < -t.ctr_pct {
            warnings.push(format!("CTR dropped by {:.1}%", metrics.ctr_change_pct.abs()));
        }

        if metrics.conversion_rate_change_pct > t.conversion_rate_pct {
            insights.push(format!(
                "Conversion rate improved by {:.1}%",
                metrics.conversion_rate_change_pct
            ));
        } else if metrics.conversion_rate_change_pct < -t.conversion_rate_pct {
            warnings.push(format!(
                "Conversion rate dropped by {:.1}%",
                metrics.conversion_rate_change_pct.abs()
            ));
        }

        if metrics.cost_per_conversion_change_pct > t.cost_per_conversion_pct {
            insights.push(format!(
                "Cost per conversion decreased by {:.1}%",
                metrics.cost_per_conversion_change_pct
            ));
        } else if metrics.cost_per_conversion_change_pct < -t.cost_per_conversion_pct {
            warnings.push(format!(
                "Cost per conversion increased by {:.1}%",
                metrics.cost_per_conversion_change_pct.abs()
            ));
        }

        if metrics.quality_score_change > t.quality_score_points {
            insights.push(format!(
                "Average quality score improved by {:.1} points",
                metrics.quality_score_change
            ));
        } else if metrics.quality_score_change < -t.quality_score_points {
            warnings.push(format!(
                "Average quality score dropped by {:.1} points",
                metrics.quality_score_change.abs()
            ));
        }

        if metrics.issues_resolved > 0 {
            insights.push(format!(
                "{} issue(s) resolved since the baseline audit",
                metrics.issues_resolved
            ));
        }
        if metrics.new_issues > 0 {
            warnings.push(format!("{} new issue(s) found", metrics.new_issues));
        }

        if metrics.spend_change_pct > t.spend_growth_pct
            && metrics.conversions_change_pct < metrics.spend_change_pct / 2.0
        {
            warnings.push(format!(
                "Spend grew {:.1}% while conversions changed {:+.1}%",
                metrics.spend_change_pct, metrics.conversions_change_pct
            ));
        }

        for metric in SIGNIFICANCE_METRICS {
            let Some(&significant) = metrics.is_statistically_significant.get(metric.as_str())
            else {
                continue;
            };
            let p_value = metrics
                .p_values
                .get(metric.as_str())
                .copied()
                .unwrap_or(1.0);

            if significant {
                insights.push(format!(
                    "{} change is statistically significant (p = {:.4})",
                    metric.label(),
                    p_value
                ));
            } else {
                insights.push(format!(
                    "{} change is not statistically significant at {:.0}% confidence",
                    metric.label(),
                    options.confidence_level * 100.0
                ));
            }
        }

        (insights, warnings)
    }
}

/// Rate metrics tested for significance, in reporting order
const SIGNIFICANCE_METRICS: [MetricType; 2] = [MetricType::Ctr, MetricType::ConversionRate];

fn delta(baseline: &AuditResult, comparison: &AuditResult, metric: MetricType) -> (f64, f64) {
    let before = baseline.metric_or_zero(metric);
    let after = comparison.metric_or_zero(metric);
    (
        after - before,
        stats::percentage_change(before, after, metric.is_inverse()),
    )
}

fn count(audit: &AuditResult, metric: MetricType) -> u64 {
    // `as` saturates negatives to zero
    audit.metric_or_zero(metric).round() as u64
}

/// Compute every metric delta plus the significance tests requested in `options`
pub fn calculate_metrics(
    baseline: &AuditResult,
    comparison: &AuditResult,
    options: &ComparisonOptions,
) -> ComparisonMetrics {
    let (spend_change, spend_change_pct) = delta(baseline, comparison, MetricType::TotalSpend);
    let (wasted_spend_change, wasted_spend_change_pct) =
        delta(baseline, comparison, MetricType::WastedSpend);
    let (cost_per_conversion_change, cost_per_conversion_change_pct) =
        delta(baseline, comparison, MetricType::CostPerConversion);
    let (roas_change, roas_change_pct) = delta(baseline, comparison, MetricType::Roas);
    let (ctr_change, ctr_change_pct) = delta(baseline, comparison, MetricType::Ctr);
    let (conversion_rate_change, conversion_rate_change_pct) =
        delta(baseline, comparison, MetricType::ConversionRate);
    let (quality_score_change, quality_score_change_pct) =
        delta(baseline, comparison, MetricType::QualityScore);
    let (impressions_change, impressions_change_pct) =
        delta(baseline, comparison, MetricType::Impressions);
    let (clicks_change, clicks_change_pct) = delta(baseline, comparison, MetricType::Clicks);
    let (conversions_change, conversions_change_pct) =
        delta(baseline, comparison, MetricType::Conversions);

    let baseline_issues = count(baseline, MetricType::IssuesCount);
    let comparison_issues = count(comparison, MetricType::IssuesCount);
    let baseline_keywords = count(baseline, MetricType::KeywordsAnalyzed);
    let comparison_keywords = count(comparison, MetricType::KeywordsAnalyzed);

    let mut metrics = ComparisonMetrics {
        spend_change,
        spend_change_pct,
        wasted_spend_change,
        wasted_spend_change_pct,
        cost_per_conversion_change,
        cost_per_conversion_change_pct,
        roas_change,
        roas_change_pct,
        ctr_change,
        ctr_change_pct,
        conversion_rate_change,
        conversion_rate_change_pct,
        quality_score_change,
        quality_score_change_pct,
        impressions_change,
        impressions_change_pct,
        clicks_change,
        clicks_change_pct,
        conversions_change,
        conversions_change_pct,
        issues_resolved: baseline_issues.saturating_sub(comparison_issues),
        new_issues: comparison_issues.saturating_sub(baseline_issues),
        keywords_added: comparison_keywords.saturating_sub(baseline_keywords),
        keywords_removed: baseline_keywords.saturating_sub(comparison_keywords),
        ..Default::default()
    };

    if options.include_statistical_tests {
        run_significance_tests(baseline, comparison, options, &mut metrics);
    }

    metrics
}

fn run_significance_tests(
    baseline: &AuditResult,
    comparison: &AuditResult,
    options: &ComparisonOptions,
    metrics: &mut ComparisonMetrics,
) {
    for metric in SIGNIFICANCE_METRICS {
        // (successes, trials) for each rate
        let (success, trials) = match metric {
            MetricType::Ctr => (MetricType::Clicks, MetricType::Impressions),
            _ => (MetricType::Conversions, MetricType::Clicks),
        };

        let baseline_trials = baseline.metric_or_zero(trials);
        let comparison_trials = comparison.metric_or_zero(trials);
        let minimum = options.minimum_sample_size as f64;

        if baseline_trials < minimum || comparison_trials < minimum {
            debug!(
                metric = %metric,
                baseline_trials,
                comparison_trials,
                minimum_sample_size = options.minimum_sample_size,
                "Sample too small, skipping significance test"
            );
            continue;
        }

        let p_value = stats::chi_square_2x2(
            baseline.metric_or_zero(success),
            baseline_trials,
            comparison.metric_or_zero(success),
            comparison_trials,
        )
        .map(|test| test.p_value)
        .unwrap_or(1.0);

        metrics
            .is_statistically_significant
            .insert(metric.as_str().to_string(), p_value < options.alpha());
        metrics.p_values.insert(metric.as_str().to_string(), p_value);
    }
}

/// Per-entity percent changes for entities present in both audits.
///
/// Returns an empty map, with a notice, when either side lacks the breakdown.
fn compare_breakdowns(
    baseline: Option<&[BreakdownEntry]>,
    comparison: Option<&[BreakdownEntry]>,
    kind: &str,
) -> Breakdown {
    let (Some(baseline), Some(comparison)) = (baseline, comparison) else {
        info!("No {kind} breakdown data on both audits, returning empty {kind} breakdown");
        return Breakdown::new();
    };

    let mut breakdown = Breakdown::new();
    for after in comparison {
        let Some(before) = baseline.iter().find(|entry| entry.name == after.name) else {
            continue;
        };

        let changes = after
            .metrics
            .iter()
            .filter_map(|(name, after_value)| {
                let before_value = before.metrics.get(name)?;
                let inverse = MetricType::from_field_name(name)
                    .map(MetricType::is_inverse)
                    .unwrap_or(false);
                Some((
                    name.clone(),
                    stats::percentage_change(*before_value, *after_value, inverse),
                ))
            })
            .collect();

        breakdown.insert(after.name.clone(), changes);
    }
    breakdown
}
