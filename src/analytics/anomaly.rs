//! Point anomaly detection against a historical window
//!
//! Three independent methods (z-score, IQR fences, trend residual) each
//! produce a [`DetectorOutcome`]. A value is anomalous when any of them fires;
//! severity is then graded from the deviation and the z-score magnitude using
//! the ladder of the metric's tier.

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use crate::analytics::models::{
    AnomalyAlert, DetectionMethod, DetectionSummary, DetectorOutcome, Severity, TrendDataPoint,
};
use crate::analytics::stats;
use crate::config::DetectorConfig;
use crate::models::MetricType;

/// Largest sliding window used by [`AnomalyDetector::detect_pattern_anomalies`]
const MAX_PATTERN_WINDOW: usize = 7;

pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run every detection method without building an alert
    pub fn evaluate(&self, current_value: f64, historical_values: &[f64]) -> DetectionSummary {
        DetectionSummary {
            outcomes: vec![
                z_score_outcome(
                    current_value,
                    stats::mean(historical_values),
                    stats::stddev(historical_values),
                    self.config.z_threshold,
                ),
                self.iqr_outcome(current_value, historical_values),
                self.trend_residual_outcome(current_value, historical_values),
            ],
        }
    }

    /// Check `current_value` against its history.
    ///
    /// Returns `None` when history is too short, the value is not finite, or
    /// nothing looks unusual.
    pub fn detect(
        &self,
        current_value: f64,
        historical_values: &[f64],
        metric_type: MetricType,
        timestamp: DateTime<Utc>,
    ) -> Option<AnomalyAlert> {
        if !current_value.is_finite() {
            return None;
        }
        if historical_values.len() < self.config.min_historical_points {
            return None;
        }

        let summary = self.evaluate(current_value, historical_values);
        if !summary.is_anomaly() {
            return None;
        }

        let expected_value = stats::mean(historical_values);
        let deviation_percentage = deviation_percentage(current_value, expected_value);
        let z_score = summary.magnitude(DetectionMethod::ZScore);
        let severity = self.classify_severity(metric_type, deviation_percentage, z_score);

        debug!(
            metric = %metric_type,
            current_value,
            expected_value,
            deviation_percentage,
            z_score,
            %severity,
            "Anomaly detected"
        );

        Some(AnomalyAlert {
            metric_type,
            timestamp,
            expected_value,
            actual_value: current_value,
            deviation_percentage,
            z_score,
            severity,
            triggered_methods: summary.triggered_methods(),
            possible_causes: possible_causes(metric_type, deviation_percentage, timestamp),
            recommended_actions: recommended_actions(metric_type, severity),
        })
    }

    /// Grade an anomaly; the most severe rung crossed by either measure wins.
    pub fn classify_severity(
        &self,
        metric_type: MetricType,
        deviation_percentage: f64,
        z_score: f64,
    ) -> Severity {
        let ladder = self.config.ladder(metric_type.tier());
        let abs_deviation = deviation_percentage.abs();
        let abs_z = z_score.abs();

        if ladder.critical.crossed_by(abs_deviation, abs_z) {
            Severity::Critical
        } else if ladder.high.crossed_by(abs_deviation, abs_z) {
            Severity::High
        } else if ladder.medium.crossed_by(abs_deviation, abs_z) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Sliding-window scan: each point is checked against the points before it.
    pub fn detect_pattern_anomalies(&self, data_points: &[TrendDataPoint]) -> Vec<AnomalyAlert> {
        if data_points.len() < self.config.min_historical_points {
            return Vec::new();
        }

        let window = MAX_PATTERN_WINDOW.min(data_points.len() / 2);
        if window == 0 {
            return Vec::new();
        }

        let values: Vec<f64> = data_points.iter().map(|p| p.value).collect();

        (window..data_points.len())
            .filter_map(|i| {
                let point = &data_points[i];
                self.detect(
                    point.value,
                    &values[i - window..i],
                    point.metric_type,
                    point.timestamp,
                )
            })
            .collect()
    }

    /// Check several metrics observed at the same instant, most severe first
    pub fn detect_many(
        &self,
        observations: &[(MetricType, f64, &[f64])],
        timestamp: DateTime<Utc>,
    ) -> Vec<AnomalyAlert> {
        let mut alerts: Vec<AnomalyAlert> = observations
            .iter()
            .filter_map(|(metric, current, history)| {
                self.detect(*current, history, *metric, timestamp)
            })
            .collect();

        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        alerts
    }

    fn iqr_outcome(&self, current_value: f64, historical_values: &[f64]) -> DetectorOutcome {
        let q1 = stats::percentile(historical_values, 25.0);
        let q3 = stats::percentile(historical_values, 75.0);
        let iqr = q3 - q1;

        if iqr <= 0.0 {
            return DetectorOutcome::quiet(DetectionMethod::Iqr);
        }

        let lower = q1 - self.config.iqr_multiplier * iqr;
        let upper = q3 + self.config.iqr_multiplier * iqr;

        let outside = if current_value < lower {
            lower - current_value
        } else if current_value > upper {
            current_value - upper
        } else {
            0.0
        };

        DetectorOutcome {
            method: DetectionMethod::Iqr,
            triggered: outside > 0.0,
            magnitude: outside / iqr,
        }
    }

    fn trend_residual_outcome(
        &self,
        current_value: f64,
        historical_values: &[f64],
    ) -> DetectorOutcome {
        if historical_values.len() < 3 {
            return DetectorOutcome::quiet(DetectionMethod::TrendResidual);
        }

        let (slope, intercept) = stats::fit_series(historical_values);
        let predicted = slope * historical_values.len() as f64 + intercept;
        let residuals = stats::detrend(historical_values, slope, intercept);

        let mut residual_std = stats::stddev(&residuals);
        if residual_std < self.config.residual_std_epsilon {
            let (min, max) = historical_values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                });
            residual_std = self.config.residual_floor_fraction * (max - min);
        }

        // Constant history: the floor is zero too, so there is no scale to measure against
        if residual_std <= 0.0 {
            return DetectorOutcome::quiet(DetectionMethod::TrendResidual);
        }

        let magnitude = (current_value - predicted).abs() / residual_std;
        DetectorOutcome {
            method: DetectionMethod::TrendResidual,
            triggered: magnitude > self.config.residual_threshold,
            magnitude,
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

/// Z-score test of `value` against a mean and population std.
///
/// Zero std never fires and reports zero magnitude.
pub fn z_score_outcome(value: f64, mean: f64, std: f64, threshold: f64) -> DetectorOutcome {
    if std <= 0.0 {
        return DetectorOutcome::quiet(DetectionMethod::ZScore);
    }

    let magnitude = (value - mean).abs() / std;
    DetectorOutcome {
        method: DetectionMethod::ZScore,
        triggered: magnitude > threshold,
        magnitude,
    }
}

/// Percent deviation from the expected value; 100 (or 0) when nothing was expected
pub fn deviation_percentage(current_value: f64, expected_value: f64) -> f64 {
    if expected_value == 0.0 {
        if current_value != 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current_value - expected_value) / expected_value * 100.0
    }
}

/// Rule-based list of plausible explanations, in a fixed order
pub fn possible_causes(
    metric_type: MetricType,
    deviation_percentage: f64,
    timestamp: DateTime<Utc>,
) -> Vec<String> {
    let mut causes: Vec<&str> = Vec::new();

    if timestamp.weekday().num_days_from_monday() >= 5 {
        causes.push("Weekend traffic patterns differ from weekday behavior");
    }

    let day = timestamp.day();
    if day <= 3 || day >= 28 {
        causes.push("Beginning or end of month budget cycle effects");
    }

    let increased = deviation_percentage > 0.0;
    let specific: &[&str] = match (metric_type, increased) {
        (MetricType::TotalSpend, true) => &[
            "Budget increase or bid strategy change",
            "New campaigns or keywords launched",
        ],
        (MetricType::TotalSpend, false) => &[
            "Budget caps reached or campaigns paused",
            "Lower bids or reduced auction competition",
        ],
        (MetricType::WastedSpend, true) => &[
            "Broad match keywords triggering irrelevant searches",
            "Missing negative keywords",
        ],
        (MetricType::WastedSpend, false) => &[
            "Recently added negative keywords taking effect",
            "Underperforming keywords paused",
        ],
        (MetricType::CostPerConversion, true) => &[
            "Increased auction competition",
            "Landing page or conversion tracking problems",
        ],
        (MetricType::CostPerConversion, false) => &[
            "Improved quality scores or bidding efficiency",
            "Conversions possibly double-counted",
        ],
        (MetricType::Roas, true) => &[
            "High-value conversions or seasonal demand",
            "Improved targeting efficiency",
        ],
        (MetricType::Roas, false) => &[
            "Conversion value tracking problems",
            "Shift toward lower-value products or audiences",
        ],
        (MetricType::Ctr, true) => &[
            "New ad copy resonating with searchers",
            "Improved average ad position",
        ],
        (MetricType::Ctr, false) => &[
            "Ad fatigue or stale creative",
            "Competitors pushing ads to lower positions",
        ],
        (MetricType::ConversionRate, true) => &[
            "Landing page improvements",
            "Better audience targeting",
        ],
        (MetricType::ConversionRate, false) => &[
            "Landing page errors or slow load times",
            "Conversion tracking tag problems",
        ],
        (MetricType::Conversions, true) => &[
            "Campaign optimizations paying off",
            "Seasonal demand increase",
        ],
        (MetricType::Conversions, false) => &[
            "Conversion tracking broken or removed",
            "Website or checkout problems",
        ],
        (MetricType::QualityScore, true) => {
            &["Improved ad relevance and landing page experience"]
        }
        (MetricType::QualityScore, false) => {
            &["Declining ad relevance or landing page experience"]
        }
        (MetricType::Impressions | MetricType::Clicks, true) => {
            &["Expanded reach from broader targeting or higher budget"]
        }
        (MetricType::Impressions | MetricType::Clicks, false) => {
            &["Reduced budget or narrowed targeting"]
        }
        _ => &[],
    };
    causes.extend_from_slice(specific);

    causes.push("Market conditions or competitor activity changed");
    causes.push("Tracking or data collection issue");

    causes.into_iter().map(String::from).collect()
}

/// Rule-based follow-up actions, gated by severity
pub fn recommended_actions(metric_type: MetricType, severity: Severity) -> Vec<String> {
    let mut actions: Vec<&str> = Vec::new();

    if severity >= Severity::High {
        actions.push("Investigate immediately and review recent account changes");
        actions.push("Verify conversion tracking and data integrity");
    }

    let specific: &[&str] = match metric_type {
        MetricType::TotalSpend => &["Review budget settings and pacing"],
        MetricType::WastedSpend => &["Review the search terms report and add negative keywords"],
        MetricType::CostPerConversion => &["Review bid strategy and keyword bids"],
        MetricType::Roas => &["Verify conversion value tracking"],
        MetricType::Ctr => &["Refresh ad copy and test new variations"],
        MetricType::ConversionRate | MetricType::Conversions => {
            &["Test landing page functionality and load speed"]
        }
        MetricType::QualityScore => &["Tighten keyword, ad and landing page relevance"],
        MetricType::Impressions | MetricType::Clicks => &["Check targeting and budget limits"],
        _ => &[],
    };
    actions.extend_from_slice(specific);

    if severity >= Severity::Medium {
        actions.push("Set up automated alerts for this metric");
        actions.push("Document findings and monitor for recurrence");
    }

    actions.into_iter().map(String::from).collect()
}
