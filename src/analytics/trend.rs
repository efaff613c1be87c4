//! Longitudinal trend analysis over a customer's audit history

use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::anomaly::z_score_outcome;
use crate::analytics::models::{Granularity, TrendAnalysis, TrendDataPoint, TrendDirection};
use crate::analytics::stats;
use crate::config::TrendConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{get_metric, AuditResult, MetricType};
use crate::storage::AuditRepository;

/// Parameters of one trend request
#[derive(Debug, Clone)]
pub struct TrendRequest {
    pub customer_id: String,
    pub metric_types: Vec<MetricType>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub granularity: Granularity,
    pub include_forecast: bool,
    pub forecast_periods: usize,
}

impl TrendRequest {
    pub fn new(
        customer_id: impl Into<String>,
        metric_types: Vec<MetricType>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            metric_types,
            start_date,
            end_date,
            granularity: Granularity::Weekly,
            include_forecast: false,
            forecast_periods: 4,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_forecast(mut self, periods: usize) -> Self {
        self.include_forecast = true;
        self.forecast_periods = periods;
        self
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.start_date > self.end_date {
            return Err(AnalyticsError::InvalidArgument(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.include_forecast && self.forecast_periods == 0 {
            return Err(AnalyticsError::InvalidArgument(
                "forecast_periods must be greater than 0 when forecasting".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct TrendAnalyzer {
    repository: Arc<dyn AuditRepository>,
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(repository: Arc<dyn AuditRepository>, config: TrendConfig) -> Self {
        Self { repository, config }
    }

    /// Fetch the customer's audits in range and analyze each requested metric.
    ///
    /// No audits, or a failed fetch, yields an empty map. Metrics with no
    /// values in any period are left out.
    pub async fn analyze(
        &self,
        request: &TrendRequest,
    ) -> AnalyticsResult<BTreeMap<MetricType, TrendAnalysis>> {
        request.validate()?;

        let audits = match self
            .repository
            .list_audits(&request.customer_id, request.start_date, request.end_date)
            .await
        {
            Ok(audits) => audits,
            Err(e) => {
                warn!(
                    customer_id = %request.customer_id,
                    "Failed to fetch audits for trend analysis: {}", e
                );
                return Ok(BTreeMap::new());
            }
        };

        if audits.is_empty() {
            info!(
                customer_id = %request.customer_id,
                "No audits found in range, skipping trend analysis"
            );
            return Ok(BTreeMap::new());
        }

        let forecast_periods = request
            .include_forecast
            .then_some(request.forecast_periods);

        let mut results = BTreeMap::new();
        for &metric_type in &request.metric_types {
            if let Some(mut analysis) = self.analyze_metric_trend(
                &audits,
                metric_type,
                request.granularity,
                forecast_periods,
            ) {
                analysis.start_date = request.start_date;
                analysis.end_date = request.end_date;
                results.insert(metric_type, analysis);
            }
        }

        Ok(results)
    }

    /// Analyze one metric over already-fetched audits.
    ///
    /// Returns `None` when no period carries a value for the metric.
    pub fn analyze_metric_trend(
        &self,
        audits: &[AuditResult],
        metric_type: MetricType,
        granularity: Granularity,
        forecast_periods: Option<usize>,
    ) -> Option<TrendAnalysis> {
        let mut data_points: Vec<TrendDataPoint> = group_by_period(audits, granularity)
            .into_iter()
            .filter_map(|audit| {
                get_metric(audit, metric_type)
                    .map(|value| TrendDataPoint::new(audit.created_at, value, metric_type))
            })
            .collect();

        let first = data_points.first()?.timestamp;
        let last = data_points.last()?.timestamp;

        let values: Vec<f64> = data_points.iter().map(|p| p.value).collect();
        let x = stats::index_axis(values.len());
        let (slope, intercept) = stats::linear_fit(&x, &values);
        let trend_strength = stats::r_squared(&x, &values, slope, intercept);
        let trend_direction = classify_direction(slope, self.config.stable_slope_threshold);

        let anomalies_detected = self.flag_anomalies(&mut data_points);
        let seasonality_detected = self.detect_seasonality(&values);

        let forecast = match forecast_periods {
            Some(periods) if periods > 0 && data_points.len() >= 3 => {
                Some(forecast(&data_points, granularity, periods))
            }
            _ => None,
        };

        debug!(
            metric = %metric_type,
            points = data_points.len(),
            slope,
            trend_strength,
            anomalies_detected,
            seasonality_detected,
            "Computed metric trend"
        );

        let insights = self.generate_insights(
            metric_type,
            trend_direction,
            trend_strength,
            &data_points,
            seasonality_detected,
            forecast.as_deref(),
        );

        Some(TrendAnalysis {
            metric_type,
            granularity,
            start_date: first,
            end_date: last,
            data_points,
            trend_direction,
            trend_strength,
            slope,
            forecast,
            seasonality_detected,
            anomalies_detected,
            insights,
        })
    }

    /// Flag points whose z-score against the whole series exceeds the threshold
    fn flag_anomalies(&self, data_points: &mut [TrendDataPoint]) -> usize {
        if data_points.len() < self.config.min_anomaly_points {
            return 0;
        }

        let values: Vec<f64> = data_points.iter().map(|p| p.value).collect();
        let mean = stats::mean(&values);
        let std = stats::stddev(&values);

        let mut flagged = 0;
        for point in data_points.iter_mut() {
            let outcome = z_score_outcome(point.value, mean, std, self.config.z_threshold);
            if outcome.triggered {
                point.is_anomaly = true;
                point.anomaly_score = outcome.magnitude;
                flagged += 1;
            }
        }
        flagged
    }

    fn detect_seasonality(&self, values: &[f64]) -> bool {
        if values.len() < self.config.seasonality_min_points {
            return false;
        }

        let (slope, intercept) = stats::fit_series(values);
        let detrended = stats::detrend(values, slope, intercept);

        self.config
            .seasonality_lags
            .iter()
            .filter(|&&lag| lag > 0 && lag < detrended.len())
            .any(|&lag| stats::autocorrelation(&detrended, lag) > self.config.autocorrelation_threshold)
    }

    fn generate_insights(
        &self,
        metric_type: MetricType,
        direction: TrendDirection,
        strength: f64,
        data_points: &[TrendDataPoint],
        seasonality_detected: bool,
        forecast: Option<&[TrendDataPoint]>,
    ) -> Vec<String> {
        let mut insights = Vec::new();
        let label = metric_type.label();

        if direction != TrendDirection::Stable {
            let band = if strength > self.config.strong_trend {
                "strong"
            } else if strength > self.config.moderate_trend {
                "moderate"
            } else {
                "weak"
            };
            insights.push(format!(
                "{label} shows a {band} {direction} trend (R² = {strength:.2})"
            ));
        }

        let anomalies: Vec<&TrendDataPoint> = data_points.iter().filter(|p| p.is_anomaly).collect();
        if !anomalies.is_empty() {
            let dates = anomalies
                .iter()
                .take(self.config.max_listed_anomaly_dates)
                .map(|p| p.timestamp.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let noun = if anomalies.len() == 1 {
                "anomaly"
            } else {
                "anomalies"
            };
            insights.push(format!(
                "Detected {} {noun} in {label} on {dates}",
                anomalies.len()
            ));
        }

        if seasonality_detected {
            insights.push(format!("Seasonal pattern detected in {label}"));
        }

        if let (Some(forecast), Some(last_actual)) = (forecast, data_points.last()) {
            if let Some(last_forecast) = forecast.last() {
                let change = stats::percentage_change(last_actual.value, last_forecast.value, false);
                if change.abs() > self.config.forecast_change_threshold_pct {
                    let verb = if change > 0.0 { "rise" } else { "fall" };
                    insights.push(format!(
                        "{label} is forecast to {verb} {:.1}% over the next {} periods",
                        change.abs(),
                        forecast.len()
                    ));
                }
            }
        }

        insights
    }
}

/// `Stable` when |slope| is strictly below the threshold
pub fn classify_direction(slope: f64, stable_threshold: f64) -> TrendDirection {
    if slope.abs() < stable_threshold {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

/// Sortable key of the period containing `timestamp`
pub fn period_key(timestamp: DateTime<Utc>, granularity: Granularity) -> String {
    match granularity {
        Granularity::Daily => timestamp.format("%Y-%m-%d").to_string(),
        Granularity::Weekly => {
            let week = timestamp.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Monthly => timestamp.format("%Y-%m").to_string(),
        Granularity::Quarterly => {
            format!("{}-Q{}", timestamp.year(), (timestamp.month() - 1) / 3 + 1)
        }
    }
}

/// One representative audit per period, chronologically.
///
/// The most recently created audit represents its period; on equal
/// timestamps the later one in input order wins.
pub fn group_by_period(audits: &[AuditResult], granularity: Granularity) -> Vec<&AuditResult> {
    let mut buckets: BTreeMap<String, &AuditResult> = BTreeMap::new();

    for audit in audits {
        buckets
            .entry(period_key(audit.created_at, granularity))
            .and_modify(|current| {
                if audit.created_at >= current.created_at {
                    *current = audit;
                }
            })
            .or_insert(audit);
    }

    buckets.into_values().collect()
}

/// Project the fitted line forward, clamped at zero.
///
/// The projection stops early once a timestamp would fall outside the
/// representable date range.
pub fn forecast(
    data_points: &[TrendDataPoint],
    granularity: Granularity,
    periods: usize,
) -> Vec<TrendDataPoint> {
    let Some(last) = data_points.last() else {
        return Vec::new();
    };

    let values: Vec<f64> = data_points.iter().map(|p| p.value).collect();
    let (slope, intercept) = stats::fit_series(&values);
    let last_index = (values.len() - 1) as f64;
    let step = granularity.step();

    (1..=periods)
        .map_while(|i| {
            let offset = step.checked_mul(i32::try_from(i).ok()?)?;
            let timestamp = last.timestamp.checked_add_signed(offset)?;
            let predicted = (slope * (last_index + i as f64) + intercept).max(0.0);
            Some(TrendDataPoint::new(timestamp, predicted, last.metric_type))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditSummary;
    use crate::storage::InMemoryAuditRepository;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn audit(id: i64, created_at: DateTime<Utc>, metric: &str, value: f64) -> AuditResult {
        AuditResult {
            id,
            customer_id: "cust-1".to_string(),
            created_at,
            summary: AuditSummary {
                metrics: [(metric.to_string(), value)].into_iter().collect(),
                total_issues: None,
            },
            details: None,
        }
    }

    fn daily_series(values: &[f64]) -> Vec<AuditResult> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| audit(i as i64, base() + Duration::days(i as i64), "clicks", *v))
            .collect()
    }

    fn analyzer() -> TrendAnalyzer {
        TrendAnalyzer::new(
            Arc::new(InMemoryAuditRepository::new()),
            TrendConfig::default(),
        )
    }

    #[test]
    fn test_classify_direction_boundary() {
        assert_eq!(classify_direction(0.0, 0.01), TrendDirection::Stable);
        assert_eq!(classify_direction(0.0099, 0.01), TrendDirection::Stable);
        assert_eq!(classify_direction(0.01, 0.01), TrendDirection::Increasing);
        assert_eq!(classify_direction(-0.01, 0.01), TrendDirection::Decreasing);
        assert_eq!(classify_direction(-0.0099, 0.01), TrendDirection::Stable);
    }

    #[test]
    fn test_period_keys() {
        // Wednesday 2024-01-10 falls in ISO week 2
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        assert_eq!(period_key(ts, Granularity::Daily), "2024-01-10");
        assert_eq!(period_key(ts, Granularity::Weekly), "2024-W02");
        assert_eq!(period_key(ts, Granularity::Monthly), "2024-01");
        assert_eq!(period_key(ts, Granularity::Quarterly), "2024-Q1");

        let november = Utc.with_ymd_and_hms(2024, 11, 30, 0, 0, 0).unwrap();
        assert_eq!(period_key(november, Granularity::Quarterly), "2024-Q4");

        // Monday and Sunday of the same ISO week share a key
        let monday = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 23, 0, 0).unwrap();
        assert_eq!(
            period_key(monday, Granularity::Weekly),
            period_key(sunday, Granularity::Weekly)
        );
    }

    #[test]
    fn test_latest_audit_represents_period() {
        let audits = vec![
            audit(1, base() + Duration::hours(5), "clicks", 50.0),
            audit(2, base(), "clicks", 10.0),
            audit(3, base() + Duration::days(1), "clicks", 20.0),
        ];

        let grouped = group_by_period(&audits, Granularity::Daily);
        let ids: Vec<i64> = grouped.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_equal_timestamps_later_input_wins() {
        let audits = vec![
            audit(1, base(), "clicks", 10.0),
            audit(2, base(), "clicks", 11.0),
        ];
        let grouped = group_by_period(&audits, Granularity::Daily);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].id, 2);
    }

    #[test]
    fn test_linear_series_trend() {
        let audits = daily_series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, None)
            .unwrap();

        assert_eq!(analysis.data_points.len(), 5);
        assert!((analysis.slope - 10.0).abs() < 1e-9);
        assert_eq!(analysis.trend_direction, TrendDirection::Increasing);
        assert!((analysis.trend_strength - 1.0).abs() < 1e-9);
        assert_eq!(analysis.anomalies_detected, 0);
        assert!(!analysis.seasonality_detected);
        assert!(analysis.forecast.is_none());
        assert_eq!(
            analysis.insights,
            vec!["Clicks shows a strong increasing trend (R² = 1.00)"]
        );
    }

    #[test]
    fn test_flat_series_has_no_direction_insight() {
        let audits = daily_series(&[5.0, 5.0, 5.0, 5.0]);
        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, None)
            .unwrap();

        assert_eq!(analysis.trend_direction, TrendDirection::Stable);
        assert_eq!(analysis.trend_strength, 0.0);
        assert_eq!(analysis.anomalies_detected, 0);
        assert!(analysis.insights.is_empty());
    }

    #[test]
    fn test_missing_metric_periods_are_skipped() {
        let mut audits = daily_series(&[10.0, 20.0, 30.0]);
        audits.push(audit(9, base() + Duration::days(3), "impressions", 999.0));

        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, None)
            .unwrap();
        assert_eq!(analysis.data_points.len(), 3);

        assert!(analyzer()
            .analyze_metric_trend(&audits, MetricType::Roas, Granularity::Daily, None)
            .is_none());
    }

    #[test]
    fn test_whole_series_anomaly_flagging() {
        let audits = daily_series(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 50.0]);
        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, None)
            .unwrap();

        assert_eq!(analysis.anomalies_detected, 1);
        let flagged = analysis.data_points.last().unwrap();
        assert!(flagged.is_anomaly);
        assert!((flagged.anomaly_score - 3.0).abs() < 1e-9);
        assert!(analysis
            .insights
            .contains(&"Detected 1 anomaly in Clicks on 2024-01-10".to_string()));
    }

    #[test]
    fn test_two_points_never_flag_anomalies() {
        let audits = daily_series(&[1.0, 1000.0]);
        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, Some(3))
            .unwrap();

        assert_eq!(analysis.anomalies_detected, 0);
        assert!(analysis.forecast.is_none());
    }

    #[test]
    fn test_seasonality_detection() {
        let pattern = [10.0, 20.0, 10.0, 0.0];
        let values: Vec<f64> = (0..24).map(|i| pattern[i % 4] + i as f64).collect();
        let audits = daily_series(&values);

        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, None)
            .unwrap();
        assert!(analysis.seasonality_detected);
        assert!(analysis
            .insights
            .contains(&"Seasonal pattern detected in Clicks".to_string()));

        let linear: Vec<f64> = (0..24).map(|i| i as f64 * 2.0).collect();
        let analysis = analyzer()
            .analyze_metric_trend(
                &daily_series(&linear),
                MetricType::Clicks,
                Granularity::Daily,
                None,
            )
            .unwrap();
        assert!(!analysis.seasonality_detected);
    }

    #[test]
    fn test_seasonality_needs_minimum_points() {
        let pattern = [10.0, 20.0, 10.0, 0.0];
        let values: Vec<f64> = (0..8).map(|i| pattern[i % 4]).collect();
        let analysis = analyzer()
            .analyze_metric_trend(
                &daily_series(&values),
                MetricType::Clicks,
                Granularity::Daily,
                None,
            )
            .unwrap();
        assert!(!analysis.seasonality_detected);
    }

    #[test]
    fn test_forecast_spacing_and_clamp() {
        let points: Vec<TrendDataPoint> = [30.0, 20.0, 10.0]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                TrendDataPoint::new(base() + Duration::days(30 * i as i64), *v, MetricType::Clicks)
            })
            .collect();

        let projected = forecast(&points, Granularity::Monthly, 3);
        assert_eq!(projected.len(), 3);
        assert!(projected[0].value.abs() < 1e-9);
        assert_eq!(projected[1].value, 0.0);
        assert_eq!(projected[2].value, 0.0);
        assert_eq!(projected[0].timestamp, base() + Duration::days(90));
        assert_eq!(projected[2].timestamp, base() + Duration::days(150));
    }

    #[test]
    fn test_forecast_stops_at_date_range_end() {
        let points: Vec<TrendDataPoint> = [10.0, 20.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, v)| {
                TrendDataPoint::new(base() + Duration::days(90 * i as i64), *v, MetricType::Clicks)
            })
            .collect();

        let projected = forecast(&points, Granularity::Quarterly, 2_000_000);
        assert!(!projected.is_empty());
        assert!(projected.len() < 2_000_000);
        assert!(projected
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));

        let last = projected.last().unwrap().timestamp;
        assert!(last
            .checked_add_signed(Granularity::Quarterly.step())
            .is_none());
    }

    #[test]
    fn test_forecast_insight() {
        let audits = daily_series(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let analysis = analyzer()
            .analyze_metric_trend(&audits, MetricType::Clicks, Granularity::Daily, Some(2))
            .unwrap();

        let forecast = analysis.forecast.as_ref().unwrap();
        assert_eq!(forecast.len(), 2);
        assert!((forecast[0].value - 60.0).abs() < 1e-9);
        assert!((forecast[1].value - 70.0).abs() < 1e-9);
        assert!(analysis
            .insights
            .contains(&"Clicks is forecast to rise 40.0% over the next 2 periods".to_string()));
    }

    #[test]
    fn test_request_validation() {
        let request = TrendRequest::new(
            "cust-1",
            vec![MetricType::Clicks],
            base(),
            base() - Duration::days(1),
        );
        assert!(request.validate().is_err());

        let request =
            TrendRequest::new("cust-1", vec![MetricType::Clicks], base(), base()).with_forecast(0);
        assert!(request.validate().is_err());
    }
}
