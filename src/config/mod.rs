use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::MetricTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `AUDITLENS__DETECTOR__Z_THRESHOLD=3.0`
pub const ENV_PREFIX: &str = "AUDITLENS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub detector: DetectorConfig,
    pub trend: TrendConfig,
    pub comparison: ComparisonOptions,
    pub insights: InsightThresholds,
}

/// Tuning for [`crate::analytics::AnomalyDetector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Below this many historical values no detection is attempted
    pub min_historical_points: usize,
    pub z_threshold: f64,
    pub iqr_multiplier: f64,
    /// Residual z above which the trend-residual detector fires
    pub residual_threshold: f64,
    /// Residual std below this is treated as zero
    pub residual_std_epsilon: f64,
    /// Fraction of the historical range used as the residual std floor
    pub residual_floor_fraction: f64,
    pub critical_tier: SeverityLadder,
    pub high_sensitivity_tier: SeverityLadder,
    pub other_tier: SeverityLadder,
}

/// One rung of a severity ladder: crossed when either bound is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    pub deviation_pct: f64,
    pub z_score: f64,
}

impl SeverityThreshold {
    pub const fn new(deviation_pct: f64, z_score: f64) -> Self {
        Self {
            deviation_pct,
            z_score,
        }
    }

    pub fn crossed_by(&self, abs_deviation_pct: f64, abs_z: f64) -> bool {
        abs_deviation_pct > self.deviation_pct || abs_z > self.z_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityLadder {
    pub critical: SeverityThreshold,
    pub high: SeverityThreshold,
    pub medium: SeverityThreshold,
}

impl DetectorConfig {
    pub fn ladder(&self, tier: MetricTier) -> &SeverityLadder {
        match tier {
            MetricTier::Critical => &self.critical_tier,
            MetricTier::HighSensitivity => &self.high_sensitivity_tier,
            MetricTier::Other => &self.other_tier,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_historical_points: 5,
            z_threshold: 2.5,
            iqr_multiplier: 1.5,
            residual_threshold: 2.0,
            residual_std_epsilon: 1e-6,
            residual_floor_fraction: 0.05,
            critical_tier: SeverityLadder {
                critical: SeverityThreshold::new(50.0, 4.0),
                high: SeverityThreshold::new(30.0, 3.0),
                medium: SeverityThreshold::new(15.0, 2.5),
            },
            high_sensitivity_tier: SeverityLadder {
                critical: SeverityThreshold::new(75.0, 4.5),
                high: SeverityThreshold::new(40.0, 3.5),
                medium: SeverityThreshold::new(20.0, 2.5),
            },
            other_tier: SeverityLadder {
                critical: SeverityThreshold::new(100.0, 5.0),
                high: SeverityThreshold::new(60.0, 4.0),
                medium: SeverityThreshold::new(30.0, 3.0),
            },
        }
    }
}

/// Tuning for [`crate::analytics::TrendAnalyzer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// |slope| strictly below this is "stable"
    pub stable_slope_threshold: f64,
    pub z_threshold: f64,
    pub min_anomaly_points: usize,
    pub seasonality_min_points: usize,
    pub seasonality_lags: Vec<usize>,
    pub autocorrelation_threshold: f64,
    pub strong_trend: f64,
    pub moderate_trend: f64,
    pub forecast_change_threshold_pct: f64,
    pub max_listed_anomaly_dates: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            stable_slope_threshold: 0.01,
            z_threshold: 2.5,
            min_anomaly_points: 3,
            seasonality_min_points: 12,
            seasonality_lags: vec![3, 4, 12],
            autocorrelation_threshold: 0.3,
            strong_trend: 0.7,
            moderate_trend: 0.4,
            forecast_change_threshold_pct: 5.0,
            max_listed_anomaly_dates: 3,
        }
    }
}

/// Per-call switches for [`crate::analytics::AuditComparator::compare`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonOptions {
    pub include_statistical_tests: bool,
    pub confidence_level: f64,
    pub minimum_sample_size: u64,
    pub include_campaign_breakdown: bool,
    pub include_ad_group_breakdown: bool,
    pub include_recommendations: bool,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            include_statistical_tests: true,
            confidence_level: 0.95,
            minimum_sample_size: 30,
            include_campaign_breakdown: false,
            include_ad_group_breakdown: false,
            include_recommendations: true,
        }
    }
}

impl ComparisonOptions {
    pub fn validate(&self) -> AnalyticsResult<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(AnalyticsError::InvalidArgument(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.minimum_sample_size == 0 {
            return Err(AnalyticsError::InvalidArgument(
                "minimum_sample_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Significance level derived from the confidence level
    pub fn alpha(&self) -> f64 {
        1.0 - self.confidence_level
    }
}

/// Percent (or absolute, where noted) changes that trigger comparison insights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    pub wasted_spend_pct: f64,
    pub ctr_pct: f64,
    pub conversion_rate_pct: f64,
    pub roas_pct: f64,
    pub cost_per_conversion_pct: f64,
    /// Absolute change on the 1-10 quality score scale
    pub quality_score_points: f64,
    pub spend_growth_pct: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            wasted_spend_pct: 10.0,
            ctr_pct: 5.0,
            conversion_rate_pct: 10.0,
            roas_pct: 10.0,
            cost_per_conversion_pct: 10.0,
            quality_score_points: 0.5,
            spend_growth_pct: 20.0,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from `.env`, an optional file, then `AUDITLENS__*` variables.
    pub fn load(path: Option<&Path>) -> AnalyticsResult<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AnalyticsConfig = settings.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            z_threshold = config.detector.z_threshold,
            confidence_level = config.comparison.confidence_level,
            "Loaded analytics configuration"
        );
        Ok(config)
    }

    pub fn from_env() -> AnalyticsResult<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        self.comparison.validate()?;

        if self.detector.min_historical_points == 0 {
            return Err(AnalyticsError::InvalidArgument(
                "detector.min_historical_points must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("detector.z_threshold", self.detector.z_threshold),
            ("detector.iqr_multiplier", self.detector.iqr_multiplier),
            ("detector.residual_threshold", self.detector.residual_threshold),
            ("trend.z_threshold", self.trend.z_threshold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalyticsError::InvalidArgument(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
