//! Audit analytics
//!
//! Anomaly detection over metric histories, trend analysis across stored
//! audits and period-over-period audit comparison. The statistical
//! primitives in [`stats`] are shared by all three.

pub mod anomaly;
pub mod comparison;
pub mod export;
pub mod models;
pub mod stats;
pub mod tracking;
pub mod trend;

pub use anomaly::AnomalyDetector;
pub use comparison::AuditComparator;
pub use models::{
    AnomalyAlert, ComparisonMetrics, ComparisonResult, DetectionMethod, Granularity, Severity,
    TrendAnalysis, TrendDataPoint, TrendDirection,
};
pub use trend::{TrendAnalyzer, TrendRequest};
