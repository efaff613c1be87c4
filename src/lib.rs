pub mod analytics;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use analytics::{AnomalyDetector, AuditComparator, TrendAnalyzer, TrendRequest};
pub use crate::config::AnalyticsConfig;
pub use error::{AnalyticsError, AnalyticsResult};
