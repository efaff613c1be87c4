mod audit;

pub use audit::{
    get_metric, AuditDetails, AuditId, AuditResult, AuditSummary, BreakdownEntry, MetricField,
    MetricTier, MetricType,
};
