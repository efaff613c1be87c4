use crate::models::{AuditId, AuditResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only access to stored audit snapshots.
///
/// Implemented by whatever owns persistence; the analytics layer never writes.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Get a single audit by id
    async fn get_audit(&self, id: AuditId) -> Result<Option<AuditResult>>;

    /// List a customer's audits created within `[start, end]`, oldest first
    async fn list_audits(
        &self,
        customer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditResult>>;
}
