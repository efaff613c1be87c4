use crate::models::{AuditId, AuditResult};
use crate::storage::AuditRepository;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// In-process audit store keyed by id
#[derive(Default)]
pub struct InMemoryAuditRepository {
    audits: DashMap<AuditId, AuditResult>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audits(audits: impl IntoIterator<Item = AuditResult>) -> Self {
        let repo = Self::new();
        for audit in audits {
            repo.insert(audit);
        }
        repo
    }

    /// Insert or replace an audit, returning the previous snapshot with that id
    pub fn insert(&self, audit: AuditResult) -> Option<AuditResult> {
        self.audits.insert(audit.id, audit)
    }

    pub fn len(&self) -> usize {
        self.audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn get_audit(&self, id: AuditId) -> Result<Option<AuditResult>> {
        Ok(self.audits.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_audits(
        &self,
        customer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditResult>> {
        let mut audits: Vec<AuditResult> = self
            .audits
            .iter()
            .filter(|entry| {
                let audit = entry.value();
                audit.customer_id == customer_id
                    && audit.created_at >= start
                    && audit.created_at <= end
            })
            .map(|entry| entry.value().clone())
            .collect();

        // DashMap iteration order is arbitrary
        audits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(audits)
    }
}
