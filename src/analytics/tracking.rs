//! Recommendation implementation tracking

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// A recommendation issued by an earlier audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Observed account state: recommendation id -> whether the change is live
pub type AccountState = BTreeMap<String, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationStatus {
    Implemented,
    NotImplemented,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationRecord {
    pub recommendation_id: String,
    pub title: String,
    pub status: ImplementationStatus,
    pub note: String,
}

/// Match each recommendation against the observed account state.
///
/// Nothing is inferred: a recommendation the state says nothing about is
/// reported as unknown.
pub fn track_implementation(
    recommendations: &[Recommendation],
    account_state: &AccountState,
) -> Vec<ImplementationRecord> {
    if account_state.is_empty() && !recommendations.is_empty() {
        info!(
            count = recommendations.len(),
            "No account state supplied, implementation status cannot be verified"
        );
    }

    recommendations
        .iter()
        .map(|rec| {
            let (status, note) = match account_state.get(&rec.id) {
                Some(true) => (
                    ImplementationStatus::Implemented,
                    "Confirmed in current account state",
                ),
                Some(false) => (
                    ImplementationStatus::NotImplemented,
                    "Not reflected in current account state",
                ),
                None => (
                    ImplementationStatus::Unknown,
                    "Unverifiable: no account state for this recommendation",
                ),
            };

            ImplementationRecord {
                recommendation_id: rec.id.clone(),
                title: rec.title.clone(),
                status,
                note: note.to_string(),
            }
        })
        .collect()
}
