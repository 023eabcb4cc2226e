//! Read models over an artifact's version history.

use chrono::{DateTime, Utc};
use countersign_store::{Artifact, VersionRecord};
use countersign_types::{
    ActorId, ApprovalDecision, VersionLabel, VersionRecordId,
};
use serde::{Deserialize, Serialize};

/// One history row: everything a caller needs to render the version list
/// without loading full payloads. `display` is the human label (`u3`,
/// `r1`, `A2`); it is produced here and nowhere parsed back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub record_id: VersionRecordId,
    pub label: VersionLabel,
    pub display: String,
    pub author_id: ActorId,
    pub reviewer_id: Option<ActorId>,
    pub decision: Option<ApprovalDecision>,
    pub decision_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VersionSummary {
    pub fn from_record(record: &VersionRecord) -> Self {
        Self {
            record_id: record.record_id.clone(),
            label: record.label,
            display: record.label.render(record.kind),
            author_id: record.author_id.clone(),
            reviewer_id: record.reviewer_id.clone(),
            decision: record.decision,
            decision_date: record.decision_date,
            created_at: record.created_at,
        }
    }
}

/// The canonical answer to "what is this artifact right now": the live
/// projection, the resolved current snapshot, and the full history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurrentView {
    pub artifact: Artifact,
    /// `None` when no version has been submitted yet.
    pub current: Option<VersionRecord>,
    /// Chronological, oldest first.
    pub history: Vec<VersionSummary>,
}

/// Summarize records in chronological order. Records created in the same
/// instant fall back to label order, which matches the order they were
/// committed.
pub fn build_history(records: &[VersionRecord]) -> Vec<VersionSummary> {
    let mut ordered: Vec<&VersionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.label.cmp(&b.label))
    });
    ordered.into_iter().map(VersionSummary::from_record).collect()
}
