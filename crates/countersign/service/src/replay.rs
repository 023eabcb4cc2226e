//! Deterministic projection replay.
//!
//! The live projection of an artifact is a fold over its version history:
//! each submission returns it to review, each reviewer record applies the
//! decision. Replaying the history must land on the same projection the
//! store carries, which makes the version trail a complete account of how
//! the document got where it is.

use countersign_store::{Artifact, VersionRecord};
use countersign_types::{
    ActiveState, ApprovalDecision, ArtifactKind, AuditPhase, ReviewRole, ReviewStatus,
};
use serde::{Deserialize, Serialize};

/// Projection re-derived from history alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayedProjection {
    pub status: ReviewStatus,
    pub active: ActiveState,
    pub phase: Option<AuditPhase>,
    pub name: String,
    pub description: String,
}

impl ReplayedProjection {
    /// Whether a live artifact row agrees with this replay.
    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.status == artifact.status
            && self.active == artifact.active
            && self.phase == artifact.phase
            && self.name == artifact.name
            && self.description == artifact.description
    }
}

/// Folds version records back into a live projection.
pub struct ReplayEngine;

impl ReplayEngine {
    /// Replay `records` in order. `None` when the history is empty.
    ///
    /// Supersession by a different incarnation of the same logical
    /// artifact is driven by that other artifact's history, so it is
    /// outside the scope of a single-artifact replay.
    pub fn replay(kind: ArtifactKind, records: &[VersionRecord]) -> Option<ReplayedProjection> {
        if records.is_empty() {
            return None;
        }

        let mut ordered: Vec<&VersionRecord> = records.iter().collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.label.cmp(&b.label))
        });

        let mut projection = ReplayedProjection {
            status: ReviewStatus::UnderReview,
            active: ActiveState::Inactive,
            phase: (kind == ArtifactKind::Audit).then_some(AuditPhase::WorkInProgress),
            name: String::new(),
            description: String::new(),
        };

        for record in ordered {
            match record.label.role {
                ReviewRole::Submitter => {
                    projection.status = ReviewStatus::UnderReview;
                    projection.name = record.payload.title.clone();
                    projection.description = record.payload.summary.clone();
                    if kind == ArtifactKind::Audit {
                        projection.phase = Some(AuditPhase::WorkInProgress);
                    }
                }
                ReviewRole::Reviewer => match record.decision {
                    Some(ApprovalDecision::Approved) => {
                        projection.status = ReviewStatus::Approved;
                        projection.active = ActiveState::Active;
                        if kind == ArtifactKind::Audit {
                            let all_accepted = record
                                .payload
                                .children
                                .iter()
                                .all(|finding| finding.approval.decision.is_approved());
                            projection.phase = Some(if all_accepted {
                                AuditPhase::Completed
                            } else {
                                AuditPhase::WorkInProgress
                            });
                        }
                    }
                    Some(ApprovalDecision::Rejected) => {
                        projection.status = ReviewStatus::Rejected;
                    }
                    Some(ApprovalDecision::Pending) | None => {}
                },
            }
        }

        Some(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countersign_types::{ActorId, ArtifactId, SnapshotPayload};

    fn submission(sequence: u32, title: &str) -> VersionRecord {
        VersionRecord::submitted(
            ArtifactId::new("p1"),
            ArtifactKind::Policy,
            sequence,
            SnapshotPayload::new(title, "summary"),
            ActorId::new("author"),
        )
    }

    fn verdict(sequence: u32, decision: ApprovalDecision) -> VersionRecord {
        VersionRecord::reviewed(
            ArtifactId::new("p1"),
            ArtifactKind::Policy,
            sequence,
            SnapshotPayload::new("reviewed", "summary"),
            ActorId::new("author"),
            ActorId::new("reviewer"),
            decision,
        )
    }

    #[test]
    fn empty_history_replays_to_nothing() {
        assert!(ReplayEngine::replay(ArtifactKind::Policy, &[]).is_none());
    }

    #[test]
    fn approval_then_new_submission_ends_under_review() {
        let records = vec![
            submission(1, "v1"),
            verdict(1, ApprovalDecision::Approved),
            submission(2, "v2"),
        ];
        let projection = ReplayEngine::replay(ArtifactKind::Policy, &records).unwrap();
        assert_eq!(projection.status, ReviewStatus::UnderReview);
        assert_eq!(projection.name, "v2");
        // Activation from the earlier approval survives the new round.
        assert_eq!(projection.active, ActiveState::Active);
    }

    #[test]
    fn rejection_leaves_the_document_rejected() {
        let records = vec![submission(1, "v1"), verdict(1, ApprovalDecision::Rejected)];
        let projection = ReplayEngine::replay(ArtifactKind::Policy, &records).unwrap();
        assert_eq!(projection.status, ReviewStatus::Rejected);
        assert_eq!(projection.active, ActiveState::Inactive);
    }
}
