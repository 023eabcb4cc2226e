//! Stored record shapes.

use chrono::{DateTime, Utc};
use countersign_types::{
    ActiveState, ActorId, ApprovalDecision, ArtifactId, ArtifactKind, ArtifactSlug, AuditPhase,
    ReviewRole, ReviewStatus, SnapshotPayload, VersionLabel, VersionRecordId,
};
use serde::{Deserialize, Serialize};

/// Live projection of one document node: the current, mutable summary
/// derived from its version history. Written exclusively through
/// [`WorkflowTxn`](crate::WorkflowTxn) commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    /// Human identifier shared by every incarnation of the logical
    /// artifact; used to find the previously active row on approval.
    pub slug: ArtifactSlug,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parent: Option<ArtifactId>,
    pub status: ReviewStatus,
    pub active: ActiveState,
    /// Audits only.
    pub phase: Option<AuditPhase>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        id: ArtifactId,
        kind: ArtifactKind,
        slug: ArtifactSlug,
        name: impl Into<String>,
    ) -> Self {
        let phase = match kind {
            ArtifactKind::Audit => Some(AuditPhase::WorkInProgress),
            _ => None,
        };
        Self {
            id,
            kind,
            slug,
            name: name.into(),
            description: String::new(),
            parent: None,
            status: ReviewStatus::UnderReview,
            active: ActiveState::Inactive,
            phase,
            updated_at: Utc::now(),
        }
    }

    pub fn with_parent(mut self, parent: ArtifactId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One immutable version snapshot. Created once, never mutated, never
/// deleted; superseded only by records with higher labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub record_id: VersionRecordId,
    pub artifact_id: ArtifactId,
    pub kind: ArtifactKind,
    pub label: VersionLabel,
    pub payload: SnapshotPayload,
    pub author_id: ActorId,
    pub reviewer_id: Option<ActorId>,
    /// Set only on reviewer-role records.
    pub decision: Option<ApprovalDecision>,
    pub decision_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VersionRecord {
    /// A submitter-role record: no decision, no reviewer.
    pub fn submitted(
        artifact_id: ArtifactId,
        kind: ArtifactKind,
        sequence: u32,
        payload: SnapshotPayload,
        author_id: ActorId,
    ) -> Self {
        Self {
            record_id: VersionRecordId::generate(),
            artifact_id,
            kind,
            label: VersionLabel::submitted(sequence),
            payload,
            author_id,
            reviewer_id: None,
            decision: None,
            decision_date: None,
            created_at: Utc::now(),
        }
    }

    /// A reviewer-role record carrying the verdict. `decision_date` is the
    /// review time for approvals and absent otherwise.
    pub fn reviewed(
        artifact_id: ArtifactId,
        kind: ArtifactKind,
        sequence: u32,
        payload: SnapshotPayload,
        author_id: ActorId,
        reviewer_id: ActorId,
        decision: ApprovalDecision,
    ) -> Self {
        let now = Utc::now();
        let decision_date = decision.is_approved().then_some(now);
        Self {
            record_id: VersionRecordId::generate(),
            artifact_id,
            kind,
            label: VersionLabel::reviewed(sequence),
            payload,
            author_id,
            reviewer_id: Some(reviewer_id),
            decision: Some(decision),
            decision_date,
            created_at: now,
        }
    }

    /// Role/decision consistency required of every stored record.
    pub fn check_role_consistency(&self) -> Result<(), String> {
        match self.label.role {
            ReviewRole::Submitter => {
                if self.decision.is_some() || self.reviewer_id.is_some() {
                    return Err(format!(
                        "submitter record {} must not carry a decision or reviewer",
                        self.record_id
                    ));
                }
            }
            ReviewRole::Reviewer => {
                if self.decision.is_none() || self.reviewer_id.is_none() {
                    return Err(format!(
                        "reviewer record {} must carry a decision and reviewer",
                        self.record_id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Partial update to one live projection row. `None` fields are untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPatch {
    pub status: Option<ReviewStatus>,
    pub active: Option<ActiveState>,
    pub phase: Option<AuditPhase>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ArtifactPatch {
    pub fn status(status: ReviewStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn approve() -> Self {
        Self {
            status: Some(ReviewStatus::Approved),
            active: Some(ActiveState::Active),
            ..Self::default()
        }
    }

    pub fn deactivate() -> Self {
        Self {
            active: Some(ActiveState::Inactive),
            ..Self::default()
        }
    }

    pub fn with_phase(mut self, phase: AuditPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.active.is_none()
            && self.phase.is_none()
            && self.name.is_none()
            && self.description.is_none()
    }

    pub fn apply_to(&self, artifact: &mut Artifact, at: DateTime<Utc>) {
        if let Some(status) = self.status {
            artifact.status = status;
        }
        if let Some(active) = self.active {
            artifact.active = active;
        }
        if let Some(phase) = self.phase {
            artifact.phase = Some(phase);
        }
        if let Some(name) = &self.name {
            artifact.name = name.clone();
        }
        if let Some(description) = &self.description {
            artifact.description = description.clone();
        }
        artifact.updated_at = at;
    }
}

/// One workflow transition: a new version record plus every live-projection
/// update it implies. Applied atomically by
/// [`WorkflowStore::commit`](crate::WorkflowStore::commit).
///
/// Guards are compare-and-set preconditions checked inside the commit: the
/// named artifact must still carry the expected status, otherwise the whole
/// transaction fails with nothing applied. They close the gap between a
/// caller's precondition check and its commit under concurrency.
#[derive(Clone, Debug)]
pub struct WorkflowTxn {
    pub record: VersionRecord,
    pub patches: Vec<(ArtifactId, ArtifactPatch)>,
    pub guards: Vec<(ArtifactId, ReviewStatus)>,
}

impl WorkflowTxn {
    pub fn new(record: VersionRecord) -> Self {
        Self {
            record,
            patches: Vec::new(),
            guards: Vec::new(),
        }
    }

    pub fn with_patches(mut self, patches: Vec<(ArtifactId, ArtifactPatch)>) -> Self {
        self.patches = patches;
        self
    }

    pub fn with_guard(mut self, artifact: ArtifactId, expected: ReviewStatus) -> Self {
        self.guards.push((artifact, expected));
        self
    }
}
