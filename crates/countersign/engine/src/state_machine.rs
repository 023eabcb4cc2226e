//! Submit / Review / Resubmit transition logic.
//!
//! Each transition builds exactly one storage transaction: the new version
//! record plus every live-projection patch it implies. Preconditions are
//! checked before anything is built, so a failed transition mutates
//! nothing.

use crate::cascade::CascadeEngine;
use crate::errors::{WorkflowError, WorkflowResult};
use crate::resolver::VersionResolver;
use crate::sequencer::VersionSequencer;
use countersign_store::{
    Artifact, ArtifactPatch, StoreError, VersionRecord, WorkflowStore, WorkflowTxn,
};
use countersign_types::{
    ActorId, ApprovalDecision, ArtifactId, ArtifactKind, AuditPhase, ChildReviewDecision,
    ReviewRole, ReviewStatus, SnapshotPayload,
};
use std::sync::Arc;

/// Drives artifacts through `UnderReview -> {Approved+Active, Rejected}`
/// based on reviewer decisions recorded against snapshots.
pub struct ApprovalStateMachine {
    store: Arc<dyn WorkflowStore>,
    sequencer: VersionSequencer,
}

impl ApprovalStateMachine {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            store,
            sequencer: VersionSequencer::default(),
        }
    }

    pub fn with_sequencer(store: Arc<dyn WorkflowStore>, sequencer: VersionSequencer) -> Self {
        Self { store, sequencer }
    }

    /// Record a new submitter snapshot and place the artifact under
    /// review. Legal from any live status; `resubmit` is the variant
    /// reserved for rejected documents.
    pub async fn submit(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        payload: SnapshotPayload,
        author: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        let artifact = self.load_artifact(kind, artifact_id).await?;
        self.record_submission(&artifact, payload, author, None).await
    }

    /// Record a corrected snapshot after rejection. Child decisions reset
    /// to Pending and the artifact returns to review.
    pub async fn resubmit(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        payload: SnapshotPayload,
        author: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        let artifact = self.load_artifact(kind, artifact_id).await?;
        if artifact.status != ReviewStatus::Rejected {
            return Err(WorkflowError::InvalidState {
                current: artifact.status,
                detail: "resubmission is only allowed after rejection".into(),
            });
        }
        self.record_submission(&artifact, payload, author, Some(ReviewStatus::Rejected))
            .await
    }

    /// Record a reviewer decision against the current submitter snapshot.
    ///
    /// Approval flips the live artifact to approved/active, cascades to
    /// its children per the reviewed payload, and deactivates the
    /// previously active incarnation of the same logical artifact.
    /// Rejection leaves the document editable by its submitter.
    pub async fn review(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        decision: ApprovalDecision,
        child_decisions: &[ChildReviewDecision],
        reviewer: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        if decision.is_pending() {
            return Err(WorkflowError::Validation(
                "a review decision must be approved or rejected".into(),
            ));
        }

        let artifact = self.load_artifact(kind, artifact_id).await?;
        if artifact.status != ReviewStatus::UnderReview {
            return Err(WorkflowError::InvalidState {
                current: artifact.status,
                detail: "artifact has no submission awaiting review".into(),
            });
        }

        let records = self.store.list_versions(artifact_id).await?;
        let current = VersionResolver::current(&records).ok_or_else(|| {
            WorkflowError::InvalidState {
                current: artifact.status,
                detail: "no version has been submitted yet".into(),
            }
        })?;
        if current.label.role != ReviewRole::Submitter {
            return Err(WorkflowError::InvalidState {
                current: artifact.status,
                detail: "the current version was already reviewed".into(),
            });
        }

        let mut payload = current.payload.clone();
        payload.apply_decisions(child_decisions)?;
        let submission_author = current.author_id.clone();

        let patches = if decision.is_approved() {
            let mut patches = Vec::new();
            // Approving a re-created row supersedes the prior active
            // incarnation and its whole subtree.
            for prior in self
                .store
                .active_siblings(kind, &artifact.slug, &artifact.id)
                .await?
            {
                patches
                    .extend(CascadeEngine::on_deactivate(self.store.as_ref(), &prior.id).await?);
            }
            patches
                .extend(CascadeEngine::on_approve(self.store.as_ref(), &artifact, &payload).await?);
            patches
        } else {
            CascadeEngine::on_reject(&artifact)
        };

        let committed = self
            .sequencer
            .commit_next(
                self.store.as_ref(),
                artifact_id,
                ReviewRole::Reviewer,
                |sequence| {
                    WorkflowTxn::new(VersionRecord::reviewed(
                        artifact_id.clone(),
                        kind,
                        sequence,
                        payload.clone(),
                        submission_author.clone(),
                        reviewer.clone(),
                        decision,
                    ))
                    .with_patches(patches.clone())
                    // Another reviewer may have decided this submission
                    // between our precondition check and the commit.
                    .with_guard(artifact_id.clone(), ReviewStatus::UnderReview)
                },
            )
            .await;
        let record = match committed {
            Ok(record) => record,
            Err(err) => return Err(self.stale_guard_to_invalid_state(artifact_id, err).await),
        };

        tracing::info!(
            artifact = %artifact_id,
            version = %record.label.render(kind),
            decision = %decision,
            "review recorded"
        );
        Ok(record)
    }

    async fn load_artifact(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
    ) -> WorkflowResult<Artifact> {
        if !kind.supports_review() {
            return Err(WorkflowError::Validation(format!(
                "a {kind} is versioned through its parent document"
            )));
        }
        let artifact = self
            .store
            .get_artifact(artifact_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("{kind} {artifact_id} not found")))?;
        if artifact.kind != kind {
            return Err(WorkflowError::NotFound(format!(
                "{kind} {artifact_id} not found"
            )));
        }
        Ok(artifact)
    }

    async fn record_submission(
        &self,
        artifact: &Artifact,
        mut payload: SnapshotPayload,
        author: &ActorId,
        guard: Option<ReviewStatus>,
    ) -> WorkflowResult<VersionRecord> {
        payload.validate()?;
        // Each review round starts with a clean slate.
        payload.reset_decisions();

        let mut patch = ArtifactPatch {
            status: Some(ReviewStatus::UnderReview),
            name: Some(payload.title.clone()),
            description: Some(payload.summary.clone()),
            ..ArtifactPatch::default()
        };
        if artifact.kind == ArtifactKind::Audit {
            patch.phase = Some(AuditPhase::WorkInProgress);
        }

        let kind = artifact.kind;
        let artifact_id = artifact.id.clone();
        let committed = self
            .sequencer
            .commit_next(
                self.store.as_ref(),
                &artifact_id,
                ReviewRole::Submitter,
                |sequence| {
                    let mut txn = WorkflowTxn::new(VersionRecord::submitted(
                        artifact_id.clone(),
                        kind,
                        sequence,
                        payload.clone(),
                        author.clone(),
                    ))
                    .with_patches(vec![(artifact_id.clone(), patch.clone())]);
                    if let Some(expected) = guard {
                        txn = txn.with_guard(artifact_id.clone(), expected);
                    }
                    txn
                },
            )
            .await;
        let record = match committed {
            Ok(record) => record,
            Err(err) => return Err(self.stale_guard_to_invalid_state(&artifact_id, err).await),
        };

        tracing::info!(
            artifact = %artifact_id,
            version = %record.label.render(kind),
            "submission recorded"
        );
        Ok(record)
    }

    /// A failed commit-time guard means the artifact changed status between
    /// our precondition check and the commit. Report it the way the
    /// sequential path would have: invalid state, with the status the
    /// artifact actually has now.
    async fn stale_guard_to_invalid_state(
        &self,
        artifact_id: &ArtifactId,
        err: WorkflowError,
    ) -> WorkflowError {
        match err {
            WorkflowError::Storage(StoreError::InvariantViolation(detail)) => {
                let current = match self.store.get_artifact(artifact_id).await {
                    Ok(Some(artifact)) => artifact.status,
                    _ => ReviewStatus::UnderReview,
                };
                WorkflowError::InvalidState { current, detail }
            }
            other => other,
        }
    }
}
