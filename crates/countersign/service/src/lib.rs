//! Countersign workflow service — the one surface external collaborators
//! call.
//!
//! CRUD handlers and HTTP layers own artifact/actor identity resolution;
//! this service owns everything versioned: recording snapshots, driving
//! review decisions, resolving the current version, and serving history.
//!
//! # Example
//!
//! ```rust
//! use countersign_service::{ServiceConfig, WorkflowService};
//! use countersign_store::InMemoryWorkflowStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryWorkflowStore::new());
//! let service = WorkflowService::with_config(store, ServiceConfig::default());
//! let _ = service;
//! ```

#![deny(unsafe_code)]

pub mod history;
pub mod replay;

pub use history::{build_history, CurrentView, VersionSummary};
pub use replay::{ReplayEngine, ReplayedProjection};

use countersign_engine::sequencer::DEFAULT_MAX_ATTEMPTS;
use countersign_engine::{
    ApprovalStateMachine, VersionResolver, VersionSequencer, WorkflowError, WorkflowResult,
};
use countersign_store::{VersionRecord, WorkflowStore};
use countersign_types::{
    ActorId, ApprovalDecision, ArtifactId, ArtifactKind, ChildReviewDecision, SnapshotPayload,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunables for the workflow service.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bound on internal sequence-allocation retries before a call
    /// escalates as transient unavailability.
    pub max_sequence_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_sequence_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// The workflow facade: submit, review, resubmit, query current.
pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    machine: ApprovalStateMachine,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    pub fn with_config(store: Arc<dyn WorkflowStore>, config: ServiceConfig) -> Self {
        let machine = ApprovalStateMachine::with_sequencer(
            store.clone(),
            VersionSequencer::new(config.max_sequence_attempts),
        );
        Self { store, machine }
    }

    /// Record a full document snapshot for review.
    pub async fn submit(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        payload: SnapshotPayload,
        author: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        self.machine.submit(kind, artifact_id, payload, author).await
    }

    /// Record a reviewer decision, with per-child verdicts, against the
    /// current submission.
    pub async fn review(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        decision: ApprovalDecision,
        child_decisions: &[ChildReviewDecision],
        reviewer: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        self.machine
            .review(kind, artifact_id, decision, child_decisions, reviewer)
            .await
    }

    /// Record a corrected snapshot after rejection.
    pub async fn resubmit(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
        payload: SnapshotPayload,
        author: &ActorId,
    ) -> WorkflowResult<VersionRecord> {
        self.machine
            .resubmit(kind, artifact_id, payload, author)
            .await
    }

    /// The live projection, the resolved current version, and the full
    /// history, oldest first.
    pub async fn get_current(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
    ) -> WorkflowResult<CurrentView> {
        let artifact = self.load_artifact(kind, artifact_id).await?;
        let records = self.store.list_versions(artifact_id).await?;

        Ok(CurrentView {
            artifact,
            current: VersionResolver::current(&records).cloned(),
            history: build_history(&records),
        })
    }

    /// Integrity check over an artifact's stored history: sequences per
    /// role must be gapless from 1.
    pub async fn validate_history(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
    ) -> WorkflowResult<()> {
        self.load_artifact(kind, artifact_id).await?;
        let records = self.store.list_versions(artifact_id).await?;
        VersionResolver::validate_sequences(&records)
    }

    async fn load_artifact(
        &self,
        kind: ArtifactKind,
        artifact_id: &ArtifactId,
    ) -> WorkflowResult<countersign_store::Artifact> {
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
}
