//! In-memory reference implementation of [`WorkflowStore`].
//!
//! Deterministic and test-friendly. Commits serialize on a single write
//! lock, which gives the same all-or-nothing visibility the PostgreSQL
//! adapter gets from transactions.

use crate::model::{Artifact, VersionRecord, WorkflowTxn};
use crate::traits::WorkflowStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use countersign_types::{ArtifactId, ArtifactKind, ArtifactSlug, ReviewRole, VersionLabel};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory workflow store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    artifacts: HashMap<ArtifactId, Artifact>,
    versions: HashMap<ArtifactId, Vec<VersionRecord>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned(which: &str) -> StoreError {
    StoreError::Backend(format!("{which} lock poisoned"))
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put_artifact(&self, artifact: Artifact) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned("store"))?;
        state.artifacts.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, id: &ArtifactId) -> StoreResult<Option<Artifact>> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        Ok(state.artifacts.get(id).cloned())
    }

    async fn children_of(&self, parent: &ArtifactId) -> StoreResult<Vec<Artifact>> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        let mut children = state
            .artifacts
            .values()
            .filter(|a| a.parent.as_ref() == Some(parent))
            .cloned()
            .collect::<Vec<_>>();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(children)
    }

    async fn active_siblings(
        &self,
        kind: ArtifactKind,
        slug: &ArtifactSlug,
        except: &ArtifactId,
    ) -> StoreResult<Vec<Artifact>> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        let mut siblings = state
            .artifacts
            .values()
            .filter(|a| a.kind == kind && &a.slug == slug && a.active.is_active() && &a.id != except)
            .cloned()
            .collect::<Vec<_>>();
        siblings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(siblings)
    }

    async fn next_sequence(&self, artifact: &ArtifactId, role: ReviewRole) -> StoreResult<u32> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        let highest = state
            .versions
            .get(artifact)
            .into_iter()
            .flatten()
            .filter(|r| r.label.role == role)
            .map(|r| r.label.sequence)
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn list_versions(&self, artifact: &ArtifactId) -> StoreResult<Vec<VersionRecord>> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        Ok(state.versions.get(artifact).cloned().unwrap_or_default())
    }

    async fn get_version(
        &self,
        artifact: &ArtifactId,
        label: VersionLabel,
    ) -> StoreResult<VersionRecord> {
        let state = self.inner.read().map_err(|_| lock_poisoned("store"))?;
        state
            .versions
            .get(artifact)
            .into_iter()
            .flatten()
            .find(|r| r.label == label)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("version {:?} of artifact {artifact}", label))
            })
    }

    async fn commit(&self, txn: WorkflowTxn) -> StoreResult<VersionRecord> {
        let mut state = self.inner.write().map_err(|_| lock_poisoned("store"))?;
        let record = txn.record;

        record
            .check_role_consistency()
            .map_err(StoreError::InvariantViolation)?;

        if !state.artifacts.contains_key(&record.artifact_id) {
            return Err(StoreError::NotFound(format!(
                "artifact {} not found",
                record.artifact_id
            )));
        }

        for (id, expected) in &txn.guards {
            let artifact = state.artifacts.get(id).ok_or_else(|| {
                StoreError::NotFound(format!("guarded artifact {id} not found"))
            })?;
            if artifact.status != *expected {
                return Err(StoreError::InvariantViolation(format!(
                    "artifact {id} expected status {expected}, found {}",
                    artifact.status
                )));
            }
        }

        let duplicate = state
            .versions
            .get(&record.artifact_id)
            .into_iter()
            .flatten()
            .any(|existing| existing.label == record.label);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "version ({}, {}) already exists for artifact {}",
                record.label.role, record.label.sequence, record.artifact_id
            )));
        }

        // Validate every patch target before touching anything.
        for (id, _) in &txn.patches {
            if !state.artifacts.contains_key(id) {
                return Err(StoreError::NotFound(format!(
                    "patch target artifact {id} not found"
                )));
            }
        }

        let now = Utc::now();
        for (id, patch) in &txn.patches {
            if let Some(artifact) = state.artifacts.get_mut(id) {
                patch.apply_to(artifact, now);
            }
        }

        state
            .versions
            .entry(record.artifact_id.clone())
            .or_default()
            .push(record.clone());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactPatch;
    use countersign_types::{ActiveState, ActorId, ReviewStatus, SnapshotPayload};

    fn policy(id: &str, slug: &str) -> Artifact {
        Artifact::new(
            ArtifactId::new(id),
            ArtifactKind::Policy,
            ArtifactSlug::new(slug),
            "Data Retention",
        )
    }

    fn submission(artifact: &Artifact, sequence: u32) -> VersionRecord {
        VersionRecord::submitted(
            artifact.id.clone(),
            artifact.kind,
            sequence,
            SnapshotPayload::new("Data Retention", "keep less, delete sooner"),
            ActorId::new("author-1"),
        )
    }

    #[tokio::test]
    async fn commit_assigns_gapless_sequences() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        for expected in 1..=3 {
            let seq = store
                .next_sequence(&artifact.id, ReviewRole::Submitter)
                .await
                .unwrap();
            assert_eq!(seq, expected);
            store
                .commit(WorkflowTxn::new(submission(&artifact, seq)))
                .await
                .unwrap();
        }

        let versions = store.list_versions(&artifact.id).await.unwrap();
        let sequences: Vec<u32> = versions.iter().map(|r| r.label.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_label_is_a_conflict() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        store
            .commit(WorkflowTxn::new(submission(&artifact, 1)))
            .await
            .unwrap();
        let error = store
            .commit(WorkflowTxn::new(submission(&artifact, 1)))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn sequences_are_scoped_per_role() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        store
            .commit(WorkflowTxn::new(submission(&artifact, 1)))
            .await
            .unwrap();

        // The reviewer prefix starts its own sequence at 1.
        let seq = store
            .next_sequence(&artifact.id, ReviewRole::Reviewer)
            .await
            .unwrap();
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn commit_with_missing_patch_target_applies_nothing() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        let txn = WorkflowTxn::new(submission(&artifact, 1)).with_patches(vec![
            (artifact.id.clone(), ArtifactPatch::approve()),
            (ArtifactId::new("ghost"), ArtifactPatch::deactivate()),
        ]);

        let error = store.commit(txn).await.unwrap_err();
        assert!(matches!(error, StoreError::NotFound(_)));

        // Neither the record nor the valid patch landed.
        assert!(store.list_versions(&artifact.id).await.unwrap().is_empty());
        let live = store.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(live.status, ReviewStatus::UnderReview);
        assert_eq!(live.active, ActiveState::Inactive);
    }

    #[tokio::test]
    async fn stale_guard_fails_the_whole_commit() {
        let store = InMemoryWorkflowStore::new();
        let mut artifact = policy("p1", "data-retention");
        artifact.status = ReviewStatus::Approved;
        store.put_artifact(artifact.clone()).await.unwrap();

        let txn = WorkflowTxn::new(submission(&artifact, 1))
            .with_patches(vec![(artifact.id.clone(), ArtifactPatch::approve())])
            .with_guard(artifact.id.clone(), ReviewStatus::UnderReview);

        let error = store.commit(txn).await.unwrap_err();
        assert!(matches!(error, StoreError::InvariantViolation(_)));
        assert!(store.list_versions(&artifact.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitter_record_with_decision_is_rejected() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        let mut record = submission(&artifact, 1);
        record.decision = Some(countersign_types::ApprovalDecision::Approved);

        let error = store.commit(WorkflowTxn::new(record)).await.unwrap_err();
        assert!(matches!(error, StoreError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn get_version_not_found() {
        let store = InMemoryWorkflowStore::new();
        let artifact = policy("p1", "data-retention");
        store.put_artifact(artifact.clone()).await.unwrap();

        let error = store
            .get_version(&artifact.id, VersionLabel::submitted(1))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn active_siblings_match_kind_slug_and_state() {
        let store = InMemoryWorkflowStore::new();
        let mut old = policy("p-old", "data-retention");
        old.active = ActiveState::Active;
        let new = policy("p-new", "data-retention");
        let unrelated = policy("p-other", "access-control");

        store.put_artifact(old.clone()).await.unwrap();
        store.put_artifact(new.clone()).await.unwrap();
        store.put_artifact(unrelated).await.unwrap();

        let siblings = store
            .active_siblings(ArtifactKind::Policy, &new.slug, &new.id)
            .await
            .unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, old.id);
    }
}
