//! Sequence allocation for version records.
//!
//! A sequence number is only meaningful inside the commit that consumes
//! it: the sequencer reads the next free number, builds the transaction,
//! and lets the store's uniqueness guarantee arbitrate races. On a
//! conflict the number is re-derived from scratch — a stale sequence is
//! never reused, so no retry can duplicate a record.

use crate::errors::{WorkflowError, WorkflowResult};
use countersign_store::{StoreError, VersionRecord, WorkflowStore, WorkflowTxn};
use countersign_types::{ArtifactId, ReviewRole};

/// Default bound on sequence-allocation retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Allocates `(artifact, role)` sequence numbers atomically with the
/// commit that claims them.
#[derive(Clone, Copy, Debug)]
pub struct VersionSequencer {
    max_attempts: u32,
}

impl VersionSequencer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Derive the next sequence, build the transaction for it, and commit.
    ///
    /// A concurrent submission that claims the same number surfaces as a
    /// store conflict; the sequence is then recomputed fresh and the build
    /// closure invoked again. After `max_attempts` lost races the call
    /// escalates as [`WorkflowError::Unavailable`] — conflicts themselves
    /// are never reported to callers.
    pub async fn commit_next<F>(
        &self,
        store: &dyn WorkflowStore,
        artifact: &ArtifactId,
        role: ReviewRole,
        build: F,
    ) -> WorkflowResult<VersionRecord>
    where
        F: Fn(u32) -> WorkflowTxn + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let sequence = store.next_sequence(artifact, role).await?;
            match store.commit(build(sequence)).await {
                Ok(record) => return Ok(record),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(
                        artifact = %artifact,
                        role = %role,
                        sequence,
                        attempt,
                        %reason,
                        "sequence contention, retrying with a fresh number"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(WorkflowError::Unavailable {
            attempts: self.max_attempts,
        })
    }
}

impl Default for VersionSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use countersign_store::{
        Artifact, InMemoryWorkflowStore, StoreResult, VersionRecord, WorkflowStore, WorkflowTxn,
    };
    use countersign_types::{
        ActorId, ArtifactKind, ArtifactSlug, SnapshotPayload, VersionLabel,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Store wrapper that lets a competing writer claim the sequence just
    /// before the first N commits, simulating lost races.
    struct RacingStore {
        inner: InMemoryWorkflowStore,
        races_left: AtomicU32,
    }

    impl RacingStore {
        fn new(races: u32) -> Self {
            Self {
                inner: InMemoryWorkflowStore::new(),
                races_left: AtomicU32::new(races),
            }
        }
    }

    #[async_trait]
    impl WorkflowStore for RacingStore {
        async fn put_artifact(&self, artifact: Artifact) -> StoreResult<()> {
            self.inner.put_artifact(artifact).await
        }

        async fn get_artifact(
            &self,
            id: &ArtifactId,
        ) -> StoreResult<Option<Artifact>> {
            self.inner.get_artifact(id).await
        }

        async fn children_of(&self, parent: &ArtifactId) -> StoreResult<Vec<Artifact>> {
            self.inner.children_of(parent).await
        }

        async fn active_siblings(
            &self,
            kind: ArtifactKind,
            slug: &ArtifactSlug,
            except: &ArtifactId,
        ) -> StoreResult<Vec<Artifact>> {
            self.inner.active_siblings(kind, slug, except).await
        }

        async fn next_sequence(
            &self,
            artifact: &ArtifactId,
            role: ReviewRole,
        ) -> StoreResult<u32> {
            self.inner.next_sequence(artifact, role).await
        }

        async fn list_versions(&self, artifact: &ArtifactId) -> StoreResult<Vec<VersionRecord>> {
            self.inner.list_versions(artifact).await
        }

        async fn get_version(
            &self,
            artifact: &ArtifactId,
            label: VersionLabel,
        ) -> StoreResult<VersionRecord> {
            self.inner.get_version(artifact, label).await
        }

        async fn commit(&self, txn: WorkflowTxn) -> StoreResult<VersionRecord> {
            let racing = self
                .races_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if racing {
                // A competitor lands the same label first.
                let competitor = VersionRecord::submitted(
                    txn.record.artifact_id.clone(),
                    txn.record.kind,
                    txn.record.label.sequence,
                    SnapshotPayload::new("competitor", ""),
                    ActorId::new("rival"),
                );
                self.inner.commit(WorkflowTxn::new(competitor)).await?;
            }
            self.inner.commit(txn).await
        }
    }

    fn policy_artifact() -> Artifact {
        Artifact::new(
            ArtifactId::new("p1"),
            ArtifactKind::Policy,
            ArtifactSlug::new("data-retention"),
            "Data Retention",
        )
    }

    fn build_submission(artifact: &ArtifactId) -> impl Fn(u32) -> WorkflowTxn + Send + Sync + '_ {
        move |sequence| {
            WorkflowTxn::new(VersionRecord::submitted(
                artifact.clone(),
                ArtifactKind::Policy,
                sequence,
                SnapshotPayload::new("Data Retention", "keep less"),
                ActorId::new("author"),
            ))
        }
    }

    #[tokio::test]
    async fn lost_race_retries_with_fresh_sequence() {
        let store = RacingStore::new(1);
        let artifact = policy_artifact();
        store.put_artifact(artifact.clone()).await.unwrap();

        let record = VersionSequencer::default()
            .commit_next(
                &store,
                &artifact.id,
                ReviewRole::Submitter,
                build_submission(&artifact.id),
            )
            .await
            .unwrap();

        // The competitor took sequence 1; the retry re-derived 2.
        assert_eq!(record.label, VersionLabel::submitted(2));

        let versions = store.list_versions(&artifact.id).await.unwrap();
        let mut sequences: Vec<u32> = versions.iter().map(|r| r.label.sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn sustained_contention_escalates_as_unavailable() {
        let store = RacingStore::new(u32::MAX);
        let artifact = policy_artifact();
        store.put_artifact(artifact.clone()).await.unwrap();

        let error = VersionSequencer::new(3)
            .commit_next(
                &store,
                &artifact.id,
                ReviewRole::Submitter,
                build_submission(&artifact.id),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            WorkflowError::Unavailable { attempts: 3 }
        ));
    }
}
