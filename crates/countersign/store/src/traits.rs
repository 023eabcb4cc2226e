use crate::model::{Artifact, VersionRecord, WorkflowTxn};
use crate::StoreResult;
use async_trait::async_trait;
use countersign_types::{ArtifactId, ArtifactKind, ArtifactSlug, ReviewRole, VersionLabel};

/// Storage interface for live artifact projections and their append-only
/// version history.
///
/// Implementations must guarantee:
/// - `(artifact_id, role, sequence)` is unique across all committed
///   records; a duplicate insert fails with a conflict and leaves nothing
///   applied
/// - `commit` is atomic: the guard checks, the record insert, and every
///   patch land together or not at all
/// - `next_sequence` observes all committed records at the time of the
///   call (callers re-derive it on conflict rather than reusing a stale
///   value)
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ── Live projections ─────────────────────────────────────────────

    /// Insert or replace a live artifact row. Used by the surrounding CRUD
    /// layer when documents are created; workflow transitions themselves
    /// only patch existing rows through `commit`.
    async fn put_artifact(&self, artifact: Artifact) -> StoreResult<()>;

    async fn get_artifact(&self, id: &ArtifactId) -> StoreResult<Option<Artifact>>;

    /// Direct children of an artifact, ordered by id.
    async fn children_of(&self, parent: &ArtifactId) -> StoreResult<Vec<Artifact>>;

    /// Active artifacts of the same kind sharing a slug, excluding one id.
    /// These are the prior incarnations an approval supersedes.
    async fn active_siblings(
        &self,
        kind: ArtifactKind,
        slug: &ArtifactSlug,
        except: &ArtifactId,
    ) -> StoreResult<Vec<Artifact>>;

    // ── Version records ──────────────────────────────────────────────

    /// The next unclaimed sequence for `(artifact, role)`, starting at 1.
    async fn next_sequence(&self, artifact: &ArtifactId, role: ReviewRole) -> StoreResult<u32>;

    /// All version records for an artifact, oldest first.
    async fn list_versions(&self, artifact: &ArtifactId) -> StoreResult<Vec<VersionRecord>>;

    /// One record by its `(artifact, role, sequence)` triple. Fails with
    /// NotFound when the triple does not exist.
    async fn get_version(
        &self,
        artifact: &ArtifactId,
        label: VersionLabel,
    ) -> StoreResult<VersionRecord>;

    // ── Transitions ──────────────────────────────────────────────────

    /// Atomically insert one version record and apply its live-projection
    /// patches. Returns the committed record.
    async fn commit(&self, txn: WorkflowTxn) -> StoreResult<VersionRecord>;
}
