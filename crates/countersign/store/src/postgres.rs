//! PostgreSQL adapter for the workflow store.
//!
//! The transactional source-of-truth backend. The unique index on
//! `(artifact_id, role_prefix, sequence)` is the arbiter of concurrent
//! sequence claims: the losing submitter gets a `Conflict` and the engine
//! retries with a freshly derived sequence. Every `commit` runs inside one
//! database transaction, so the version insert and all projection patches
//! become visible together.

use crate::model::{Artifact, VersionRecord, WorkflowTxn};
use crate::traits::WorkflowStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use countersign_types::{
    ActiveState, ActorId, ApprovalDecision, ArtifactId, ArtifactKind, ArtifactSlug, AuditPhase,
    ReviewRole, ReviewStatus, SnapshotPayload, VersionLabel, VersionRecordId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

/// PostgreSQL-backed workflow store.
#[derive(Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS countersign_artifacts (
                artifact_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent_id TEXT,
                status TEXT NOT NULL,
                active TEXT NOT NULL,
                phase TEXT,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS countersign_versions (
                record_id TEXT PRIMARY KEY,
                artifact_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                role_prefix TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                payload JSONB NOT NULL,
                author_id TEXT NOT NULL,
                reviewer_id TEXT,
                decision TEXT,
                decision_date TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (artifact_id, role_prefix, sequence)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS countersign_artifacts_parent_idx
                ON countersign_artifacts (parent_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS countersign_artifacts_slug_idx
                ON countersign_artifacts (kind, slug)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    async fn put_artifact(&self, artifact: Artifact) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO countersign_artifacts
                (artifact_id, kind, slug, name, description, parent_id, status, active, phase, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (artifact_id) DO UPDATE SET
                kind = EXCLUDED.kind,
                slug = EXCLUDED.slug,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                parent_id = EXCLUDED.parent_id,
                status = EXCLUDED.status,
                active = EXCLUDED.active,
                phase = EXCLUDED.phase,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(artifact.id.0.clone())
        .bind(kind_to_str(artifact.kind))
        .bind(artifact.slug.0.clone())
        .bind(artifact.name.clone())
        .bind(artifact.description.clone())
        .bind(artifact.parent.as_ref().map(|p| p.0.clone()))
        .bind(status_to_str(artifact.status))
        .bind(active_to_str(artifact.active))
        .bind(artifact.phase.map(phase_to_str))
        .bind(artifact.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_artifact(&self, id: &ArtifactId) -> StoreResult<Option<Artifact>> {
        let row = sqlx::query(
            "SELECT * FROM countersign_artifacts WHERE artifact_id = $1",
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(artifact_from_row).transpose()
    }

    async fn children_of(&self, parent: &ArtifactId) -> StoreResult<Vec<Artifact>> {
        let rows = sqlx::query(
            "SELECT * FROM countersign_artifacts WHERE parent_id = $1 ORDER BY artifact_id",
        )
        .bind(parent.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(artifact_from_row).collect()
    }

    async fn active_siblings(
        &self,
        kind: ArtifactKind,
        slug: &ArtifactSlug,
        except: &ArtifactId,
    ) -> StoreResult<Vec<Artifact>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM countersign_artifacts
             WHERE kind = $1 AND slug = $2 AND active = 'active' AND artifact_id <> $3
             ORDER BY artifact_id
            "#,
        )
        .bind(kind_to_str(kind))
        .bind(slug.0.clone())
        .bind(except.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(artifact_from_row).collect()
    }

    async fn next_sequence(&self, artifact: &ArtifactId, role: ReviewRole) -> StoreResult<u32> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sequence), 0) + 1 AS next
              FROM countersign_versions
             WHERE artifact_id = $1 AND role_prefix = $2
            "#,
        )
        .bind(artifact.0.clone())
        .bind(role_to_str(role))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let next: i64 = row
            .try_get("next")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        u32::try_from(next)
            .map_err(|_| StoreError::Backend(format!("sequence {next} out of range")))
    }

    async fn list_versions(&self, artifact: &ArtifactId) -> StoreResult<Vec<VersionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM countersign_versions
             WHERE artifact_id = $1
             ORDER BY created_at, sequence, role_prefix
            "#,
        )
        .bind(artifact.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(version_from_row).collect()
    }

    async fn get_version(
        &self,
        artifact: &ArtifactId,
        label: VersionLabel,
    ) -> StoreResult<VersionRecord> {
        let row = sqlx::query(
            r#"
            SELECT * FROM countersign_versions
             WHERE artifact_id = $1 AND role_prefix = $2 AND sequence = $3
            "#,
        )
        .bind(artifact.0.clone())
        .bind(role_to_str(label.role))
        .bind(i64::from(label.sequence))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => version_from_row(row),
            None => Err(StoreError::NotFound(format!(
                "version ({}, {}) of artifact {artifact}",
                label.role, label.sequence
            ))),
        }
    }

    async fn commit(&self, txn: WorkflowTxn) -> StoreResult<VersionRecord> {
        let record = txn.record;
        record
            .check_role_consistency()
            .map_err(StoreError::InvariantViolation)?;

        let payload = serde_json::to_value(&record.payload)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        for (id, expected) in &txn.guards {
            let row = sqlx::query(
                "SELECT status FROM countersign_artifacts WHERE artifact_id = $1 FOR UPDATE",
            )
            .bind(id.0.clone())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            let Some(row) = row else {
                return Err(StoreError::NotFound(format!(
                    "guarded artifact {id} not found"
                )));
            };
            let status = status_from_str(
                &row.try_get::<String, _>("status")
                    .map_err(|e| StoreError::Backend(e.to_string()))?,
            )?;
            if status != *expected {
                return Err(StoreError::InvariantViolation(format!(
                    "artifact {id} expected status {expected}, found {status}"
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO countersign_versions
                (record_id, artifact_id, kind, role_prefix, sequence, payload,
                 author_id, reviewer_id, decision, decision_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.record_id.0.clone())
        .bind(record.artifact_id.0.clone())
        .bind(kind_to_str(record.kind))
        .bind(role_to_str(record.label.role))
        .bind(i64::from(record.label.sequence))
        .bind(payload)
        .bind(record.author_id.0.clone())
        .bind(record.reviewer_id.as_ref().map(|r| r.0.clone()))
        .bind(record.decision.map(decision_to_str))
        .bind(record.decision_date)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let now = Utc::now();
        for (id, patch) in &txn.patches {
            let result = sqlx::query(
                r#"
                UPDATE countersign_artifacts
                   SET status = COALESCE($2, status),
                       active = COALESCE($3, active),
                       phase = COALESCE($4, phase),
                       name = COALESCE($5, name),
                       description = COALESCE($6, description),
                       updated_at = $7
                 WHERE artifact_id = $1
                "#,
            )
            .bind(id.0.clone())
            .bind(patch.status.map(status_to_str))
            .bind(patch.active.map(active_to_str))
            .bind(patch.phase.map(phase_to_str))
            .bind(patch.name.clone())
            .bind(patch.description.clone())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls everything back.
                return Err(StoreError::NotFound(format!(
                    "patch target artifact {id} not found"
                )));
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(record)
    }
}

// ── Row/enum mapping ─────────────────────────────────────────────────

fn artifact_from_row(row: PgRow) -> StoreResult<Artifact> {
    let backend = |e: sqlx::Error| StoreError::Backend(e.to_string());

    let kind = kind_from_str(&row.try_get::<String, _>("kind").map_err(backend)?)?;
    let status = status_from_str(&row.try_get::<String, _>("status").map_err(backend)?)?;
    let active = active_from_str(&row.try_get::<String, _>("active").map_err(backend)?)?;
    let phase = row
        .try_get::<Option<String>, _>("phase")
        .map_err(backend)?
        .map(|raw| phase_from_str(&raw))
        .transpose()?;

    Ok(Artifact {
        id: ArtifactId::new(row.try_get::<String, _>("artifact_id").map_err(backend)?),
        kind,
        slug: ArtifactSlug::new(row.try_get::<String, _>("slug").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        parent: row
            .try_get::<Option<String>, _>("parent_id")
            .map_err(backend)?
            .map(ArtifactId::new),
        status,
        active,
        phase,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(backend)?,
    })
}

fn version_from_row(row: PgRow) -> StoreResult<VersionRecord> {
    let backend = |e: sqlx::Error| StoreError::Backend(e.to_string());

    let kind = kind_from_str(&row.try_get::<String, _>("kind").map_err(backend)?)?;
    let role = role_from_str(&row.try_get::<String, _>("role_prefix").map_err(backend)?)?;
    let sequence: i64 = row.try_get("sequence").map_err(backend)?;
    let sequence = u32::try_from(sequence)
        .map_err(|_| StoreError::Serialization(format!("sequence {sequence} out of range")))?;

    let payload_json: serde_json::Value = row.try_get("payload").map_err(backend)?;
    let payload: SnapshotPayload = serde_json::from_value(payload_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let decision = row
        .try_get::<Option<String>, _>("decision")
        .map_err(backend)?
        .map(|raw| decision_from_str(&raw))
        .transpose()?;

    Ok(VersionRecord {
        record_id: VersionRecordId::new(row.try_get::<String, _>("record_id").map_err(backend)?),
        artifact_id: ArtifactId::new(row.try_get::<String, _>("artifact_id").map_err(backend)?),
        kind,
        label: VersionLabel::new(role, sequence),
        payload,
        author_id: ActorId::new(row.try_get::<String, _>("author_id").map_err(backend)?),
        reviewer_id: row
            .try_get::<Option<String>, _>("reviewer_id")
            .map_err(backend)?
            .map(ActorId::new),
        decision,
        decision_date: row
            .try_get::<Option<DateTime<Utc>>, _>("decision_date")
            .map_err(backend)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(backend)?,
    })
}

fn kind_to_str(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Framework => "framework",
        ArtifactKind::Policy => "policy",
        ArtifactKind::SubPolicy => "sub_policy",
        ArtifactKind::Audit => "audit",
        ArtifactKind::Finding => "finding",
    }
}

fn kind_from_str(raw: &str) -> StoreResult<ArtifactKind> {
    match raw {
        "framework" => Ok(ArtifactKind::Framework),
        "policy" => Ok(ArtifactKind::Policy),
        "sub_policy" => Ok(ArtifactKind::SubPolicy),
        "audit" => Ok(ArtifactKind::Audit),
        "finding" => Ok(ArtifactKind::Finding),
        _ => Err(StoreError::Serialization(format!(
            "unknown artifact kind `{raw}`"
        ))),
    }
}

fn role_to_str(role: ReviewRole) -> &'static str {
    match role {
        ReviewRole::Submitter => "submitter",
        ReviewRole::Reviewer => "reviewer",
    }
}

fn role_from_str(raw: &str) -> StoreResult<ReviewRole> {
    match raw {
        "submitter" => Ok(ReviewRole::Submitter),
        "reviewer" => Ok(ReviewRole::Reviewer),
        _ => Err(StoreError::Serialization(format!(
            "unknown review role `{raw}`"
        ))),
    }
}

fn status_to_str(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::UnderReview => "under_review",
        ReviewStatus::Approved => "approved",
        ReviewStatus::Rejected => "rejected",
    }
}

fn status_from_str(raw: &str) -> StoreResult<ReviewStatus> {
    match raw {
        "under_review" => Ok(ReviewStatus::UnderReview),
        "approved" => Ok(ReviewStatus::Approved),
        "rejected" => Ok(ReviewStatus::Rejected),
        _ => Err(StoreError::Serialization(format!(
            "unknown review status `{raw}`"
        ))),
    }
}

fn active_to_str(active: ActiveState) -> &'static str {
    match active {
        ActiveState::Active => "active",
        ActiveState::Inactive => "inactive",
    }
}

fn active_from_str(raw: &str) -> StoreResult<ActiveState> {
    match raw {
        "active" => Ok(ActiveState::Active),
        "inactive" => Ok(ActiveState::Inactive),
        _ => Err(StoreError::Serialization(format!(
            "unknown active state `{raw}`"
        ))),
    }
}

fn phase_to_str(phase: AuditPhase) -> &'static str {
    match phase {
        AuditPhase::WorkInProgress => "work_in_progress",
        AuditPhase::Completed => "completed",
    }
}

fn phase_from_str(raw: &str) -> StoreResult<AuditPhase> {
    match raw {
        "work_in_progress" => Ok(AuditPhase::WorkInProgress),
        "completed" => Ok(AuditPhase::Completed),
        _ => Err(StoreError::Serialization(format!(
            "unknown audit phase `{raw}`"
        ))),
    }
}

fn decision_to_str(decision: ApprovalDecision) -> &'static str {
    decision.as_str()
}

fn decision_from_str(raw: &str) -> StoreResult<ApprovalDecision> {
    match raw {
        "pending" => Ok(ApprovalDecision::Pending),
        "approved" => Ok(ApprovalDecision::Approved),
        "rejected" => Ok(ApprovalDecision::Rejected),
        _ => Err(StoreError::Serialization(format!(
            "unknown decision `{raw}`"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}
