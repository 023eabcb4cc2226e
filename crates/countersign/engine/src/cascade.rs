//! Status propagation across the artifact hierarchy.
//!
//! Approval, rejection, and deactivation are planned here as lists of
//! projection patches and applied by the caller's single commit, so a
//! cascade is always all-or-nothing. Deactivation walks the full subtree,
//! never just one level: a child must not stay active under an inactive
//! parent.

use crate::errors::WorkflowResult;
use countersign_store::{Artifact, ArtifactPatch, WorkflowStore};
use countersign_types::{
    ApprovalDecision, ArtifactId, ArtifactKind, AuditPhase, ChildSnapshot, ReviewStatus,
    SnapshotPayload,
};

/// Planner for hierarchy-wide status changes.
pub struct CascadeEngine;

impl CascadeEngine {
    /// Plan the patches for approving `artifact` with the given reviewed
    /// payload.
    ///
    /// Children still under review whose payload decision is Approved
    /// become approved and active, recursively through their own approved
    /// subtrees. A child marked Rejected stays rejected, is not activated,
    /// and its subtree is left exactly as it was. Undecided children are
    /// untouched.
    ///
    /// For audits the payload children are findings: each is accepted or
    /// rejected individually, and the audit completes only when every
    /// finding was accepted — a partial approval leaves it in progress.
    pub async fn on_approve(
        store: &dyn WorkflowStore,
        artifact: &Artifact,
        payload: &SnapshotPayload,
    ) -> WorkflowResult<Vec<(ArtifactId, ArtifactPatch)>> {
        let parent_patch = match artifact.kind {
            ArtifactKind::Audit => {
                let all_accepted = payload
                    .children
                    .iter()
                    .all(|finding| finding.approval.decision.is_approved());
                let phase = if all_accepted {
                    AuditPhase::Completed
                } else {
                    AuditPhase::WorkInProgress
                };
                ArtifactPatch::approve().with_phase(phase)
            }
            _ => ArtifactPatch::approve(),
        };

        let mut patches = vec![(artifact.id.clone(), parent_patch)];
        let mut stack: Vec<&ChildSnapshot> = payload.children.iter().collect();

        while let Some(child) = stack.pop() {
            let Some(row) = store.get_artifact(&child.child_id).await? else {
                tracing::warn!(
                    child = %child.child_id,
                    artifact = %artifact.id,
                    "snapshot child has no live row, skipping"
                );
                continue;
            };

            match child.approval.decision {
                ApprovalDecision::Approved => {
                    if row.status == ReviewStatus::UnderReview {
                        patches.push((row.id.clone(), ArtifactPatch::approve()));
                    }
                    stack.extend(child.children.iter());
                }
                ApprovalDecision::Rejected => {
                    if row.status != ReviewStatus::Rejected {
                        patches.push((row.id, ArtifactPatch::status(ReviewStatus::Rejected)));
                    }
                    // The rejected child's subtree stays as it was.
                }
                ApprovalDecision::Pending => {}
            }
        }

        Ok(patches)
    }

    /// Plan the patches for rejecting `artifact`. Children are untouched;
    /// the document stays editable by its submitter.
    pub fn on_reject(artifact: &Artifact) -> Vec<(ArtifactId, ArtifactPatch)> {
        vec![(
            artifact.id.clone(),
            ArtifactPatch::status(ReviewStatus::Rejected),
        )]
    }

    /// Plan deactivation of `root` and every descendant. Full-tree walk:
    /// the patches must be applied in one commit so no child is left
    /// active under an inactive parent.
    pub async fn on_deactivate(
        store: &dyn WorkflowStore,
        root: &ArtifactId,
    ) -> WorkflowResult<Vec<(ArtifactId, ArtifactPatch)>> {
        let mut patches = vec![(root.clone(), ArtifactPatch::deactivate())];
        let mut queue = vec![root.clone()];

        while let Some(next) = queue.pop() {
            for child in store.children_of(&next).await? {
                queue.push(child.id.clone());
                patches.push((child.id, ArtifactPatch::deactivate()));
            }
        }

        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countersign_store::InMemoryWorkflowStore;
    use countersign_types::{ActiveState, ArtifactSlug, ChildApproval};

    fn artifact(id: &str, kind: ArtifactKind, slug: &str) -> Artifact {
        Artifact::new(
            ArtifactId::new(id),
            kind,
            ArtifactSlug::new(slug),
            id.to_string(),
        )
    }

    fn decided_child(id: &str, decision: ApprovalDecision) -> ChildSnapshot {
        let mut child = ChildSnapshot::new(ArtifactId::new(id), id.to_string());
        child.approval = ChildApproval {
            decision,
            remarks: String::new(),
        };
        child
    }

    async fn seed_framework_tree(store: &InMemoryWorkflowStore) {
        let framework = artifact("fw", ArtifactKind::Framework, "iso-27001");
        let pol_x = artifact("pol-x", ArtifactKind::Policy, "access").with_parent(framework.id.clone());
        let pol_y = artifact("pol-y", ArtifactKind::Policy, "retention").with_parent(framework.id.clone());
        let sub_y = artifact("sub-y", ArtifactKind::SubPolicy, "retention-logs")
            .with_parent(pol_y.id.clone());

        for a in [framework, pol_x, pol_y, sub_y] {
            store.put_artifact(a).await.unwrap();
        }
    }

    #[tokio::test]
    async fn approved_children_activate_and_rejected_stay_rejected() {
        let store = InMemoryWorkflowStore::new();
        seed_framework_tree(&store).await;

        let framework = store
            .get_artifact(&ArtifactId::new("fw"))
            .await
            .unwrap()
            .unwrap();
        let payload = SnapshotPayload::new("ISO 27001", "controls")
            .with_child(decided_child("pol-x", ApprovalDecision::Approved))
            .with_child(decided_child("pol-y", ApprovalDecision::Rejected));

        let patches = CascadeEngine::on_approve(&store, &framework, &payload)
            .await
            .unwrap();

        let patch_for = |id: &str| {
            patches
                .iter()
                .find(|(target, _)| target == &ArtifactId::new(id))
                .map(|(_, patch)| patch.clone())
        };

        assert_eq!(patch_for("fw"), Some(ArtifactPatch::approve()));
        assert_eq!(patch_for("pol-x"), Some(ArtifactPatch::approve()));
        assert_eq!(
            patch_for("pol-y"),
            Some(ArtifactPatch::status(ReviewStatus::Rejected))
        );
        // The rejected child's sub-policy is not touched at all.
        assert_eq!(patch_for("sub-y"), None);
    }

    #[tokio::test]
    async fn approved_subtree_cascades_through_nested_children() {
        let store = InMemoryWorkflowStore::new();
        seed_framework_tree(&store).await;

        let framework = store
            .get_artifact(&ArtifactId::new("fw"))
            .await
            .unwrap()
            .unwrap();
        let nested = decided_child("pol-y", ApprovalDecision::Approved)
            .with_child(decided_child("sub-y", ApprovalDecision::Approved));
        let payload = SnapshotPayload::new("ISO 27001", "controls").with_child(nested);

        let patches = CascadeEngine::on_approve(&store, &framework, &payload)
            .await
            .unwrap();

        assert!(patches
            .iter()
            .any(|(id, patch)| id == &ArtifactId::new("sub-y") && *patch == ArtifactPatch::approve()));
    }

    #[tokio::test]
    async fn partially_rejected_audit_stays_in_progress() {
        let store = InMemoryWorkflowStore::new();
        let audit = artifact("audit-1", ArtifactKind::Audit, "q3-audit");
        store.put_artifact(audit.clone()).await.unwrap();
        for i in 1..=5 {
            store
                .put_artifact(
                    artifact(&format!("f{i}"), ArtifactKind::Finding, &format!("f{i}"))
                        .with_parent(audit.id.clone()),
                )
                .await
                .unwrap();
        }

        let mut payload = SnapshotPayload::new("Q3 Audit", "annual");
        for i in 1..=4 {
            payload = payload.with_child(decided_child(&format!("f{i}"), ApprovalDecision::Approved));
        }
        payload = payload.with_child(decided_child("f5", ApprovalDecision::Rejected));

        let patches = CascadeEngine::on_approve(&store, &audit, &payload)
            .await
            .unwrap();

        let audit_patch = &patches
            .iter()
            .find(|(id, _)| id == &audit.id)
            .unwrap()
            .1;
        assert_eq!(audit_patch.phase, Some(AuditPhase::WorkInProgress));
    }

    #[tokio::test]
    async fn fully_accepted_audit_completes() {
        let store = InMemoryWorkflowStore::new();
        let audit = artifact("audit-1", ArtifactKind::Audit, "q3-audit");
        store.put_artifact(audit.clone()).await.unwrap();
        store
            .put_artifact(artifact("f1", ArtifactKind::Finding, "f1").with_parent(audit.id.clone()))
            .await
            .unwrap();

        let payload = SnapshotPayload::new("Q3 Audit", "annual")
            .with_child(decided_child("f1", ApprovalDecision::Approved));

        let patches = CascadeEngine::on_approve(&store, &audit, &payload)
            .await
            .unwrap();

        let audit_patch = &patches
            .iter()
            .find(|(id, _)| id == &audit.id)
            .unwrap()
            .1;
        assert_eq!(audit_patch.phase, Some(AuditPhase::Completed));
    }

    #[tokio::test]
    async fn deactivation_covers_the_full_tree() {
        let store = InMemoryWorkflowStore::new();
        seed_framework_tree(&store).await;

        let patches = CascadeEngine::on_deactivate(&store, &ArtifactId::new("fw"))
            .await
            .unwrap();

        let mut targets: Vec<String> = patches.iter().map(|(id, _)| id.0.clone()).collect();
        targets.sort();
        assert_eq!(targets, vec!["fw", "pol-x", "pol-y", "sub-y"]);
        assert!(patches
            .iter()
            .all(|(_, patch)| patch.active == Some(ActiveState::Inactive)));
    }
}
