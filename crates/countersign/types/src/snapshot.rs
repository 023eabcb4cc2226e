//! Snapshot payloads: the full structured copy of an artifact and its
//! children taken at submission or review time.
//!
//! Payloads are validated once, when they enter the system through Submit
//! or Resubmit, rather than trusting caller-supplied structure. After that
//! they are opaque to storage and only interpreted by the approval cascade.

use crate::decision::ApprovalDecision;
use crate::ids::ArtifactId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Maximum nesting depth of the child tree. The deepest real hierarchy is
/// framework -> policy -> sub-policy.
pub const MAX_CHILD_DEPTH: usize = 3;

/// Validation failures for caller-supplied payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload title must not be empty")]
    EmptyTitle,

    #[error("child {0} has an empty name")]
    EmptyChildName(ArtifactId),

    #[error("duplicate child id {0} in payload")]
    DuplicateChild(ArtifactId),

    #[error("child tree exceeds maximum depth of {MAX_CHILD_DEPTH}")]
    TooDeep,

    #[error("no child with id {0} in the current submission")]
    UnknownChild(ArtifactId),
}

/// Reviewer verdict and commentary on one child item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildApproval {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub remarks: String,
}

/// One child item inside a snapshot (a policy under a framework, a
/// sub-policy under a policy, a finding under an audit).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSnapshot {
    pub child_id: ArtifactId,
    pub name: String,
    #[serde(default)]
    pub approval: ChildApproval,
    /// Opaque body of the child document at snapshot time.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub children: Vec<ChildSnapshot>,
}

impl ChildSnapshot {
    pub fn new(child_id: ArtifactId, name: impl Into<String>) -> Self {
        Self {
            child_id,
            name: name.into(),
            approval: ChildApproval::default(),
            content: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ChildSnapshot) -> Self {
        self.children.push(child);
        self
    }
}

/// Per-child verdict passed to Review, matched against the current
/// submission's child tree by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildReviewDecision {
    pub child_id: ArtifactId,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub remarks: String,
}

/// Full point-in-time copy of an artifact and its children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Opaque body of the artifact document itself.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub children: Vec<ChildSnapshot>,
}

impl SnapshotPayload {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            content: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_child(mut self, child: ChildSnapshot) -> Self {
        self.children.push(child);
        self
    }

    /// Structural validation applied when a payload enters the system.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.title.trim().is_empty() {
            return Err(PayloadError::EmptyTitle);
        }

        let mut seen = HashSet::new();
        let mut stack: Vec<(&ChildSnapshot, usize)> =
            self.children.iter().map(|c| (c, 1)).collect();

        while let Some((child, depth)) = stack.pop() {
            if depth > MAX_CHILD_DEPTH {
                return Err(PayloadError::TooDeep);
            }
            if child.name.trim().is_empty() {
                return Err(PayloadError::EmptyChildName(child.child_id.clone()));
            }
            if !seen.insert(child.child_id.clone()) {
                return Err(PayloadError::DuplicateChild(child.child_id.clone()));
            }
            stack.extend(child.children.iter().map(|c| (c, depth + 1)));
        }

        Ok(())
    }

    /// Return every child approval to Pending and clear reviewer remarks.
    /// Applied on Submit and Resubmit so each review round starts clean.
    pub fn reset_decisions(&mut self) {
        fn reset(children: &mut [ChildSnapshot]) {
            for child in children {
                child.approval = ChildApproval::default();
                reset(&mut child.children);
            }
        }
        reset(&mut self.children);
    }

    /// Overlay reviewer verdicts onto the child tree, matching by id at any
    /// depth. Fails on ids that do not exist in this snapshot.
    pub fn apply_decisions(
        &mut self,
        decisions: &[ChildReviewDecision],
    ) -> Result<(), PayloadError> {
        for verdict in decisions {
            if !apply_one(&mut self.children, verdict) {
                return Err(PayloadError::UnknownChild(verdict.child_id.clone()));
            }
        }
        Ok(())
    }

    /// Iterate the whole child tree depth-first.
    pub fn walk_children(&self) -> impl Iterator<Item = &ChildSnapshot> {
        let mut stack: Vec<&ChildSnapshot> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.children.iter().rev());
            Some(next)
        })
    }
}

fn apply_one(children: &mut [ChildSnapshot], verdict: &ChildReviewDecision) -> bool {
    for child in children {
        if child.child_id == verdict.child_id {
            child.approval = ChildApproval {
                decision: verdict.decision,
                remarks: verdict.remarks.clone(),
            };
            return true;
        }
        if apply_one(&mut child.children, verdict) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with_tree() -> SnapshotPayload {
        SnapshotPayload::new("Access Control", "controls for account access").with_child(
            ChildSnapshot::new(ArtifactId::new("pol-1"), "Password Policy").with_child(
                ChildSnapshot::new(ArtifactId::new("sub-1"), "Rotation Schedule"),
            ),
        )
    }

    #[test]
    fn empty_title_is_rejected() {
        let payload = SnapshotPayload::new("  ", "whatever");
        assert_eq!(payload.validate(), Err(PayloadError::EmptyTitle));
    }

    #[test]
    fn duplicate_child_ids_are_rejected() {
        let payload = SnapshotPayload::new("t", "s")
            .with_child(ChildSnapshot::new(ArtifactId::new("c1"), "one"))
            .with_child(ChildSnapshot::new(ArtifactId::new("c1"), "two"));
        assert_eq!(
            payload.validate(),
            Err(PayloadError::DuplicateChild(ArtifactId::new("c1")))
        );
    }

    #[test]
    fn overly_deep_trees_are_rejected() {
        let leaf = ChildSnapshot::new(ArtifactId::new("d4"), "leaf");
        let nested = ChildSnapshot::new(ArtifactId::new("d1"), "a").with_child(
            ChildSnapshot::new(ArtifactId::new("d2"), "b")
                .with_child(ChildSnapshot::new(ArtifactId::new("d3"), "c").with_child(leaf)),
        );
        let payload = SnapshotPayload::new("t", "s").with_child(nested);
        assert_eq!(payload.validate(), Err(PayloadError::TooDeep));
    }

    #[test]
    fn reset_clears_decisions_at_every_depth() {
        let mut payload = payload_with_tree();
        payload
            .apply_decisions(&[
                ChildReviewDecision {
                    child_id: ArtifactId::new("pol-1"),
                    decision: ApprovalDecision::Approved,
                    remarks: "fine".into(),
                },
                ChildReviewDecision {
                    child_id: ArtifactId::new("sub-1"),
                    decision: ApprovalDecision::Rejected,
                    remarks: "rotate faster".into(),
                },
            ])
            .unwrap();

        payload.reset_decisions();

        for child in payload.walk_children() {
            assert_eq!(child.approval.decision, ApprovalDecision::Pending);
            assert!(child.approval.remarks.is_empty());
        }
    }

    #[test]
    fn decisions_apply_to_nested_children() {
        let mut payload = payload_with_tree();
        payload
            .apply_decisions(&[ChildReviewDecision {
                child_id: ArtifactId::new("sub-1"),
                decision: ApprovalDecision::Approved,
                remarks: String::new(),
            }])
            .unwrap();

        let nested = &payload.children[0].children[0];
        assert_eq!(nested.approval.decision, ApprovalDecision::Approved);
    }

    #[test]
    fn unknown_child_id_is_an_error() {
        let mut payload = payload_with_tree();
        let result = payload.apply_decisions(&[ChildReviewDecision {
            child_id: ArtifactId::new("missing"),
            decision: ApprovalDecision::Approved,
            remarks: String::new(),
        }]);
        assert_eq!(
            result,
            Err(PayloadError::UnknownChild(ArtifactId::new("missing")))
        );
    }
}
