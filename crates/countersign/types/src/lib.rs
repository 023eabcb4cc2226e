//! Countersign domain types.
//!
//! This crate defines the vocabulary shared by the workflow store, engine,
//! and service layers:
//!
//! - artifact identity: [`ArtifactId`], [`ArtifactSlug`], [`ArtifactKind`]
//! - structured version identity: [`VersionLabel`] — a `(role, sequence)`
//!   pair with a total order and a display-only string rendering
//! - review vocabulary: [`ApprovalDecision`], [`ReviewStatus`],
//!   [`ActiveState`], [`AuditPhase`]
//! - the versioned document body: [`SnapshotPayload`] and its per-child
//!   approval sub-structures
//!
//! Version identity is deliberately structured. The human-facing strings
//! (`u3`, `r1`, `A2`) are produced by [`VersionLabel::render`] for display
//! and never parsed or compared anywhere in the system.

#![deny(unsafe_code)]

pub mod decision;
pub mod ids;
pub mod snapshot;
pub mod status;
pub mod version;

pub use decision::ApprovalDecision;
pub use ids::{ActorId, ArtifactId, ArtifactKind, ArtifactSlug, VersionRecordId};
pub use snapshot::{
    ChildApproval, ChildReviewDecision, ChildSnapshot, PayloadError, SnapshotPayload,
};
pub use status::{ActiveState, AuditPhase, ReviewStatus};
pub use version::{ReviewRole, VersionLabel};
