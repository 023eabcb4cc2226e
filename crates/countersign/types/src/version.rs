//! Structured version identity.
//!
//! A version is identified by `(role, sequence)` scoped to one artifact.
//! Sequences are positive integers assigned gaplessly per (artifact, role)
//! pair. The comparator below defines the total order used everywhere a
//! "latest version" is resolved; the rendered string form exists for
//! display only.

use crate::ids::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Who authored a version record.
///
/// The derived order (`Submitter < Reviewer`) is load-bearing: at equal
/// sequence numbers a reviewer record supersedes the submission it decided.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ReviewRole {
    Submitter,
    Reviewer,
}

impl ReviewRole {
    /// Display prefix character. Audits use auditor conventions (`A`/`R`),
    /// everything else uses `u`/`r`.
    pub fn prefix(self, kind: ArtifactKind) -> char {
        match (kind, self) {
            (ArtifactKind::Audit, Self::Submitter) => 'A',
            (ArtifactKind::Audit, Self::Reviewer) => 'R',
            (_, Self::Submitter) => 'u',
            (_, Self::Reviewer) => 'r',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for ReviewRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `(role, sequence)` identity of one version record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionLabel {
    pub role: ReviewRole,
    pub sequence: u32,
}

impl VersionLabel {
    pub fn new(role: ReviewRole, sequence: u32) -> Self {
        Self { role, sequence }
    }

    pub fn submitted(sequence: u32) -> Self {
        Self::new(ReviewRole::Submitter, sequence)
    }

    pub fn reviewed(sequence: u32) -> Self {
        Self::new(ReviewRole::Reviewer, sequence)
    }

    /// Human string form (`u3`, `r1`, `A2`, `R2`). Display only; labels are
    /// compared structurally, never through this rendering.
    pub fn render(self, kind: ArtifactKind) -> String {
        format!("{}{}", self.role.prefix(kind), self.sequence)
    }
}

impl Ord for VersionLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.role.cmp(&other.role))
    }
}

impl PartialOrd for VersionLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
