//! Live-projection status vocabulary.

use serde::{Deserialize, Serialize};

/// Review state of a live artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewStatus {
    #[default]
    UnderReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnderReview => "under review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Soft-delete toggle, orthogonal to review status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveState {
    Active,
    #[default]
    Inactive,
}

impl ActiveState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl std::fmt::Display for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        };
        write!(f, "{name}")
    }
}

/// Overall completion phase of an audit. An audit only completes when every
/// finding has been individually accepted; any rejection or undecided
/// finding keeps it in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditPhase {
    #[default]
    WorkInProgress,
    Completed,
}

impl std::fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::WorkInProgress => "work in progress",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}
