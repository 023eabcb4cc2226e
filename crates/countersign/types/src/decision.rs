//! Reviewer decisions.

use serde::{Deserialize, Serialize};

/// Tri-state verdict attached to version records and, granularly, to each
/// child item inside a snapshot payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalDecision {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn is_pending(self) -> bool {
        self == Self::Pending
    }

    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }

    pub fn is_rejected(self) -> bool {
        self == Self::Rejected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
