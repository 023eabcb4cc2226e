//! Identifiers for artifacts, actors, and version records.

use serde::{Deserialize, Serialize};

/// The kind of a document node under workflow control.
///
/// Frameworks, policies, and audits carry their own version history and can
/// be submitted for review. Sub-policies and findings exist only as
/// structural children: they are versioned through their parent's snapshots
/// and their live status is driven by the parent's approval cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    Framework,
    Policy,
    SubPolicy,
    Audit,
    Finding,
}

impl ArtifactKind {
    /// Whether this kind accepts Submit/Review/Resubmit calls directly.
    pub fn supports_review(self) -> bool {
        matches!(self, Self::Framework | Self::Policy | Self::Audit)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Framework => "framework",
            Self::Policy => "policy",
            Self::SubPolicy => "sub-policy",
            Self::Audit => "audit",
            Self::Finding => "finding",
        };
        write!(f, "{name}")
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Stable identity of one artifact row (a framework, policy, audit,
    /// or one of their structural children).
    ArtifactId
}

string_id! {
    /// Identity of a human actor (submitter, auditor, or reviewer).
    ///
    /// Resolution from names to ids is owned by the user-directory
    /// collaborator; the workflow core only records them.
    ActorId
}

string_id! {
    /// Unique id of one immutable version record.
    VersionRecordId
}

/// Human-meaningful identifier shared by every incarnation of a logical
/// artifact. Approving a re-created "new version" row supersedes the prior
/// active row carrying the same slug.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactSlug(pub String);

impl ArtifactSlug {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
