//! Resolution of the canonical "current" version.
//!
//! All records for an artifact are compared under the [`VersionLabel`]
//! total order: higher sequence wins, and at equal sequence a reviewer
//! record supersedes the submission it decided. Sequences are compared as
//! integers; the rendered string form plays no part here.

use crate::errors::{WorkflowError, WorkflowResult};
use countersign_store::VersionRecord;
use countersign_types::ReviewRole;

/// Stateless resolver over an artifact's version records.
pub struct VersionResolver;

impl VersionResolver {
    /// The canonical current record: the maximum under the label total
    /// order. `None` when no version exists yet.
    pub fn current(records: &[VersionRecord]) -> Option<&VersionRecord> {
        records.iter().max_by_key(|r| r.label)
    }

    /// The newest submitter-role record, if any.
    pub fn latest_submission(records: &[VersionRecord]) -> Option<&VersionRecord> {
        records
            .iter()
            .filter(|r| r.label.role == ReviewRole::Submitter)
            .max_by_key(|r| r.label.sequence)
    }

    /// Check that each role's sequences are exactly `{1..n}`: gapless,
    /// duplicate-free, starting at 1.
    pub fn validate_sequences(records: &[VersionRecord]) -> WorkflowResult<()> {
        for role in [ReviewRole::Submitter, ReviewRole::Reviewer] {
            let mut sequences: Vec<u32> = records
                .iter()
                .filter(|r| r.label.role == role)
                .map(|r| r.label.sequence)
                .collect();
            sequences.sort_unstable();

            for (index, sequence) in sequences.iter().enumerate() {
                let expected = (index + 1) as u32;
                if *sequence != expected {
                    return Err(WorkflowError::IntegrityViolation(format!(
                        "{role} sequences are not gapless: expected {expected}, found {sequence}"
                    )));
                }
            }
        }
        Ok(())
    }
}
