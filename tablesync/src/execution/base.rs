use std::fmt;
use std::future::Future;

use crate::error::SyncResult;
use crate::plan::ReconciliationPlan;

/// Rows changed by one reconciliation.
///
/// Backends that run separate statements report a per-kind breakdown. A single `merge`
/// statement only reports the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    inserted: Option<u64>,
    updated: Option<u64>,
    deleted: Option<u64>,
    total: u64,
}

impl RowCounts {
    pub fn per_kind(inserted: u64, updated: u64, deleted: u64) -> Self {
        Self {
            inserted: Some(inserted),
            updated: Some(updated),
            deleted: Some(deleted),
            total: inserted + updated + deleted,
        }
    }

    pub fn total_only(total: u64) -> Self {
        Self {
            inserted: None,
            updated: None,
            deleted: None,
            total,
        }
    }

    pub fn zero() -> Self {
        Self::per_kind(0, 0, 0)
    }

    pub fn inserted(&self) -> Option<u64> {
        self.inserted
    }

    pub fn updated(&self) -> Option<u64> {
        self.updated
    }

    pub fn deleted(&self) -> Option<u64> {
        self.deleted
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn has_breakdown(&self) -> bool {
        self.inserted.is_some()
    }
}

impl fmt::Display for RowCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.inserted, self.updated, self.deleted) {
            (Some(inserted), Some(updated), Some(deleted)) => write!(
                f,
                "{} (inserted: {inserted}, updated: {updated}, deleted: {deleted})",
                self.total
            ),
            _ => write!(f, "{}", self.total),
        }
    }
}

/// Database a reconciliation plan is applied to.
///
/// An implementation owns the transaction boundary: every statement of one `apply` call
/// commits together or not at all. Transactions are never shared between calls, so
/// concurrent calls for different target tables are independent.
pub trait TargetBackend {
    /// Applies `plan` atomically and returns the rows it changed.
    ///
    /// When the returned future is dropped before completion, nothing must be committed.
    fn apply(
        &self,
        plan: &ReconciliationPlan,
    ) -> impl Future<Output = SyncResult<RowCounts>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_kind_counts_sum_to_total() {
        let counts = RowCounts::per_kind(2, 3, 1);

        assert_eq!(counts.total(), 6);
        assert!(counts.has_breakdown());
        assert_eq!(
            counts.to_string(),
            "6 (inserted: 2, updated: 3, deleted: 1)"
        );
    }

    #[test]
    fn total_only_counts_have_no_breakdown() {
        let counts = RowCounts::total_only(4);

        assert_eq!(counts.inserted(), None);
        assert!(!counts.has_breakdown());
        assert_eq!(counts.to_string(), "4");
    }
}
