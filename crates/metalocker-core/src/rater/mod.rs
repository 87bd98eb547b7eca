//! PRV21 revision rater (spec.md §4.7): per-variant head tracking as the
//! index updater replays records in block order.
//!
//! A variant is a dataset's `SpecializationOf ?? ID`; every record sharing
//! that key is one of its revisions. The rater decides, purely from
//! `(revisionNumber, generatedAt)` pairs and the block each revision
//! became effective at, which revision is currently the head and which
//! blocks each past revision held it for.
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::errors::{Error, NotFoundKind, Result};

/// Sentinel for "not a head at any block" / "still the head" (spec.md
/// §4.7). Block numbers are always `>= 0`, so `-1` cannot collide with one.
pub const NO_BLOCK_NUMBER: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionStatus {
    Published,
    Revoked,
}

#[derive(Clone, Debug)]
pub struct Revision {
    pub record_id: String,
    pub revision_number: u64,
    pub created_at: DateTime<Utc>,
    pub head_from: i64,
    pub head_to: i64,
    pub status: RevisionStatus,
}

impl Revision {
    /// A revision is currently the head iff it has ever been one
    /// (`head_from` set) and has not since been superseded
    /// (`head_to` still [`NO_BLOCK_NUMBER`]).
    pub fn is_current_head(&self) -> bool {
        self.head_from != NO_BLOCK_NUMBER && self.head_to == NO_BLOCK_NUMBER
    }

    pub fn is_orphan(&self) -> bool {
        self.head_from == NO_BLOCK_NUMBER
    }

    pub fn covers_block(&self, block: i64) -> bool {
        if self.is_orphan() {
            return false;
        }
        let to = if self.head_to == NO_BLOCK_NUMBER { i64::MAX } else { self.head_to };
        self.head_from <= block && block <= to
    }
}

/// The input a new ledger record contributes to the rater (spec.md §4.7
/// `AddRevision`).
pub struct DatasetRevision {
    pub record_id: String,
    pub variant_id: String,
    pub revision_number: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Default)]
struct VariantHistory {
    head: Option<String>,
    revisions: HashMap<String, Revision>,
}

/// Per-variant state is independent; the rater only ever needs a lock
/// (spec.md §5) per variant, not globally, so this type is safe to wrap in
/// a `Mutex<HashMap<..>>` keyed by variant at the call site without
/// serializing unrelated variants.
#[derive(Default)]
pub struct RevisionRater {
    variants: HashMap<String, VariantHistory>,
}

impl RevisionRater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly-discovered revision at block `eff`. Returns `true`
    /// iff this is the variant's very first known revision.
    pub fn add_revision(&mut self, ds: DatasetRevision, eff: i64) -> bool {
        let history = self.variants.entry(ds.variant_id.clone()).or_default();

        let Some(current_id) = history.head.clone() else {
            history.revisions.insert(
                ds.record_id.clone(),
                Revision {
                    record_id: ds.record_id.clone(),
                    revision_number: ds.revision_number,
                    created_at: ds.generated_at,
                    head_from: eff,
                    head_to: NO_BLOCK_NUMBER,
                    status: RevisionStatus::Published,
                },
            );
            history.head = Some(ds.record_id);
            return true;
        };

        let current = history.revisions.get(&current_id).expect("head always has a revision entry");
        let is_new_head = ds.revision_number > current.revision_number
            || (ds.revision_number == current.revision_number && ds.generated_at > current.created_at);

        if is_new_head {
            let current = history.revisions.get_mut(&current_id).expect("checked above");
            current.head_to = eff - 1;
            history.revisions.insert(
                ds.record_id.clone(),
                Revision {
                    record_id: ds.record_id.clone(),
                    revision_number: ds.revision_number,
                    created_at: ds.generated_at,
                    head_from: eff,
                    head_to: NO_BLOCK_NUMBER,
                    status: RevisionStatus::Published,
                },
            );
            history.head = Some(ds.record_id);
        } else {
            history.revisions.insert(
                ds.record_id.clone(),
                Revision {
                    record_id: ds.record_id.clone(),
                    revision_number: ds.revision_number,
                    created_at: ds.generated_at,
                    head_from: NO_BLOCK_NUMBER,
                    head_to: NO_BLOCK_NUMBER,
                    status: RevisionStatus::Published,
                },
            );
        }

        false
    }

    /// Marks `record_id` revoked, closing the gap it leaves in the head
    /// timeline if it was ever the head (spec.md §4.7 `AddRevocation`).
    pub fn add_revocation(&mut self, variant_id: &str, record_id: &str) -> Result<()> {
        let history = self
            .variants
            .get_mut(variant_id)
            .ok_or_else(|| Error::not_found(NotFoundKind::Revision, variant_id))?;

        let (head_from, head_to) = {
            let rev = history
                .revisions
                .get(record_id)
                .ok_or_else(|| Error::not_found(NotFoundKind::Revision, record_id))?;
            (rev.head_from, rev.head_to)
        };

        if head_from != NO_BLOCK_NUMBER {
            if let Some(previous_id) = history
                .revisions
                .values()
                .find(|r| r.head_to == head_from - 1)
                .map(|r| r.record_id.clone())
            {
                let was_current_head = history.head.as_deref() == Some(record_id);
                let previous = history.revisions.get_mut(&previous_id).expect("looked up above");
                previous.head_to = head_to;
                if was_current_head {
                    history.head = Some(previous_id);
                }
            }
        }

        history
            .revisions
            .get_mut(record_id)
            .expect("checked above")
            .status = RevisionStatus::Revoked;
        Ok(())
    }

    pub fn head(&self, variant_id: &str) -> Option<&Revision> {
        let history = self.variants.get(variant_id)?;
        history.head.as_ref().and_then(|id| history.revisions.get(id))
    }

    /// The revision that was head at `block`, including revoked revisions
    /// whose timeline still covers that historical block (spec.md §4.7:
    /// "a revision that is neither head nor orphan-but-revoked still
    /// serves historical HeadAt(block) queries").
    pub fn head_at(&self, variant_id: &str, block: i64) -> Option<&Revision> {
        let history = self.variants.get(variant_id)?;
        history.revisions.values().find(|r| r.covers_block(block))
    }

    pub fn revision(&self, variant_id: &str, record_id: &str) -> Option<&Revision> {
        self.variants.get(variant_id)?.revisions.get(record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ds(record_id: &str, variant: &str, rev: u64, generated_at_secs: i64) -> DatasetRevision {
        DatasetRevision {
            record_id: record_id.to_string(),
            variant_id: variant.to_string(),
            revision_number: rev,
            generated_at: Utc.timestamp_opt(generated_at_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_first_revision_is_head() {
        let mut rater = RevisionRater::new();
        let is_first = rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        assert!(is_first);
        let head = rater.head("v1").unwrap();
        assert_eq!(head.record_id, "record_1");
        assert_eq!(head.head_from, 1);
        assert_eq!(head.head_to, NO_BLOCK_NUMBER);
    }

    #[test]
    fn test_s5_out_of_order_revisions() {
        let mut rater = RevisionRater::new();
        rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        rater.add_revision(ds("record_2", "v1", 2, 2000), 2);
        rater.add_revision(ds("record_3", "v1", 4, 4000), 3);
        let is_first = rater.add_revision(ds("record_4", "v1", 3, 3000), 4);
        assert!(!is_first);

        let head = rater.head("v1").unwrap();
        assert_eq!(head.record_id, "record_3");
        assert_eq!(head.head_from, 3);
        assert_eq!(head.head_to, NO_BLOCK_NUMBER);

        let orphan = rater.revision("v1", "record_4").unwrap();
        assert!(orphan.is_orphan());
        assert_eq!(orphan.head_from, NO_BLOCK_NUMBER);

        let r1 = rater.revision("v1", "record_1").unwrap();
        assert_eq!((r1.head_from, r1.head_to), (1, 1));
        let r2 = rater.revision("v1", "record_2").unwrap();
        assert_eq!((r2.head_from, r2.head_to), (2, 2));
    }

    #[test]
    fn test_add_revocation_extends_previous_head_to_current_head() {
        let mut rater = RevisionRater::new();
        rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        rater.add_revision(ds("record_2", "v1", 2, 2000), 2);

        rater.add_revocation("v1", "record_2").unwrap();

        let head = rater.head("v1").unwrap();
        assert_eq!(head.record_id, "record_1");
        assert_eq!(head.head_to, NO_BLOCK_NUMBER);

        let revoked = rater.revision("v1", "record_2").unwrap();
        assert_eq!(revoked.status, RevisionStatus::Revoked);
    }

    #[test]
    fn test_add_revocation_of_middle_revision_extends_gap() {
        let mut rater = RevisionRater::new();
        rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        rater.add_revision(ds("record_2", "v1", 2, 2000), 2);
        rater.add_revision(ds("record_3", "v1", 3, 3000), 3);

        rater.add_revocation("v1", "record_2").unwrap();

        let r1 = rater.revision("v1", "record_1").unwrap();
        assert_eq!(r1.head_to, 2);

        let head = rater.head("v1").unwrap();
        assert_eq!(head.record_id, "record_3");
    }

    #[test]
    fn test_head_at_historical_block() {
        let mut rater = RevisionRater::new();
        rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        rater.add_revision(ds("record_2", "v1", 2, 2000), 5);

        assert_eq!(rater.head_at("v1", 1).unwrap().record_id, "record_1");
        assert_eq!(rater.head_at("v1", 4).unwrap().record_id, "record_1");
        assert_eq!(rater.head_at("v1", 5).unwrap().record_id, "record_2");
        assert_eq!(rater.head_at("v1", 100).unwrap().record_id, "record_2");
    }

    #[test]
    fn test_variants_are_independent() {
        let mut rater = RevisionRater::new();
        rater.add_revision(ds("record_1", "v1", 1, 1000), 1);
        rater.add_revision(ds("record_a", "v2", 1, 1000), 1);
        assert_eq!(rater.head("v1").unwrap().record_id, "record_1");
        assert_eq!(rater.head("v2").unwrap().record_id, "record_a");
    }
}
