use crate::prescriptions::PrescriptionRecord;

use std::collections::HashSet;

/// Reconciles an imported snapshot against the live prescription set.
///
/// Incoming records whose registration number is already present are dropped;
/// the live record always wins and is never mutated. The result is re-sorted
/// ascending by registration number, so re-importing the same snapshot is a
/// no-op.
pub fn merge(
    live: Vec<PrescriptionRecord>,
    incoming: Vec<PrescriptionRecord>,
) -> (Vec<PrescriptionRecord>, usize) {
    let existing: HashSet<u64> = live
        .iter()
        .map(|record| record.registration_number)
        .collect();

    let mut merged = live;
    let mut added = 0usize;
    for record in incoming {
        if existing.contains(&record.registration_number) {
            continue;
        }
        merged.push(record);
        added += 1;
    }

    merged.sort_by_key(|record| record.registration_number);
    (merged, added)
}
