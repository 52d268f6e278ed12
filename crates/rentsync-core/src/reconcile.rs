//! Set reconciliation between mirrored remote declarations and projected agreements.
//!
//! Records are compared by [`CompositeKey`] only. A correction to a non-key
//! field such as the driver name is not grounds for void and re-create.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::info;

use crate::projector::SkipList;
use crate::record::{CanonicalRecord, CompositeKey};

/// Counters describing one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Distinct eligible remote keys.
    pub remote: usize,
    /// Distinct eligible projected keys.
    pub local: usize,
    /// Records left out for missing key fields, both sides.
    pub ineligible: usize,
    /// Remote keys with no local counterpart, before skip filtering.
    pub extra_remote: usize,
    /// Extra remote keys kept because their agreement is on the skip list.
    pub shielded: usize,
    /// Remote keys belonging to unsigned or cancelled agreements.
    pub invalid_remote: usize,
}

/// What the executor should do.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub voids: Vec<CanonicalRecord>,
    pub creates: Vec<CanonicalRecord>,
    pub stats: ReconcileStats,
}

fn keyed(records: &[CanonicalRecord]) -> (BTreeMap<CompositeKey, &CanonicalRecord>, usize) {
    let mut map = BTreeMap::new();
    let mut ineligible = 0;
    for record in records {
        match record.key() {
            Some(key) => {
                map.entry(key).or_insert(record);
            }
            None => ineligible += 1,
        }
    }
    (map, ineligible)
}

/// Compute the void and create sets.
///
/// - `extra_remote = mirror \ projected`, minus agreements on `skip_list`
/// - `invalid_remote` = mirror records whose agreement number is in `unsigned`
/// - voids = `extra_remote ∪ invalid_remote`, one per key
/// - creates = `projected \ mirror`
pub fn reconcile(
    mirror: &[CanonicalRecord],
    projected: &[CanonicalRecord],
    skip_list: &SkipList,
    unsigned: &BTreeSet<String>,
) -> ReconcilePlan {
    let (remote, remote_ineligible) = keyed(mirror);
    let (local, local_ineligible) = keyed(projected);

    let mut stats = ReconcileStats {
        remote: remote.len(),
        local: local.len(),
        ineligible: remote_ineligible + local_ineligible,
        ..Default::default()
    };

    let mut voids: BTreeMap<&CompositeKey, &CanonicalRecord> = BTreeMap::new();
    for (key, record) in &remote {
        if local.contains_key(key) {
            continue;
        }
        stats.extra_remote += 1;
        if skip_list.contains(&record.agreement_no) {
            stats.shielded += 1;
            continue;
        }
        voids.insert(key, *record);
    }
    for (key, record) in &remote {
        if unsigned.contains(&record.agreement_no) {
            stats.invalid_remote += 1;
            voids.insert(key, *record);
        }
    }

    let creates: Vec<CanonicalRecord> = local
        .iter()
        .filter(|(key, _)| !remote.contains_key(*key))
        .map(|(_, record)| (*record).clone())
        .collect();
    let voids: Vec<CanonicalRecord> = voids.into_values().cloned().collect();

    info!(
        remote = stats.remote,
        local = stats.local,
        extra_remote = stats.extra_remote,
        shielded = stats.shielded,
        invalid_remote = stats.invalid_remote,
        voids = voids.len(),
        creates = creates.len(),
        "reconciled"
    );

    ReconcilePlan {
        voids,
        creates,
        stats,
    }
}
