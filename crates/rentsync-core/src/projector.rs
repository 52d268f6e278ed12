//! Projection of authoritative agreements into canonical declarations.
//!
//! Each effective agreement overlapping the sync window is validated, clamped
//! to `[since, compare_until]` and split into month segments. Agreements that
//! fail validation project nothing; their numbers form the [`SkipList`] that
//! shields their existing remote declarations from being voided.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::agreement::{Agreement, non_blank};
use crate::record::{CanonicalRecord, ID_DOC_TYPE_RESIDENT, normalize_plate, truncate_to_minute};
use crate::segment::month_segments;
use crate::window::SyncWindow;

/// Why an agreement cannot be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    MissingAgreementNo,
    MissingPeriod,
    NoBoundAccount,
    BlankPlateType,
    BlankPlateNumber,
    SyncDisabled,
    MissingDriverName,
    MissingIdDocNo,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::MissingAgreementNo => "agreement number is missing",
            Self::MissingPeriod => "rental start or end date is missing",
            Self::NoBoundAccount => "vehicle has no bound platform account",
            Self::BlankPlateType => "vehicle plate type is blank",
            Self::BlankPlateNumber => "vehicle plate number is blank",
            Self::SyncDisabled => "bound account does not sync rental agreements",
            Self::MissingDriverName => "customer name is missing",
            Self::MissingIdDocNo => "customer identity document number is missing",
        };
        f.write_str(msg)
    }
}

/// Every reason an agreement is ineligible. Empty means eligible.
pub fn check_eligibility(agreement: &Agreement) -> Vec<Ineligibility> {
    let mut reasons = Vec::new();
    if agreement.number().is_none() {
        reasons.push(Ineligibility::MissingAgreementNo);
    }
    if agreement.resolved_period().is_none() {
        reasons.push(Ineligibility::MissingPeriod);
    }

    let vehicle = agreement.vehicle.as_ref();
    match vehicle.and_then(|v| v.account.as_ref()) {
        None => reasons.push(Ineligibility::NoBoundAccount),
        Some(account) if !account.sync_rental_agreements => {
            reasons.push(Ineligibility::SyncDisabled)
        }
        Some(_) => {}
    }
    if vehicle.and_then(|v| non_blank(&v.plate_type)).is_none() {
        reasons.push(Ineligibility::BlankPlateType);
    }
    if vehicle.and_then(|v| non_blank(&v.plate_number)).is_none() {
        reasons.push(Ineligibility::BlankPlateNumber);
    }

    let customer = agreement.customer.as_ref();
    if customer.and_then(|c| non_blank(&c.name)).is_none() {
        reasons.push(Ineligibility::MissingDriverName);
    }
    if customer.and_then(|c| non_blank(&c.id_doc_no)).is_none() {
        reasons.push(Ineligibility::MissingIdDocNo);
    }
    reasons
}

/// An agreement left out of projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAgreement {
    pub agreement_id: i64,
    pub agreement_no: Option<String>,
    pub reasons: Vec<Ineligibility>,
}

/// Agreement numbers excluded from projection.
///
/// The reconciler never voids a remote declaration whose agreement number is
/// on this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SkipList(BTreeSet<String>);

impl SkipList {
    pub fn contains(&self, agreement_no: &str) -> bool {
        self.0.contains(agreement_no)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for SkipList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Output of [`project`].
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub records: Vec<CanonicalRecord>,
    pub skipped: Vec<SkippedAgreement>,
    pub skip_list: SkipList,
}

/// Project one agreement, or return every reason it is ineligible.
///
/// An eligible agreement whose period misses the window projects to an empty
/// list.
pub fn project_agreement(
    agreement: &Agreement,
    window: &SyncWindow,
) -> Result<Vec<CanonicalRecord>, Vec<Ineligibility>> {
    let reasons = check_eligibility(agreement);
    if !reasons.is_empty() {
        return Err(reasons);
    }

    // Eligibility guarantees every field below is present.
    let (Some(agreement_no), Some((start, end)), Some(vehicle), Some(customer)) = (
        agreement.number(),
        agreement.resolved_period(),
        agreement.vehicle.as_ref(),
        agreement.customer.as_ref(),
    ) else {
        return Err(vec![Ineligibility::MissingPeriod]);
    };
    let Some((start, end)) = window.clamp(start, end) else {
        return Ok(Vec::new());
    };

    let plate_type = non_blank(&vehicle.plate_type).unwrap_or_default();
    let plate_number = normalize_plate(non_blank(&vehicle.plate_number).unwrap_or_default());
    let id_doc_no = non_blank(&customer.id_doc_no).unwrap_or_default();
    let driver_name = non_blank(&customer.name).map(str::to_string);
    let signed_at = agreement.signed_at.map(truncate_to_minute);

    let records = month_segments(start, end)
        .map(|(seg_start, seg_end)| CanonicalRecord {
            agreement_no: agreement_no.to_string(),
            plate_type: plate_type.to_string(),
            plate_number: plate_number.clone(),
            rental_kind: agreement.rental_kind.trim().to_string(),
            signed_at: Some(signed_at.unwrap_or(seg_start)),
            rental_start_at: Some(seg_start),
            rental_end_at: Some(seg_end),
            id_doc_type: ID_DOC_TYPE_RESIDENT.to_string(),
            id_doc_no: id_doc_no.to_string(),
            driver_name: driver_name.clone(),
        })
        .collect();
    Ok(records)
}

/// Project effective agreements into declarations for the window.
pub fn project<'a>(
    agreements: impl IntoIterator<Item = &'a Agreement>,
    window: &SyncWindow,
) -> Projection {
    let mut projection = Projection::default();
    let mut skipped_numbers = Vec::new();

    for agreement in agreements {
        match project_agreement(agreement, window) {
            Ok(records) => {
                debug!(
                    agreement_id = agreement.id,
                    segments = records.len(),
                    "projected agreement"
                );
                projection.records.extend(records);
            }
            Err(reasons) => {
                let joined = reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(
                    agreement_id = agreement.id,
                    agreement_no = agreement.number().unwrap_or("-"),
                    reasons = %joined,
                    "agreement not eligible for sync, skipped"
                );
                if let Some(no) = agreement.number() {
                    skipped_numbers.push(no.to_string());
                }
                projection.skipped.push(SkippedAgreement {
                    agreement_id: agreement.id,
                    agreement_no: agreement.number().map(str::to_string),
                    reasons,
                });
            }
        }
    }

    projection.skip_list = skipped_numbers.into_iter().collect();
    projection
}
