//! Canonical declaration records and the composite key used to compare them.
//!
//! A [`CanonicalRecord`] is the shape the regulatory platform declares: one
//! agreement's plate, period and identity facts for a single calendar month.
//! Remote rows and locally projected agreements are both reduced to this
//! shape before reconciliation.

use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Canonical minute-precision timestamp format.
///
/// Used verbatim in composite keys, the mirror table and outgoing requests.
/// The format sorts lexicographically in chronological order.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Identity document type code for a resident identity card.
///
/// The only document type the platform accepts for rental declarations.
pub const ID_DOC_TYPE_RESIDENT: &str = "A";

/// Render a timestamp in [`MINUTE_FORMAT`].
pub fn format_minute(ts: &NaiveDateTime) -> String {
    ts.format(MINUTE_FORMAT).to_string()
}

/// Parse a timestamp written in [`MINUTE_FORMAT`].
pub fn parse_minute(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), MINUTE_FORMAT).ok()
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Normalise a plate number for storage and comparison.
///
/// Plates are declared with a leading province glyph (e.g. "粤B12345") on some
/// screens and without it on others. A single leading non-ASCII character is
/// stripped; plain ASCII plates are returned trimmed but otherwise unchanged.
pub fn normalize_plate(plate: &str) -> String {
    let plate = plate.trim();
    match plate.chars().next() {
        Some(c) if !c.is_ascii() => plate[c.len_utf8()..].trim_start().to_string(),
        _ => plate.to_string(),
    }
}

/// One declared rental fact, in the platform's shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub agreement_no: String,
    pub plate_type: String,
    /// Normalised with [`normalize_plate`].
    pub plate_number: String,
    pub rental_kind: String,
    pub signed_at: Option<NaiveDateTime>,
    pub rental_start_at: Option<NaiveDateTime>,
    pub rental_end_at: Option<NaiveDateTime>,
    pub id_doc_type: String,
    pub id_doc_no: String,
    /// Only carried on creation payloads.
    pub driver_name: Option<String>,
}

impl CanonicalRecord {
    /// Whether every key field is present.
    ///
    /// Ineligible records never match and never mismatch: they are left out
    /// of every set operation.
    pub fn is_eligible(&self) -> bool {
        self.key().is_some()
    }

    /// The composite key, or `None` when any key field is empty.
    pub fn key(&self) -> Option<CompositeKey> {
        let start = self.rental_start_at?;
        let end = self.rental_end_at?;
        let fields = [
            self.agreement_no.as_str(),
            self.plate_type.as_str(),
            self.plate_number.as_str(),
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return None;
        }
        Some(CompositeKey(format!(
            "{}|{}|{}|{}|{}",
            self.agreement_no,
            format_minute(&start),
            format_minute(&end),
            self.plate_type,
            self.plate_number
        )))
    }

    /// Whether the record's own period intersects the closed interval `[since, until]`.
    pub fn overlaps(&self, since: NaiveDateTime, until: NaiveDateTime) -> bool {
        match (self.rental_start_at, self.rental_end_at) {
            (Some(start), Some(end)) => start <= until && end >= since,
            _ => false,
        }
    }
}

/// `agreement_no|rental_start_at|rental_end_at|plate_type|plate_number`.
///
/// Two records with equal keys are the same remote fact, whatever their
/// driver name or signing time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
