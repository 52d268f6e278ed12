//! Authoritative rental agreements and the external accounts they are declared through.
//!
//! These types are read from the contract store; the engine never writes them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::window::end_of_day;

/// Lifecycle status of a rental agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    Pending,
    Signed,
    Cancelled,
    EarlyTerminated,
    Completed,
}

/// Which side of the signing line an agreement sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPartition {
    /// Never signed, or cancelled. Must not stay declared remotely.
    Unsigned,
    /// Signed and every state after it. Projected into declarations.
    Effective,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Cancelled => "cancelled",
            Self::EarlyTerminated => "early_terminated",
            Self::Completed => "completed",
        }
    }

    pub fn partition(&self) -> StatusPartition {
        match self {
            Self::Pending | Self::Cancelled => StatusPartition::Unsigned,
            Self::Signed | Self::EarlyTerminated | Self::Completed => StatusPartition::Effective,
        }
    }
}

impl FromStr for AgreementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "signed" => Ok(Self::Signed),
            "cancelled" => Ok(Self::Cancelled),
            "early_terminated" => Ok(Self::EarlyTerminated),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown agreement status: {other}")),
        }
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an external account belongs to a person or a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    Individual,
    Organization,
}

impl AccountScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Organization => "organization",
        }
    }
}

impl FromStr for AccountScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "individual" => Ok(Self::Individual),
            "organization" => Ok(Self::Organization),
            other => Err(format!("unknown account scope: {other}")),
        }
    }
}

impl fmt::Display for AccountScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login on the regulatory platform, scoped to one province.
#[derive(Clone, PartialEq, Eq)]
pub struct ExternalAccount {
    pub id: i64,
    pub name: String,
    pub scope: AccountScope,
    /// Province-specific platform root, e.g. `https://gd.122.gov.cn`.
    pub base_url: String,
    /// Opaque session cookie sent with every request.
    pub session: String,
    /// The "sync rental agreements" capability.
    pub sync_rental_agreements: bool,
}

impl fmt::Debug for ExternalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("base_url", &self.base_url)
            .field("session", &format_args!("<{} bytes>", self.session.len()))
            .field("sync_rental_agreements", &self.sync_rental_agreements)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vehicle {
    pub plate_type: Option<String>,
    pub plate_number: Option<String>,
    pub account: Option<ExternalAccount>,
}

/// The renter's individual profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Customer {
    pub name: Option<String>,
    pub id_doc_no: Option<String>,
}

/// A rental contract as held by the contract store, with its vehicle,
/// customer and bound account loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    pub id: i64,
    pub agreement_no: Option<String>,
    pub status: AgreementStatus,
    pub rental_kind: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Set when an agreement ends before its contracted end date.
    pub terminated_on: Option<NaiveDate>,
    pub signed_at: Option<NaiveDateTime>,
    pub vehicle: Option<Vehicle>,
    pub customer: Option<Customer>,
}

impl Agreement {
    /// Trimmed agreement number, `None` when blank.
    pub fn number(&self) -> Option<&str> {
        non_blank(&self.agreement_no)
    }

    /// The rental period as minute-precision timestamps.
    ///
    /// Starts at 00:00 of the start date and ends at 23:59 of the end date.
    /// Early-terminated agreements end on their termination date when one is
    /// recorded.
    pub fn resolved_period(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = self.start_date?.and_time(NaiveTime::MIN);
        let end_date = match (self.status, self.terminated_on) {
            (AgreementStatus::EarlyTerminated, Some(day)) => day,
            _ => self.end_date?,
        };
        Some((start, end_of_day(end_date)))
    }

    pub fn bound_account(&self) -> Option<&ExternalAccount> {
        self.vehicle.as_ref()?.account.as_ref()
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Agreements split by [`StatusPartition`].
#[derive(Debug, Default)]
pub struct Classified {
    pub effective: Vec<Agreement>,
    pub unsigned: Vec<Agreement>,
}

impl Classified {
    /// Agreement numbers of unsigned or cancelled agreements.
    pub fn unsigned_numbers(&self) -> BTreeSet<String> {
        self.unsigned
            .iter()
            .filter_map(|a| a.number().map(str::to_string))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agreement> {
        self.effective.iter().chain(self.unsigned.iter())
    }
}

/// Classify agreements loaded by a single query.
pub fn classify(agreements: Vec<Agreement>) -> Classified {
    let mut out = Classified::default();
    for agreement in agreements {
        match agreement.status.partition() {
            StatusPartition::Effective => out.effective.push(agreement),
            StatusPartition::Unsigned => out.unsigned.push(agreement),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::format_minute;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn agreement(status: AgreementStatus) -> Agreement {
        Agreement {
            id: 1,
            agreement_no: Some(" ZL001 ".into()),
            status,
            rental_kind: "1".into(),
            start_date: Some(date("2024-01-15")),
            end_date: Some(date("2024-03-10")),
            terminated_on: Some(date("2024-02-05")),
            signed_at: None,
            vehicle: None,
            customer: None,
        }
    }

    #[test]
    fn status_partitions() {
        assert_eq!(AgreementStatus::Pending.partition(), StatusPartition::Unsigned);
        assert_eq!(AgreementStatus::Cancelled.partition(), StatusPartition::Unsigned);
        assert_eq!(AgreementStatus::Signed.partition(), StatusPartition::Effective);
        assert_eq!(
            AgreementStatus::EarlyTerminated.partition(),
            StatusPartition::Effective
        );
        assert_eq!(AgreementStatus::Completed.partition(), StatusPartition::Effective);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AgreementStatus::Pending,
            AgreementStatus::Signed,
            AgreementStatus::Cancelled,
            AgreementStatus::EarlyTerminated,
            AgreementStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<AgreementStatus>().unwrap(), status);
        }
        assert!("voided".parse::<AgreementStatus>().is_err());
    }

    #[test]
    fn resolved_period_spans_whole_days() {
        let (start, end) = agreement(AgreementStatus::Signed).resolved_period().unwrap();
        assert_eq!(format_minute(&start), "2024-01-15 00:00");
        assert_eq!(format_minute(&end), "2024-03-10 23:59");
    }

    #[test]
    fn early_termination_shortens_period() {
        let (_, end) = agreement(AgreementStatus::EarlyTerminated)
            .resolved_period()
            .unwrap();
        assert_eq!(format_minute(&end), "2024-02-05 23:59");
    }

    #[test]
    fn missing_dates_have_no_period() {
        let mut a = agreement(AgreementStatus::Signed);
        a.end_date = None;
        assert!(a.resolved_period().is_none());
    }

    #[test]
    fn number_is_trimmed() {
        assert_eq!(agreement(AgreementStatus::Signed).number(), Some("ZL001"));
        let mut a = agreement(AgreementStatus::Signed);
        a.agreement_no = Some("   ".into());
        assert_eq!(a.number(), None);
    }

    #[test]
    fn classify_splits_by_status() {
        let mut cancelled = agreement(AgreementStatus::Cancelled);
        cancelled.agreement_no = Some("ZL002".into());
        let classified = classify(vec![
            agreement(AgreementStatus::Completed),
            cancelled,
            agreement(AgreementStatus::Pending),
        ]);
        assert_eq!(classified.effective.len(), 1);
        assert_eq!(classified.unsigned.len(), 2);
        let numbers: Vec<_> = classified.unsigned_numbers().into_iter().collect();
        assert_eq!(numbers, vec!["ZL001".to_string(), "ZL002".to_string()]);
        assert_eq!(classified.iter().count(), 3);
    }

    #[test]
    fn account_debug_hides_session() {
        let account = ExternalAccount {
            id: 7,
            name: "Shenzhen fleet".into(),
            scope: AccountScope::Organization,
            base_url: "https://gd.example.test".into(),
            session: "JSESSIONID=secret-token-value".into(),
            sync_rental_agreements: true,
        };
        let debug = format!("{account:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("29 bytes"));
    }
}
