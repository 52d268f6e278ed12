//! Maps a declaration back to the platform account allowed to mutate it.

use std::collections::HashMap;

use crate::agreement::{Agreement, ExternalAccount, non_blank};
use crate::record::{CanonicalRecord, normalize_plate};

/// Looks up the account for a record by agreement number, then by plate.
///
/// Only accounts in the sync-eligible directory resolve: an agreement bound to
/// an account that lost the sync capability cannot be mutated through it.
#[derive(Debug, Default)]
pub struct AccountResolver {
    accounts: HashMap<i64, ExternalAccount>,
    by_agreement: HashMap<String, i64>,
    by_plate: HashMap<String, i64>,
}

impl AccountResolver {
    /// Build the lookup tables.
    ///
    /// When a plate appears under several agreements, the binding of the
    /// latest-starting agreement wins.
    pub fn new<'a>(
        accounts: impl IntoIterator<Item = ExternalAccount>,
        agreements: impl IntoIterator<Item = &'a Agreement>,
    ) -> Self {
        let accounts: HashMap<i64, ExternalAccount> =
            accounts.into_iter().map(|a| (a.id, a)).collect();

        let mut bound: Vec<&Agreement> = agreements
            .into_iter()
            .filter(|a| a.bound_account().is_some())
            .collect();
        bound.sort_by_key(|a| (a.start_date, a.id));

        let mut by_agreement = HashMap::new();
        let mut by_plate = HashMap::new();
        for agreement in bound {
            let Some(account) = agreement.bound_account() else {
                continue;
            };
            if let Some(no) = agreement.number() {
                by_agreement.insert(no.to_string(), account.id);
            }
            if let Some(plate) = agreement
                .vehicle
                .as_ref()
                .and_then(|v| non_blank(&v.plate_number))
            {
                by_plate.insert(normalize_plate(plate), account.id);
            }
        }

        Self {
            accounts,
            by_agreement,
            by_plate,
        }
    }

    /// The account to mutate `record` through, if any.
    pub fn resolve(&self, record: &CanonicalRecord) -> Option<&ExternalAccount> {
        let by_agreement = self
            .by_agreement
            .get(record.agreement_no.trim())
            .and_then(|id| self.accounts.get(id));
        by_agreement.or_else(|| {
            self.by_plate
                .get(&normalize_plate(&record.plate_number))
                .and_then(|id| self.accounts.get(id))
        })
    }
}
