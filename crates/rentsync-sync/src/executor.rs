//! Dispatch of void and create requests, one record at a time.
//!
//! A failure on one record is logged and tallied; it never stops the batch.

use rentsync_core::{AccountResolver, CanonicalRecord, ExternalAccount};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::http::{RemotePlatform, SyncError};

/// Sessions shorter than this are not worth sending: the platform would
/// reject them and the failure would only be noisier.
pub const MIN_SESSION_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Void,
    Create,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Create => "create",
        }
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("no sync-enabled account matches the agreement number or plate")]
    Unresolved,
    #[error("session for account {0} looks invalid")]
    InvalidSession(i64),
    #[error(transparent)]
    Remote(#[from] SyncError),
}

/// One record that could not be mutated.
#[derive(Debug, Clone, Serialize)]
pub struct MutationFailure {
    pub kind: MutationKind,
    pub agreement_no: String,
    pub key: String,
    pub reason: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<MutationFailure>,
}

impl MutationTally {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Issues void and create requests through the resolved account.
pub struct MutationExecutor<'a, P> {
    platform: &'a P,
    resolver: &'a AccountResolver,
}

impl<'a, P: RemotePlatform> MutationExecutor<'a, P> {
    pub fn new(platform: &'a P, resolver: &'a AccountResolver) -> Self {
        Self { platform, resolver }
    }

    pub async fn void_all(&self, records: &[CanonicalRecord]) -> MutationTally {
        self.run(MutationKind::Void, records).await
    }

    pub async fn create_all(&self, records: &[CanonicalRecord]) -> MutationTally {
        self.run(MutationKind::Create, records).await
    }

    fn account_for(&self, record: &CanonicalRecord) -> Result<&'a ExternalAccount, MutationError> {
        let account = self
            .resolver
            .resolve(record)
            .ok_or(MutationError::Unresolved)?;
        if account.session.trim().len() < MIN_SESSION_LEN {
            return Err(MutationError::InvalidSession(account.id));
        }
        Ok(account)
    }

    async fn apply(&self, kind: MutationKind, record: &CanonicalRecord) -> Result<(), MutationError> {
        let account = self.account_for(record)?;
        match kind {
            MutationKind::Void => self.platform.void_record(account, record).await?,
            MutationKind::Create => self.platform.create_record(account, record).await?,
        }
        Ok(())
    }

    async fn run(&self, kind: MutationKind, records: &[CanonicalRecord]) -> MutationTally {
        let mut tally = MutationTally::default();
        for record in records {
            tally.attempted += 1;
            match self.apply(kind, record).await {
                Ok(()) => {
                    tally.succeeded += 1;
                    info!(
                        kind = kind.as_str(),
                        agreement_no = %record.agreement_no,
                        plate = %record.plate_number,
                        "mutation applied"
                    );
                }
                Err(err) => {
                    warn!(
                        kind = kind.as_str(),
                        agreement_no = %record.agreement_no,
                        reason = %err,
                        "mutation failed"
                    );
                    tally.failures.push(MutationFailure {
                        kind,
                        agreement_no: record.agreement_no.clone(),
                        key: record.key().map(|k| k.to_string()).unwrap_or_default(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            kind = kind.as_str(),
            attempted = tally.attempted,
            succeeded = tally.succeeded,
            failed = tally.failed(),
            "mutation batch finished"
        );
        tally
    }
}
