//! Summary of a sync run, as text or JSON.

use std::fmt;

use rentsync_core::record::format_minute;
use rentsync_core::{ReconcileStats, SkippedAgreement, SyncWindow};
use rentsync_sync::MutationTally;
use serde::Serialize;

const MAX_LISTED: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub window: SyncWindow,
    pub dry_run: bool,
    pub skip_fetch: bool,
    /// Sync-enabled accounts in the directory.
    pub accounts: usize,
    /// Rows fetched across all accounts; `None` when fetching was skipped.
    pub fetched: Option<usize>,
    /// Rows written to the mirror; `None` when it was left untouched.
    pub mirrored: Option<usize>,
    /// Remote records compared against the projection.
    pub compared: usize,
    pub effective: usize,
    pub unsigned: usize,
    pub projected: usize,
    pub skipped: Vec<SkippedAgreement>,
    pub reconcile: ReconcileStats,
    pub void_candidates: usize,
    pub create_candidates: usize,
    pub voids: Option<MutationTally>,
    pub creates: Option<MutationTally>,
    pub elapsed_secs: f64,
}

/// Human-readable summary, one section per phase.
impl fmt::Display for RunReport {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            out,
            "=== rentsync {} .. {} ===",
            format_minute(&self.window.since),
            format_minute(&self.window.until)
        )?;
        if self.window.compare_until != self.window.until {
            writeln!(
                out,
                "compared up to {}",
                format_minute(&self.window.compare_until)
            )?;
        }
        if self.dry_run {
            writeln!(out, "dry run: nothing was written")?;
        }
        writeln!(out)?;

        writeln!(out, "Remote")?;
        row(out, "accounts", self.accounts)?;
        match self.fetched {
            Some(n) => row(out, "fetched", n)?,
            None => row(out, "fetched", "skipped")?,
        }
        match self.mirrored {
            Some(n) => row(out, "mirrored", n)?,
            None => row(out, "mirrored", "unchanged")?,
        }
        row(out, "compared", self.compared)?;
        writeln!(out)?;

        writeln!(out, "Local")?;
        row(out, "effective agreements", self.effective)?;
        row(out, "unsigned agreements", self.unsigned)?;
        row(out, "projected records", self.projected)?;
        row(out, "skipped agreements", self.skipped.len())?;
        for skipped in self.skipped.iter().take(MAX_LISTED) {
            let reasons = skipped
                .reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            writeln!(
                out,
                "    #{} {}: {}",
                skipped.agreement_id,
                skipped.agreement_no.as_deref().unwrap_or("-"),
                reasons
            )?;
        }
        if self.skipped.len() > MAX_LISTED {
            writeln!(out, "    ... and {} more", self.skipped.len() - MAX_LISTED)?;
        }
        writeln!(out)?;

        writeln!(out, "Plan")?;
        row(out, "extra remote", self.reconcile.extra_remote)?;
        row(out, "shielded by skip list", self.reconcile.shielded)?;
        row(out, "invalid remote", self.reconcile.invalid_remote)?;
        row(out, "ineligible records", self.reconcile.ineligible)?;
        row(out, "to void", self.void_candidates)?;
        row(out, "to create", self.create_candidates)?;

        if self.voids.is_some() || self.creates.is_some() {
            writeln!(out)?;
            writeln!(out, "Mutations")?;
            for (label, tally) in [("voided", &self.voids), ("created", &self.creates)] {
                let Some(tally) = tally else { continue };
                row(
                    out,
                    label,
                    format!("{}/{} ({} failed)", tally.succeeded, tally.attempted, tally.failed()),
                )?;
                for failure in tally.failures.iter().take(MAX_LISTED) {
                    writeln!(out, "    {}: {}", failure.agreement_no, failure.reason)?;
                }
            }
        }

        writeln!(out)?;
        writeln!(out, "finished in {:.1}s", self.elapsed_secs)
    }
}

fn row(out: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(out, "  {label:<26} {value}")
}
