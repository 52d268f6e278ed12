//! One reconciliation run: fetch, mirror, project, reconcile, mutate.

use std::time::Instant;

use anyhow::{Context, bail};
use rentsync_core::{AccountResolver, CanonicalRecord, SyncWindow, classify, project, reconcile};
use rentsync_store::DuckStore;
use rentsync_sync::{MutationExecutor, RemotePlatform};
use tracing::{error, info};

use crate::report::RunReport;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub window: SyncWindow,
    pub page_size: u32,
    pub skip_fetch: bool,
    pub dry_run: bool,
}

/// Run the full pipeline against `store` and `platform`.
///
/// A fetch failure for any account aborts the run before the mirror is
/// touched. Failures of individual mutations are reported, not returned.
pub async fn run_sync<P: RemotePlatform>(
    store: &mut DuckStore,
    platform: &P,
    options: &RunOptions,
) -> anyhow::Result<RunReport> {
    let start = Instant::now();
    let window = &options.window;
    info!(
        since = %window.since,
        until = %window.until,
        compare_until = %window.compare_until,
        dry_run = options.dry_run,
        skip_fetch = options.skip_fetch,
        "starting sync run"
    );

    // 1. Sync-enabled accounts.
    let accounts = store
        .sync_accounts()
        .context("loading sync-enabled accounts")?;

    // 2. Fetch every account; any failure aborts before the mirror is touched.
    let fetched = if options.skip_fetch {
        None
    } else {
        let mut fetched = Vec::with_capacity(accounts.len());
        let mut failures = Vec::new();
        for account in &accounts {
            match platform
                .fetch_records(account, window, options.page_size)
                .await
            {
                Ok(records) => fetched.push((account.id, records)),
                Err(err) => {
                    error!(account_id = account.id, account = %account.name, error = %err, "fetch failed");
                    failures.push(format!("account {} ({}): {err}", account.id, account.name));
                }
            }
        }
        if !failures.is_empty() {
            bail!(
                "{} of {} account fetches failed, nothing was changed:\n  {}",
                failures.len(),
                accounts.len(),
                failures.join("\n  ")
            );
        }
        Some(fetched)
    };
    let fetched_rows = fetched
        .as_ref()
        .map(|f| f.iter().map(|(_, records)| records.len()).sum::<usize>());

    // 3. Replace the mirror for the window.
    let mirrored = match (&fetched, options.dry_run) {
        (Some(fetched), false) => Some(
            store
                .overwrite_mirror(window, fetched)
                .context("overwriting remote mirror")?,
        ),
        _ => None,
    };

    // 4. Remote side of the comparison. A dry run with a fresh fetch compares
    //    against what was fetched, since the mirror was left as it was.
    let remote: Vec<CanonicalRecord> = match (fetched, options.dry_run) {
        (Some(fetched), true) => fetched
            .into_iter()
            .flat_map(|(_, records)| records)
            .filter(|r| r.overlaps(window.since, window.compare_until))
            .collect(),
        _ => store
            .mirror_records(window.since, window.compare_until)
            .context("reading remote mirror")?,
    };

    // 5. Local side.
    let agreements = store
        .agreements_overlapping(window.since.date(), window.until.date())
        .context("loading rental agreements")?;
    let classified = classify(agreements);
    let unsigned = classified.unsigned_numbers();
    let projection = project(&classified.effective, window);

    // 6. Plan.
    let plan = reconcile(&remote, &projection.records, &projection.skip_list, &unsigned);
    info!(
        remote = remote.len(),
        projected = projection.records.len(),
        voids = plan.voids.len(),
        creates = plan.creates.len(),
        "reconciliation planned"
    );

    let mut report = RunReport {
        window: *window,
        dry_run: options.dry_run,
        skip_fetch: options.skip_fetch,
        accounts: accounts.len(),
        fetched: fetched_rows,
        mirrored,
        compared: remote.len(),
        effective: classified.effective.len(),
        unsigned: classified.unsigned.len(),
        projected: projection.records.len(),
        skipped: projection.skipped,
        reconcile: plan.stats,
        void_candidates: plan.voids.len(),
        create_candidates: plan.creates.len(),
        voids: None,
        creates: None,
        elapsed_secs: 0.0,
    };

    // 7. Mutate: voids first, then creates.
    if !options.dry_run {
        let resolver = AccountResolver::new(accounts, classified.iter());
        let executor = MutationExecutor::new(platform, &resolver);
        report.voids = Some(executor.void_all(&plan.voids).await);
        report.creates = Some(executor.create_all(&plan.creates).await);
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    info!(elapsed_secs = report.elapsed_secs, "sync run finished");
    Ok(report)
}
