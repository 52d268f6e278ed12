//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use rentsync_core::{SyncWindow, WindowError};
use rentsync_sync::PlatformConfig;
use rentsync_sync::http::{DEFAULT_CREATE_PATH, DEFAULT_LIST_PATH, DEFAULT_VOID_PATH};

use crate::run::RunOptions;

/// Reconcile local rental agreements with the regulatory platform.
#[derive(Debug, Parser)]
#[command(name = "rentsync", version, about)]
pub struct Cli {
    /// First day of the sync window. Defaults to one year before today.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub since: Option<NaiveDate>,

    /// Last day of the sync window. Defaults to today.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub until: Option<NaiveDate>,

    /// Rows requested per list page.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: u32,

    /// Reuse the stored mirror instead of fetching from the platform.
    #[arg(long)]
    pub skip_fetch: bool,

    /// Compute and report the plan without touching the mirror or the platform.
    #[arg(long)]
    pub dry_run: bool,

    /// DuckDB file holding the mirror and the contract tables.
    #[arg(long, env = "RENTSYNC_DB", default_value = "rentsync.duckdb")]
    pub db: PathBuf,

    /// Pause between page requests, in milliseconds.
    #[arg(long, env = "RENTSYNC_PAGE_DELAY_MS", default_value_t = 500)]
    pub page_delay_ms: u64,

    #[arg(long, default_value = DEFAULT_LIST_PATH)]
    pub list_path: String,

    #[arg(long, default_value = DEFAULT_VOID_PATH)]
    pub void_path: String,

    #[arg(long, default_value = DEFAULT_CREATE_PATH)]
    pub create_path: String,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            list_path: self.list_path.clone(),
            void_path: self.void_path.clone(),
            create_path: self.create_path.clone(),
            page_delay: Duration::from_millis(self.page_delay_ms),
        }
    }

    pub fn run_options(&self, now: NaiveDateTime) -> Result<RunOptions, WindowError> {
        Ok(RunOptions {
            window: SyncWindow::resolve(self.since, self.until, now)?,
            page_size: self.page_size,
            skip_fetch: self.skip_fetch,
            dry_run: self.dry_run,
        })
    }
}
