//! HTTP client for the rental regulatory platform.
//!
//! Every call is a form-encoded POST carrying the account's session cookie.
//! Responses share one envelope: `{code, message?, data?}`; list responses
//! carry `data: {content: [...], last: bool}`.

use std::time::Duration;

use async_trait::async_trait;
use rentsync_core::record::format_minute;
use rentsync_core::{CanonicalRecord, ExternalAccount, SyncWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::normalize_rows;

pub const DEFAULT_LIST_PATH: &str = "/rental/contract/list";
pub const DEFAULT_VOID_PATH: &str = "/rental/contract/void";
pub const DEFAULT_CREATE_PATH: &str = "/rental/contract/declare";
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("platform rejected request (code {code}): {message}")]
    Application { code: String, message: String },
    #[error("list response carried no data")]
    MissingData,
}

/// Endpoint paths and pacing for the platform.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub list_path: String,
    pub void_path: String,
    pub create_path: String,
    /// Pause between consecutive page requests for one account.
    pub page_delay: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            list_path: DEFAULT_LIST_PATH.to_string(),
            void_path: DEFAULT_VOID_PATH.to_string(),
            create_path: DEFAULT_CREATE_PATH.to_string(),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

/// The operations the engine needs from the platform.
#[async_trait]
pub trait RemotePlatform: Send + Sync {
    /// Every declaration visible to `account` in the window, normalised.
    ///
    /// Fails as a whole: a partial page set is never returned.
    async fn fetch_records(
        &self,
        account: &ExternalAccount,
        window: &SyncWindow,
        page_size: u32,
    ) -> Result<Vec<CanonicalRecord>, SyncError>;

    async fn void_record(
        &self,
        account: &ExternalAccount,
        record: &CanonicalRecord,
    ) -> Result<(), SyncError>;

    async fn create_record(
        &self,
        account: &ExternalAccount,
        record: &CanonicalRecord,
    ) -> Result<(), SyncError>;
}

#[derive(Deserialize)]
struct Envelope {
    code: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    fn is_success(&self) -> bool {
        match &self.code {
            Value::Number(n) => matches!(n.as_i64(), Some(0 | 200)),
            Value::String(s) => matches!(s.trim(), "0" | "200"),
            _ => false,
        }
    }

    fn into_result(self) -> Result<Option<Value>, SyncError> {
        if self.is_success() {
            return Ok(self.data);
        }
        let code = match &self.code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Err(SyncError::Application {
            code,
            message: self.message.unwrap_or_default(),
        })
    }
}

/// Neither field defaults. A page that does not say whether more follow fails the fetch.
#[derive(Deserialize)]
struct Page {
    content: Vec<Value>,
    last: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListForm {
    start_date: String,
    end_date: String,
    page: u32,
    size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationForm<'a> {
    contract_no: &'a str,
    plate_type: &'a str,
    plate_number: &'a str,
    rental_type: &'a str,
    signed_at: String,
    rental_start_at: String,
    rental_end_at: String,
    id_doc_type: &'a str,
    id_doc_no: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver_name: Option<&'a str>,
}

impl<'a> MutationForm<'a> {
    fn new(record: &'a CanonicalRecord, with_driver: bool) -> Self {
        let minute = |ts: Option<chrono::NaiveDateTime>| {
            ts.as_ref().map(format_minute).unwrap_or_default()
        };
        Self {
            contract_no: &record.agreement_no,
            plate_type: &record.plate_type,
            plate_number: &record.plate_number,
            rental_type: &record.rental_kind,
            signed_at: minute(record.signed_at.or(record.rental_start_at)),
            rental_start_at: minute(record.rental_start_at),
            rental_end_at: minute(record.rental_end_at),
            id_doc_type: &record.id_doc_type,
            id_doc_no: &record.id_doc_no,
            driver_name: if with_driver {
                record.driver_name.as_deref()
            } else {
                None
            },
        }
    }
}

/// reqwest-backed [`RemotePlatform`].
pub struct PlatformClient {
    client: reqwest::Client,
    config: PlatformConfig,
}

impl PlatformClient {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(account: &ExternalAccount, path: &str) -> String {
        format!(
            "{}/{}",
            account.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a form and unwrap the response envelope.
    async fn post_form<T: Serialize + ?Sized>(
        &self,
        account: &ExternalAccount,
        path: &str,
        form: &T,
    ) -> Result<Option<Value>, SyncError> {
        let url = Self::url(account, path);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, &account.session)
            .form(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let envelope: Envelope = serde_json::from_str(&body)?;
        envelope.into_result()
    }

    /// Fetch one page of raw rows. Returns the rows and whether it was the last page.
    pub async fn fetch_page(
        &self,
        account: &ExternalAccount,
        window: &SyncWindow,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Value>, bool), SyncError> {
        let form = ListForm {
            start_date: window.since.format("%Y%m%d").to_string(),
            end_date: window.until.format("%Y%m%d").to_string(),
            page,
            size,
        };
        let data = self
            .post_form(account, &self.config.list_path, &form)
            .await?;
        let data = data.ok_or(SyncError::MissingData)?;
        let page: Page = serde_json::from_value(data)?;
        Ok((page.content, page.last))
    }
}

#[async_trait]
impl RemotePlatform for PlatformClient {
    async fn fetch_records(
        &self,
        account: &ExternalAccount,
        window: &SyncWindow,
        page_size: u32,
    ) -> Result<Vec<CanonicalRecord>, SyncError> {
        info!(
            account_id = account.id,
            account = %account.name,
            scope = %account.scope,
            "fetching remote declarations"
        );
        let mut rows = Vec::new();
        let mut page = 1u32;
        loop {
            if page > 1 && !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
            let (content, last) = self.fetch_page(account, window, page, page_size).await?;
            debug!(account_id = account.id, page, rows = content.len(), last, "fetched page");
            let empty = content.is_empty();
            rows.extend(content);
            if last || empty {
                break;
            }
            page += 1;
        }

        let records = normalize_rows(&rows);
        info!(
            account_id = account.id,
            rows = rows.len(),
            records = records.len(),
            "fetched remote declarations"
        );
        Ok(records)
    }

    async fn void_record(
        &self,
        account: &ExternalAccount,
        record: &CanonicalRecord,
    ) -> Result<(), SyncError> {
        let form = MutationForm::new(record, false);
        self.post_form(account, &self.config.void_path, &form).await?;
        Ok(())
    }

    async fn create_record(
        &self,
        account: &ExternalAccount,
        record: &CanonicalRecord,
    ) -> Result<(), SyncError> {
        let form = MutationForm::new(record, true);
        self.post_form(account, &self.config.create_path, &form).await?;
        Ok(())
    }
}
