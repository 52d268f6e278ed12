//! DuckDB store for the remote mirror and the contract tables.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use chrono::{Local, NaiveDate, NaiveDateTime};
use duckdb::{Connection, params};
use rentsync_core::record::{format_minute, parse_minute};
use rentsync_core::{
    Agreement, AgreementStatus, CanonicalRecord, Customer, ExternalAccount, SyncWindow, Vehicle,
};
use tracing::{debug, info};

use crate::StoreError;
use crate::schema::{CONTRACT_DDL, MIRROR_DDL, MIRROR_TABLE};

/// DuckDB store backing a sync run.
///
/// The mirror (`remote_agreements`) caches what the platform currently
/// declares for a window. It is replaced wholesale by
/// [`overwrite_mirror`](Self::overwrite_mirror) and never merged.
///
/// The contract tables (`rental_agreements`, `vehicles`, `customers`,
/// `external_accounts`) are only read.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Create the mirror table and any missing contract tables.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(MIRROR_DDL)?;
        self.conn.execute_batch(CONTRACT_DDL)?;
        Ok(())
    }

    // ── Counts ──

    /// Number of rows in the mirror table.
    pub fn mirror_count(&self) -> Result<usize, StoreError> {
        self.count_table(MIRROR_TABLE)
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let mut stmt = self.conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── Mirror ──

    /// Replace the mirrored declarations overlapping `[since, until]`.
    ///
    /// Deletes every stored record whose own period overlaps the window, then
    /// inserts `fetched` (pairs of account id and the records fetched through
    /// it). Both steps run in one transaction: any failure rolls back the
    /// delete as well. Records missing a key field are not stored.
    ///
    /// Returns the number of inserted rows.
    pub fn overwrite_mirror(
        &mut self,
        window: &SyncWindow,
        fetched: &[(i64, Vec<CanonicalRecord>)],
    ) -> Result<usize, StoreError> {
        let since = format_minute(&window.since);
        let until = format_minute(&window.until);
        let fetched_at = Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM remote_agreements WHERE rental_start_at <= ? AND rental_end_at >= ?",
            params![until, since],
        )?;

        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO remote_agreements (
                    agreement_no, plate_type, plate_number, rental_kind, signed_at,
                    rental_start_at, rental_end_at, id_doc_type, id_doc_no, driver_name,
                    account_id, fetched_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (account_id, records) in fetched {
                for record in records {
                    let (Some(start), Some(end), true) = (
                        record.rental_start_at,
                        record.rental_end_at,
                        record.is_eligible(),
                    ) else {
                        debug!(agreement_no = %record.agreement_no, "not mirroring record without key fields");
                        continue;
                    };
                    stmt.execute(params![
                        record.agreement_no,
                        record.plate_type,
                        record.plate_number,
                        record.rental_kind,
                        record.signed_at.as_ref().map(format_minute),
                        format_minute(&start),
                        format_minute(&end),
                        record.id_doc_type,
                        record.id_doc_no,
                        record.driver_name,
                        *account_id,
                        fetched_at,
                    ])?;
                    inserted += 1;
                }
            }
        }
        tx.commit()?;

        info!(deleted, inserted, since = %since, until = %until, "mirror overwritten");
        Ok(inserted)
    }

    /// Mirrored records whose period overlaps `[since, until]`.
    pub fn mirror_records(
        &self,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<CanonicalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT agreement_no, plate_type, plate_number, rental_kind, signed_at,
                    rental_start_at, rental_end_at, id_doc_type, id_doc_no, driver_name
             FROM remote_agreements
             WHERE rental_start_at <= ? AND rental_end_at >= ?
             ORDER BY agreement_no, rental_start_at, plate_number",
        )?;
        let rows = stmt.query_map(params![format_minute(&until), format_minute(&since)], |row| {
            Ok(MirrorRow {
                agreement_no: row.get(0)?,
                plate_type: row.get(1)?,
                plate_number: row.get(2)?,
                rental_kind: row.get(3)?,
                signed_at: row.get(4)?,
                rental_start_at: row.get(5)?,
                rental_end_at: row.get(6)?,
                id_doc_type: row.get(7)?,
                id_doc_no: row.get(8)?,
                driver_name: row.get(9)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        debug!(count = records.len(), "read mirror records");
        Ok(records)
    }

    // ── Contract tables ──

    /// External accounts with the "sync rental agreements" capability enabled.
    pub fn sync_accounts(&self) -> Result<Vec<ExternalAccount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, scope, base_url, session, sync_rental_agreements
             FROM external_accounts
             WHERE sync_rental_agreements
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                name: row.get(1)?,
                scope: row.get(2)?,
                base_url: row.get(3)?,
                session: row.get(4)?,
                sync_rental_agreements: row.get(5)?,
            })
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?.into_account()?);
        }
        Ok(accounts)
    }

    /// Every agreement whose contracted period overlaps `[since, until]`,
    /// with vehicle, bound account and customer loaded.
    ///
    /// Agreements with a missing start or end date are always returned so
    /// that validation can report them.
    pub fn agreements_overlapping(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<Agreement>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.agreement_no, a.status, a.rental_kind,
                    CAST(a.start_date AS VARCHAR), CAST(a.end_date AS VARCHAR),
                    CAST(a.terminated_on AS VARCHAR), CAST(a.signed_at AS VARCHAR),
                    v.id, v.plate_type, v.plate_number,
                    x.id, x.name, x.scope, x.base_url, x.session, x.sync_rental_agreements,
                    c.id, c.name, c.id_doc_no
             FROM rental_agreements a
             LEFT JOIN vehicles v ON v.id = a.vehicle_id
             LEFT JOIN external_accounts x ON x.id = v.account_id
             LEFT JOIN customers c ON c.id = a.customer_id
             WHERE a.start_date IS NULL
                OR a.end_date IS NULL
                OR (a.start_date <= CAST(? AS DATE) AND a.end_date >= CAST(? AS DATE))
             ORDER BY a.id",
        )?;
        let until = until.format("%Y-%m-%d").to_string();
        let since = since.format("%Y-%m-%d").to_string();
        let rows = stmt.query_map(params![until, since], |row| {
            Ok(AgreementRow {
                id: row.get(0)?,
                agreement_no: row.get(1)?,
                status: row.get(2)?,
                rental_kind: row.get(3)?,
                start_date: row.get(4)?,
                end_date: row.get(5)?,
                terminated_on: row.get(6)?,
                signed_at: row.get(7)?,
                vehicle_id: row.get(8)?,
                plate_type: row.get(9)?,
                plate_number: row.get(10)?,
                account: match row.get::<_, Option<i64>>(11)? {
                    Some(id) => Some(AccountRow {
                        id,
                        name: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                        scope: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                        base_url: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                        session: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
                        sync_rental_agreements: row.get::<_, Option<bool>>(16)?.unwrap_or(false),
                    }),
                    None => None,
                },
                customer_id: row.get(17)?,
                customer_name: row.get(18)?,
                id_doc_no: row.get(19)?,
            })
        })?;

        let mut agreements = Vec::new();
        for row in rows {
            agreements.push(row?.into_agreement()?);
        }
        info!(count = agreements.len(), "loaded agreements overlapping window");
        Ok(agreements)
    }

    /// Access the underlying DuckDB connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ── Row decoding ──

struct MirrorRow {
    agreement_no: String,
    plate_type: String,
    plate_number: String,
    rental_kind: String,
    signed_at: Option<String>,
    rental_start_at: String,
    rental_end_at: String,
    id_doc_type: String,
    id_doc_no: String,
    driver_name: Option<String>,
}

impl MirrorRow {
    fn into_record(self) -> Result<CanonicalRecord, StoreError> {
        let minute = |column: &'static str, value: &str| {
            parse_minute(value).ok_or_else(|| StoreError::Malformed {
                table: MIRROR_TABLE,
                column,
                value: value.to_string(),
            })
        };
        let signed_at = match self.signed_at.as_deref() {
            Some(value) => Some(minute("signed_at", value)?),
            None => None,
        };
        Ok(CanonicalRecord {
            rental_start_at: Some(minute("rental_start_at", &self.rental_start_at)?),
            rental_end_at: Some(minute("rental_end_at", &self.rental_end_at)?),
            signed_at,
            agreement_no: self.agreement_no,
            plate_type: self.plate_type,
            plate_number: self.plate_number,
            rental_kind: self.rental_kind,
            id_doc_type: self.id_doc_type,
            id_doc_no: self.id_doc_no,
            driver_name: self.driver_name,
        })
    }
}

struct AccountRow {
    id: i64,
    name: String,
    scope: String,
    base_url: String,
    session: String,
    sync_rental_agreements: bool,
}

impl AccountRow {
    fn into_account(self) -> Result<ExternalAccount, StoreError> {
        let scope = self.scope.parse().map_err(|_| StoreError::Malformed {
            table: "external_accounts",
            column: "scope",
            value: self.scope.clone(),
        })?;
        Ok(ExternalAccount {
            id: self.id,
            name: self.name,
            scope,
            base_url: self.base_url,
            session: self.session,
            sync_rental_agreements: self.sync_rental_agreements,
        })
    }
}

struct AgreementRow {
    id: i64,
    agreement_no: Option<String>,
    status: String,
    rental_kind: String,
    start_date: Option<String>,
    end_date: Option<String>,
    terminated_on: Option<String>,
    signed_at: Option<String>,
    vehicle_id: Option<i64>,
    plate_type: Option<String>,
    plate_number: Option<String>,
    account: Option<AccountRow>,
    customer_id: Option<i64>,
    customer_name: Option<String>,
    id_doc_no: Option<String>,
}

fn parse_date(column: &'static str, value: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|_| StoreError::Malformed {
                table: "rental_agreements",
                column,
                value: v,
            })
        })
        .transpose()
}

fn parse_timestamp(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<NaiveDateTime>, StoreError> {
    value
        .map(|v| {
            NaiveDateTime::parse_from_str(&v, "%Y-%m-%d %H:%M:%S%.f").map_err(|_| {
                StoreError::Malformed {
                    table: "rental_agreements",
                    column,
                    value: v,
                }
            })
        })
        .transpose()
}

impl AgreementRow {
    fn into_agreement(self) -> Result<Agreement, StoreError> {
        let status: AgreementStatus = self.status.parse().map_err(|_| StoreError::Malformed {
            table: "rental_agreements",
            column: "status",
            value: self.status.clone(),
        })?;
        let account = self.account.map(AccountRow::into_account).transpose()?;
        let vehicle = self.vehicle_id.map(|_| Vehicle {
            plate_type: self.plate_type,
            plate_number: self.plate_number,
            account,
        });
        let customer = self.customer_id.map(|_| Customer {
            name: self.customer_name,
            id_doc_no: self.id_doc_no,
        });
        Ok(Agreement {
            id: self.id,
            agreement_no: self.agreement_no,
            status,
            rental_kind: self.rental_kind,
            start_date: parse_date("start_date", self.start_date)?,
            end_date: parse_date("end_date", self.end_date)?,
            terminated_on: parse_date("terminated_on", self.terminated_on)?,
            signed_at: parse_timestamp("signed_at", self.signed_at)?,
            vehicle,
            customer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentsync_core::AccountScope;

    fn ts(s: &str) -> NaiveDateTime {
        parse_minute(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn store() -> DuckStore {
        let store = DuckStore::open().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn window(since: &str, until: &str) -> SyncWindow {
        SyncWindow::resolve(Some(date(since)), Some(date(until)), ts("2024-03-20 12:00")).unwrap()
    }

    fn record(no: &str, start: &str, end: &str) -> CanonicalRecord {
        CanonicalRecord {
            agreement_no: no.into(),
            plate_type: "02".into(),
            plate_number: "B12345".into(),
            rental_kind: "1".into(),
            signed_at: Some(ts(start)),
            rental_start_at: Some(ts(start)),
            rental_end_at: Some(ts(end)),
            id_doc_type: "A".into(),
            id_doc_no: "440301199001011234".into(),
            driver_name: Some("Zhang San".into()),
        }
    }

    fn seed_contracts(store: &DuckStore) {
        store
            .connection()
            .execute_batch(
                "INSERT INTO external_accounts VALUES
                    (1, 'Shenzhen fleet', 'organization', 'https://gd.platform.test', 'JSESSIONID=0123456789abcdef', true),
                    (2, 'Old login', 'individual', 'https://gd.platform.test', '', false);
                 INSERT INTO customers VALUES (1, 'Zhang San', '440301199001011234'), (2, NULL, NULL);
                 INSERT INTO vehicles VALUES (1, '02', '粤B12345', 1), (2, '02', '粤B67890', 2), (3, NULL, NULL, NULL);
                 INSERT INTO rental_agreements VALUES
                    (1, 'ZL001', 1, 1, 'signed', '1', DATE '2024-01-15', DATE '2024-03-10', NULL, TIMESTAMP '2024-01-14 16:45:30'),
                    (2, 'ZL002', 2, 2, 'cancelled', '1', DATE '2024-02-01', DATE '2024-02-20', NULL, NULL),
                    (3, 'ZL003', 1, 3, 'early_terminated', '2', DATE '2023-11-01', DATE '2024-06-30', DATE '2024-01-31', NULL),
                    (4, NULL, NULL, NULL, 'pending', '1', NULL, NULL, NULL, NULL),
                    (5, 'ZL005', 1, 1, 'completed', '1', DATE '2022-01-01', DATE '2022-12-31', NULL, NULL);",
            )
            .unwrap();
    }

    #[test]
    fn open_in_memory() {
        let store = DuckStore::open().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.mirror_count().unwrap(), 0);
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let store = store();
        store.ensure_schema().unwrap();
        assert_eq!(store.mirror_count().unwrap(), 0);
    }

    #[test]
    fn overwrite_then_read_back() {
        let mut store = store();
        let w = window("2024-01-01", "2024-03-31");
        let fetched = vec![(
            1,
            vec![
                record("ZL001", "2024-01-15 00:00", "2024-01-31 23:59"),
                record("ZL001", "2024-02-01 00:00", "2024-02-29 23:59"),
            ],
        )];
        assert_eq!(store.overwrite_mirror(&w, &fetched).unwrap(), 2);

        let records = store.mirror_records(w.since, w.compare_until).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], fetched[0].1[0]);
        assert_eq!(records[1].rental_start_at, Some(ts("2024-02-01 00:00")));
    }

    #[test]
    fn overwrite_replaces_only_overlapping_rows() {
        let mut store = store();
        let old = vec![(
            1,
            vec![
                record("ZL-OLD", "2023-06-01 00:00", "2023-06-30 23:59"),
                record("ZL-STALE", "2024-02-01 00:00", "2024-02-29 23:59"),
            ],
        )];
        store
            .overwrite_mirror(&window("2023-01-01", "2024-03-31"), &old)
            .unwrap();

        let fresh = vec![(1, vec![record("ZL-NEW", "2024-02-01 00:00", "2024-02-29 23:59")])];
        store
            .overwrite_mirror(&window("2024-01-01", "2024-03-31"), &fresh)
            .unwrap();

        let all = store
            .mirror_records(ts("2000-01-01 00:00"), ts("2099-12-31 23:59"))
            .unwrap();
        let numbers: Vec<_> = all.iter().map(|r| r.agreement_no.as_str()).collect();
        assert_eq!(numbers, vec!["ZL-NEW", "ZL-OLD"]);
    }

    #[test]
    fn overwrite_skips_records_without_key_fields() {
        let mut store = store();
        let mut broken = record("ZL001", "2024-01-15 00:00", "2024-01-31 23:59");
        broken.plate_number.clear();
        let fetched = vec![(1, vec![broken, record("ZL002", "2024-01-15 00:00", "2024-01-31 23:59")])];
        assert_eq!(
            store
                .overwrite_mirror(&window("2024-01-01", "2024-03-31"), &fetched)
                .unwrap(),
            1
        );
        assert_eq!(store.mirror_count().unwrap(), 1);
    }

    #[test]
    fn failed_insert_rolls_back_delete() {
        let mut store = DuckStore::open().unwrap();
        // Same columns as the real mirror, plus a constraint the test can trip.
        store
            .connection()
            .execute_batch(&MIRROR_DDL.replace(
                "fetched_at       VARCHAR NOT NULL",
                "fetched_at       VARCHAR NOT NULL, CHECK (plate_number <> 'BOOM')",
            ))
            .unwrap();
        let w = window("2024-01-01", "2024-03-31");
        store
            .overwrite_mirror(&w, &[(1, vec![record("ZL001", "2024-01-15 00:00", "2024-01-31 23:59")])])
            .unwrap();

        let mut bad = record("ZL002", "2024-02-01 00:00", "2024-02-29 23:59");
        bad.plate_number = "BOOM".into();
        let good = record("ZL003", "2024-02-01 00:00", "2024-02-29 23:59");
        assert!(store.overwrite_mirror(&w, &[(1, vec![good, bad])]).is_err());

        let records = store.mirror_records(w.since, w.until).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agreement_no, "ZL001");
    }

    #[test]
    fn sync_accounts_filters_disabled() {
        let store = store();
        seed_contracts(&store);
        let accounts = store.sync_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, 1);
        assert_eq!(accounts[0].scope, AccountScope::Organization);
        assert_eq!(accounts[0].session, "JSESSIONID=0123456789abcdef");
    }

    #[test]
    fn agreements_load_with_relations() {
        let store = store();
        seed_contracts(&store);
        let agreements = store
            .agreements_overlapping(date("2024-01-01"), date("2024-03-31"))
            .unwrap();
        let ids: Vec<_> = agreements.iter().map(|a| a.id).collect();
        // 5 ended in 2022; 4 has no dates and is kept for validation.
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let first = &agreements[0];
        assert_eq!(first.status, AgreementStatus::Signed);
        assert_eq!(first.start_date, Some(date("2024-01-15")));
        assert_eq!(
            first.signed_at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            Some("2024-01-14 16:45:30".to_string())
        );
        let vehicle = first.vehicle.as_ref().unwrap();
        assert_eq!(vehicle.plate_number.as_deref(), Some("粤B12345"));
        assert!(vehicle.account.as_ref().unwrap().sync_rental_agreements);
        assert_eq!(
            first.customer.as_ref().unwrap().name.as_deref(),
            Some("Zhang San")
        );

        let cancelled = &agreements[1];
        assert_eq!(cancelled.status, AgreementStatus::Cancelled);
        assert!(!cancelled.bound_account().unwrap().sync_rental_agreements);

        let terminated = &agreements[2];
        assert_eq!(terminated.terminated_on, Some(date("2024-01-31")));
        assert!(terminated.bound_account().is_none());

        let blank = &agreements[3];
        assert!(blank.vehicle.is_none());
        assert!(blank.customer.is_none());
        assert!(blank.agreement_no.is_none());
    }

    #[test]
    fn unknown_status_is_malformed() {
        let store = store();
        store
            .connection()
            .execute_batch(
                "INSERT INTO rental_agreements (id, agreement_no, status, start_date, end_date)
                 VALUES (9, 'ZL009', 'archived', DATE '2024-01-01', DATE '2024-01-31');",
            )
            .unwrap();
        let err = store
            .agreements_overlapping(date("2024-01-01"), date("2024-03-31"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { column: "status", .. }));
    }

    // ── Persistent storage tests ──

    #[test]
    fn persistent_mirror_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("rentsync.duckdb");
        let w = window("2024-01-01", "2024-03-31");

        let mut store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(db_path.exists());
        store.ensure_schema().unwrap();
        store
            .overwrite_mirror(&w, &[(1, vec![record("ZL001", "2024-01-15 00:00", "2024-01-31 23:59")])])
            .unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert_eq!(store.mirror_count().unwrap(), 1);
        let records = store.mirror_records(w.since, w.compare_until).unwrap();
        assert_eq!(records[0].agreement_no, "ZL001");
    }
}
