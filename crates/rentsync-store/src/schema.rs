//! Table definitions.
//!
//! `remote_agreements` is owned by this crate. The other four tables belong
//! to the contract management side; the definitions below only cover the
//! columns the reconciler reads and are created when absent so that a fresh
//! database is usable.

/// Mirror of the platform's declarations. Timestamps are stored as
/// `YYYY-MM-DD HH:MM` text so that overlap predicates compare lexically.
pub const MIRROR_TABLE: &str = "remote_agreements";

pub const MIRROR_DDL: &str = "
CREATE TABLE IF NOT EXISTS remote_agreements (
    agreement_no     VARCHAR NOT NULL,
    plate_type       VARCHAR NOT NULL,
    plate_number     VARCHAR NOT NULL,
    rental_kind      VARCHAR NOT NULL DEFAULT '',
    signed_at        VARCHAR,
    rental_start_at  VARCHAR NOT NULL,
    rental_end_at    VARCHAR NOT NULL,
    id_doc_type      VARCHAR NOT NULL DEFAULT '',
    id_doc_no        VARCHAR NOT NULL DEFAULT '',
    driver_name      VARCHAR,
    account_id       BIGINT,
    fetched_at       VARCHAR NOT NULL
);
";

pub const CONTRACT_DDL: &str = "
CREATE TABLE IF NOT EXISTS external_accounts (
    id                      BIGINT PRIMARY KEY,
    name                    VARCHAR NOT NULL,
    scope                   VARCHAR NOT NULL DEFAULT 'organization',
    base_url                VARCHAR NOT NULL,
    session                 VARCHAR NOT NULL DEFAULT '',
    sync_rental_agreements  BOOLEAN NOT NULL DEFAULT false
);

CREATE TABLE IF NOT EXISTS customers (
    id         BIGINT PRIMARY KEY,
    name       VARCHAR,
    id_doc_no  VARCHAR
);

CREATE TABLE IF NOT EXISTS vehicles (
    id            BIGINT PRIMARY KEY,
    plate_type    VARCHAR,
    plate_number  VARCHAR,
    account_id    BIGINT
);

CREATE TABLE IF NOT EXISTS rental_agreements (
    id             BIGINT PRIMARY KEY,
    agreement_no   VARCHAR,
    customer_id    BIGINT,
    vehicle_id     BIGINT,
    status         VARCHAR NOT NULL,
    rental_kind    VARCHAR NOT NULL DEFAULT '1',
    start_date     DATE,
    end_date       DATE,
    terminated_on  DATE,
    signed_at      TIMESTAMP
);
";
