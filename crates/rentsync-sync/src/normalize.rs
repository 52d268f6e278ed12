//! Normalisation of raw platform rows into [`CanonicalRecord`]s.
//!
//! Provincial deployments of the platform name the same field differently:
//! some return camelCase English names, others pinyin abbreviations of the
//! Chinese column names (`hphm` for 号牌号码, plate number). Each logical
//! attribute therefore has an ordered list of candidate keys; the first
//! candidate holding a non-empty value wins.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rentsync_core::record::truncate_to_minute;
use rentsync_core::{CanonicalRecord, normalize_plate};
use serde_json::{Map, Value};
use tracing::debug;

const AGREEMENT_NO: &[&str] = &["contractNo", "agreementNo", "htbh"];
const PLATE_TYPE: &[&str] = &["plateType", "hpzl"];
const PLATE_NUMBER: &[&str] = &["plateNumber", "plateNo", "hphm"];
const RENTAL_KIND: &[&str] = &["rentalType", "zllx"];
const SIGNED_AT: &[&str] = &["signedAt", "signTime", "qdsj"];
const RENTAL_START_AT: &[&str] = &["rentalStartAt", "rentalStartTime", "zlkssj"];
const RENTAL_END_AT: &[&str] = &["rentalEndAt", "rentalEndTime", "zljssj"];
const ID_DOC_TYPE: &[&str] = &["idDocType", "sfzmmc"];
const ID_DOC_NO: &[&str] = &["idDocNo", "sfzmhm"];
const DRIVER_NAME: &[&str] = &["driverName", "jsrxm", "xm"];

/// Date-time layouts seen in platform responses, most specific first.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%d%H%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Which end of a day a bare date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEdge {
    Start,
    End,
}

/// The first non-empty candidate value, rendered as trimmed text.
fn text(row: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

/// The first non-empty candidate value, parsed as a timestamp.
///
/// An unparseable value yields `None`; later candidates are not consulted.
fn timestamp(row: &Map<String, Value>, candidates: &[&str], edge: DayEdge) -> Option<NaiveDateTime> {
    let value = candidates.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::Null => None,
        v => Some(v),
    })?;
    match value {
        Value::String(s) => parse_timestamp(s, edge),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

/// Epoch seconds or milliseconds, interpreted in local time.
fn from_epoch(value: i64) -> Option<NaiveDateTime> {
    let dt = if value.abs() >= 100_000_000_000 {
        Local.timestamp_millis_opt(value).single()?
    } else {
        Local.timestamp_opt(value, 0).single()?
    };
    Some(truncate_to_minute(dt.naive_local()))
}

/// Parse a textual timestamp to minute precision.
///
/// A bare date resolves to 00:00 for [`DayEdge::Start`] and to 23:59 for
/// [`DayEdge::End`].
pub fn parse_timestamp(value: &str, edge: DayEdge) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(truncate_to_minute(dt.naive_local()));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(truncate_to_minute(dt));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(day) = NaiveDate::parse_from_str(value, format) {
            let time = match edge {
                DayEdge::Start => NaiveTime::MIN,
                DayEdge::End => NaiveTime::from_hms_opt(23, 59, 0)?,
            };
            return Some(day.and_time(time));
        }
    }
    None
}

/// Map one raw row onto the canonical shape.
///
/// Returns `None` for anything that is not an object or lacks one of the key
/// fields (agreement number, plate type, plate number, rental start and end).
pub fn normalize_row(row: &Value) -> Option<CanonicalRecord> {
    let row = row.as_object()?;
    let record = CanonicalRecord {
        agreement_no: text(row, AGREEMENT_NO)?,
        plate_type: text(row, PLATE_TYPE)?,
        plate_number: normalize_plate(&text(row, PLATE_NUMBER)?),
        rental_kind: text(row, RENTAL_KIND).unwrap_or_default(),
        signed_at: timestamp(row, SIGNED_AT, DayEdge::Start),
        rental_start_at: Some(timestamp(row, RENTAL_START_AT, DayEdge::Start)?),
        rental_end_at: Some(timestamp(row, RENTAL_END_AT, DayEdge::End)?),
        id_doc_type: text(row, ID_DOC_TYPE).unwrap_or_default(),
        id_doc_no: text(row, ID_DOC_NO).unwrap_or_default(),
        driver_name: text(row, DRIVER_NAME),
    };
    record.is_eligible().then_some(record)
}

/// Normalise a page of rows, silently dropping malformed ones.
pub fn normalize_rows(rows: &[Value]) -> Vec<CanonicalRecord> {
    let records: Vec<CanonicalRecord> = rows.iter().filter_map(normalize_row).collect();
    let dropped = rows.len() - records.len();
    if dropped > 0 {
        debug!(dropped, kept = records.len(), "dropped malformed remote rows");
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentsync_core::record::format_minute;
    use serde_json::json;

    fn minute(ts: Option<NaiveDateTime>) -> String {
        format_minute(&ts.unwrap())
    }

    #[test]
    fn camel_case_row() {
        let row = json!({
            "contractNo": " ZL2024001 ",
            "plateType": "02",
            "plateNumber": "粤B12345",
            "rentalType": 1,
            "signedAt": "2024-01-10 09:30:15",
            "rentalStartAt": "2024-01-15 00:00:00",
            "rentalEndAt": "2024-01-31 23:59:00",
            "idDocType": "A",
            "idDocNo": "440301199001011234",
            "driverName": "张三"
        });
        let r = normalize_row(&row).unwrap();
        assert_eq!(r.agreement_no, "ZL2024001");
        assert_eq!(r.plate_number, "B12345");
        assert_eq!(r.rental_kind, "1");
        assert_eq!(minute(r.signed_at), "2024-01-10 09:30");
        assert_eq!(minute(r.rental_start_at), "2024-01-15 00:00");
        assert_eq!(minute(r.rental_end_at), "2024-01-31 23:59");
        assert_eq!(r.driver_name.as_deref(), Some("张三"));
    }

    #[test]
    fn abbreviated_row() {
        let row = json!({
            "htbh": "ZL2024002",
            "hpzl": "02",
            "hphm": "B54321",
            "zllx": "2",
            "zlkssj": "20240201",
            "zljssj": "20240229",
            "sfzmmc": "A",
            "sfzmhm": "440301199001015678"
        });
        let r = normalize_row(&row).unwrap();
        assert_eq!(r.agreement_no, "ZL2024002");
        assert_eq!(r.plate_number, "B54321");
        assert_eq!(minute(r.rental_start_at), "2024-02-01 00:00");
        assert_eq!(minute(r.rental_end_at), "2024-02-29 23:59");
        assert!(r.signed_at.is_none());
        assert!(r.driver_name.is_none());
    }

    #[test]
    fn first_non_empty_candidate_wins() {
        let row = json!({
            "contractNo": "   ",
            "htbh": "ZL-FROM-ABBR",
            "plateType": null,
            "hpzl": "52",
            "plateNumber": "B1",
            "rentalStartAt": "2024-01-01 00:00",
            "rentalEndAt": "2024-01-31 23:59"
        });
        let r = normalize_row(&row).unwrap();
        assert_eq!(r.agreement_no, "ZL-FROM-ABBR");
        assert_eq!(r.plate_type, "52");
    }

    #[test]
    fn unparseable_date_drops_row() {
        let row = json!({
            "contractNo": "ZL1",
            "plateType": "02",
            "plateNumber": "B1",
            "rentalStartAt": "not a date",
            "zlkssj": "2024-01-01 00:00",
            "rentalEndAt": "2024-01-31 23:59"
        });
        assert!(normalize_row(&row).is_none());
    }

    #[test]
    fn missing_required_field_drops_row() {
        let row = json!({
            "contractNo": "ZL1",
            "plateType": "02",
            "rentalStartAt": "2024-01-01 00:00",
            "rentalEndAt": "2024-01-31 23:59"
        });
        assert!(normalize_row(&row).is_none());
        assert!(normalize_row(&json!("not an object")).is_none());
    }

    #[test]
    fn timestamp_layouts() {
        let cases = [
            ("2024-03-05 08:07", "2024-03-05 08:07"),
            ("2024-03-05T08:07:59", "2024-03-05 08:07"),
            ("2024-03-05 08:07:59.250", "2024-03-05 08:07"),
            ("2024/03/05 08:07:00", "2024-03-05 08:07"),
            ("202403050807", "2024-03-05 08:07"),
            ("2024-03-05T08:07:00+08:00", "2024-03-05 08:07"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                minute(parse_timestamp(input, DayEdge::Start)),
                expected,
                "input {input}"
            );
        }
        assert_eq!(
            minute(parse_timestamp("2024/03/05", DayEdge::End)),
            "2024-03-05 23:59"
        );
        assert!(parse_timestamp("05.03.2024", DayEdge::Start).is_none());
    }

    #[test]
    fn epoch_millis_are_local_time() {
        let expected = Local
            .with_ymd_and_hms(2024, 1, 15, 8, 30, 0)
            .single()
            .unwrap();
        let row = json!({
            "contractNo": "ZL1",
            "plateType": "02",
            "plateNumber": "B1",
            "rentalStartAt": expected.timestamp_millis(),
            "rentalEndAt": "2024-01-31 23:59"
        });
        let r = normalize_row(&row).unwrap();
        assert_eq!(minute(r.rental_start_at), "2024-01-15 08:30");
    }

    #[test]
    fn normalize_rows_keeps_valid_only() {
        let rows = vec![
            json!({"contractNo": "ZL1", "plateType": "02", "plateNumber": "B1",
                   "rentalStartAt": "2024-01-01 00:00", "rentalEndAt": "2024-01-31 23:59"}),
            json!({"contractNo": "ZL2"}),
            json!(null),
        ];
        let records = normalize_rows(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agreement_no, "ZL1");
    }
}
