//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! UUIDs are stored as hyphenated lowercase strings, timestamps as RFC 3339,
//! dates as ISO 8601 (`YYYY-MM-DD`). Enums use their snake_case names, except
//! semesters which are stored as `1` or `2`.

use std::str::FromStr;

use campus_core::calendar::Semester;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension as _, ToSql};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
  s.map(decode_date).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Parse a snake_case enum name written by `Display`.
pub fn decode_enum<T: FromStr>(s: &str, what: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn encode_semester(semester: Semester) -> u8 { semester.number() }

pub fn decode_semester(n: u8) -> Result<Semester> {
  match n {
    1 => Ok(Semester::First),
    2 => Ok(Semester::Second),
    other => Err(Error::Decode(format!("unknown semester: {other}"))),
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Run a query selecting a single UUID column.
pub fn query_uuids(
  conn: &Connection,
  sql: &str,
  params: &[&dyn ToSql],
) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare_cached(sql)?;
  let raw = stmt
    .query_map(params, |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raw.iter().map(|s| decode_uuid(s)).collect()
}

/// Whether a query returns at least one row.
pub fn exists(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}
