//! Backend row decoding.
//!
//! Every relational backend row is read into [`SqlValue`] slots without
//! per-column static typing:
//! 1. `TypeCategory` classifies the column's declared type
//! 2. database-specific decoders extract the value for that category
//!
//! SQLite is dynamically typed, so its rows are decoded by the storage class
//! of each value rather than the declared column type.
//!
//! A value that cannot be decoded is a scan failure, never a silent NULL.

use crate::db::value::SqlValue;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Generic access to one row of a result set.
pub trait DecodeRow {
    /// Column names in declared order.
    fn column_names(&self) -> Vec<String>;

    /// Decode the value in column `idx`.
    fn decode_value(&self, idx: usize) -> DbResult<SqlValue>;
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    UnsignedInteger,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    DateTime,
    /// Timestamp carrying a zone offset (PostgreSQL TIMESTAMPTZ)
    DateTimeTz,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let unsigned = lower.ends_with(" unsigned");
    let base = lower.trim_end_matches(" unsigned");

    if base.contains("decimal") || base.contains("numeric") {
        // SQLite's NUMERIC affinity holds plain numbers
        if db == DatabaseType::SQLite && base == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    match base {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "int2" | "int4"
        | "int8" | "serial" | "smallserial" | "bigserial" | "year" => {
            if unsigned {
                TypeCategory::UnsignedInteger
            } else {
                TypeCategory::Integer
            }
        }
        "bool" | "boolean" => TypeCategory::Boolean,
        "float" | "double" | "real" | "float4" | "float8" | "double precision" => {
            TypeCategory::Float
        }
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" | "bit" => TypeCategory::Binary,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "datetime" | "timestamp" => TypeCategory::DateTime,
        "timestamptz" => TypeCategory::DateTimeTz,
        _ if base.contains("blob") || base.contains("binary") => TypeCategory::Binary,
        _ => TypeCategory::Text,
    }
}

/// Represent an unsigned integer, falling back to text beyond `i64::MAX`.
fn unsigned_value(v: u64) -> SqlValue {
    i64::try_from(v)
        .map(SqlValue::Int)
        .unwrap_or_else(|_| SqlValue::Text(v.to_string()))
}

fn scan_error(idx: usize, column: &str, type_name: &str, err: sqlx::Error) -> DbError {
    DbError::materialization(format!(
        "failed to scan column {} '{}' ({}): {}",
        idx, column, type_name, err
    ))
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value kept in its exact textual form.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, BoxDynError> {
        // MySQL sends DECIMAL as a length-encoded string in both protocols
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("NUMERIC")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            PgValueFormat::Binary => Ok(RawDecimal(numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render a binary PostgreSQL NUMERIC (base-10000 digit groups) as text.
fn numeric_to_string(buf: &[u8]) -> Result<String, BoxDynError> {
    use std::fmt::Write as _;

    if buf.len() < 8 {
        return Err("NUMERIC payload too short".into());
    }
    let ndigits = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let weight = i16::from_be_bytes([buf[2], buf[3]]) as i32;
    let sign = u16::from_be_bytes([buf[4], buf[5]]);
    let dscale = u16::from_be_bytes([buf[6], buf[7]]) as usize;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if buf.len() != 8 + ndigits * 2 {
        return Err("NUMERIC digit count does not match payload".into());
    }
    let digits: Vec<u16> = buf[8..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let group = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", group(i));
            } else {
                let _ = write!(out, "{:04}", group(i));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", group(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

// =============================================================================
// DecodeRow implementations
// =============================================================================

impl DecodeRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let column = self.try_column(idx)?;
        let type_name = column.type_info().name();
        let is_null = self.try_get_raw(idx)?.is_null();
        if is_null {
            return Ok(SqlValue::Null);
        }
        let category = categorize_type(type_name, DatabaseType::MySQL);
        mysql::decode_column(self, idx, category)
            .map_err(|e| scan_error(idx, column.name(), type_name, e))
    }
}

impl DecodeRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let column = self.try_column(idx)?;
        let type_name = column.type_info().name();
        let raw = self.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let text_format = raw.format() == PgValueFormat::Text;
        let category = categorize_type(type_name, DatabaseType::PostgreSQL);
        postgres::decode_column(self, idx, type_name, category, text_format)
            .map_err(|e| scan_error(idx, column.name(), type_name, e))
    }
}

impl DecodeRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn decode_value(&self, idx: usize) -> DbResult<SqlValue> {
        let column = self.try_column(idx)?;
        let declared = column.type_info().name();
        let raw = self.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage = raw.type_info().name().to_string();
        sqlite::decode_column(self, idx, declared, &storage)
            .map_err(|e| scan_error(idx, column.name(), declared, e))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use sqlx::mysql::types::MySqlTime;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        category: TypeCategory,
    ) -> Result<SqlValue, sqlx::Error> {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::UnsignedInteger => decode_unsigned(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .map(|v| SqlValue::Text(v.0)),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::DateTime | TypeCategory::DateTimeTz => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|v| SqlValue::Text(v.to_string()))
                .or_else(|_| decode_raw_temporal(row, idx, true)),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| SqlValue::Text(v.to_string()))
                .or_else(|_| decode_raw_temporal(row, idx, false)),
            TypeCategory::Time => decode_time(row, idx),
            TypeCategory::Uuid | TypeCategory::Text => decode_text(row, idx),
        }
    }

    /// TIME is a signed duration up to 838:59:59, not a time of day.
    fn decode_time(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Ok(SqlValue::Text(v.to_string()));
        }
        if let Ok(v) = row.try_get::<MySqlTime, _>(idx) {
            return Ok(SqlValue::Text(v.to_string()));
        }
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .map(SqlValue::Bytes)
    }

    /// Zero dates and other values chrono rejects.
    fn decode_raw_temporal(
        row: &MySqlRow,
        idx: usize,
        with_time: bool,
    ) -> Result<SqlValue, sqlx::Error> {
        let raw = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
        Ok(match binary_datetime_to_string(&raw, with_time) {
            Some(text) => SqlValue::Text(text),
            // Text-protocol values are already readable
            None => SqlValue::Bytes(raw),
        })
    }

    /// Render a binary-protocol DATE/DATETIME (length-prefixed fields).
    pub(super) fn binary_datetime_to_string(buf: &[u8], with_time: bool) -> Option<String> {
        let (&len, rest) = buf.split_first()?;
        if rest.len() != usize::from(len) {
            return None;
        }
        let (year, month, day) = match len {
            0 => (0, 0, 0),
            4 | 7 | 11 => (u16::from_le_bytes([rest[0], rest[1]]), rest[2], rest[3]),
            _ => return None,
        };
        let mut out = format!("{year:04}-{month:02}-{day:02}");
        if with_time {
            let (hour, minute, second) = match len {
                7 | 11 => (rest[4], rest[5], rest[6]),
                _ => (0, 0, 0),
            };
            out.push_str(&format!(" {hour:02}:{minute:02}:{second:02}"));
            if len == 11 {
                let micros = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]);
                if micros > 0 {
                    out.push_str(&format!(".{micros:06}"));
                }
            }
        }
        Some(out)
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(SqlValue::Int(v));
        }
        // YEAR and friends arrive unsigned
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(unsigned_value(v));
        }
        row.try_get::<u16, _>(idx).map(|v| SqlValue::Int(v.into()))
    }

    fn decode_unsigned(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        row.try_get::<u64, _>(idx).map(unsigned_value)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(SqlValue::Float(v));
        }
        row.try_get::<f32, _>(idx).map(|v| SqlValue::Float(v.into()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(SqlValue::Text(v));
        }
        // ENUM, SET, GEOMETRY and other types without a typed decoder
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .map(SqlValue::Bytes)
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
    use std::fmt::Write as _;
    use std::net::{Ipv4Addr, Ipv6Addr};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
        text_format: bool,
    ) -> Result<SqlValue, sqlx::Error> {
        let decoded = decode_typed(row, idx, type_name, category, text_format);
        match decoded {
            // Simple-protocol results are always textual, whatever the type
            Err(_) if text_format => row.try_get_unchecked::<String, _>(idx).map(SqlValue::Text),
            other => other,
        }
    }

    fn decode_typed(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
        text_format: bool,
    ) -> Result<SqlValue, sqlx::Error> {
        match category {
            TypeCategory::Integer | TypeCategory::UnsignedInteger => decode_integer(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .map(|v| SqlValue::Text(v.0)),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::Uuid => row
                .try_get::<uuid::Uuid, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::DateTime => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::DateTimeTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .map(|v| SqlValue::Text(v.to_rfc3339())),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .map(|v| SqlValue::Text(v.to_string())),
            TypeCategory::Text => decode_text(row, idx, type_name, text_format),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Ok(SqlValue::Int(v.into()));
        }
        row.try_get::<i64, _>(idx).map(SqlValue::Int)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Ok(SqlValue::Float(v.into()));
        }
        row.try_get::<f64, _>(idx).map(SqlValue::Float)
    }

    fn decode_text(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        text_format: bool,
    ) -> Result<SqlValue, sqlx::Error> {
        match row.try_get::<String, _>(idx) {
            Ok(v) => Ok(SqlValue::Text(v)),
            Err(e) if text_format => Err(e),
            Err(_) => match decode_binary_other(row, idx, type_name) {
                Some(value) => Ok(value),
                // XML, CITEXT and friends carry UTF-8 payloads
                None => row
                    .try_get_unchecked::<Vec<u8>, _>(idx)
                    .map(SqlValue::Bytes),
            },
        }
    }

    /// Binary-format types with no dedicated category.
    fn decode_binary_other(row: &PgRow, idx: usize, type_name: &str) -> Option<SqlValue> {
        if let Ok(v) = row.try_get::<PgInterval, _>(idx) {
            return Some(SqlValue::Text(interval_to_string(
                v.months,
                v.days,
                v.microseconds,
            )));
        }
        if let Ok(v) = row.try_get::<PgMoney, _>(idx) {
            return Some(SqlValue::Text(money_to_string(v.0)));
        }
        if let Ok(v) = row.try_get::<Oid, _>(idx) {
            return Some(SqlValue::Int(v.0.into()));
        }
        if matches!(type_name, "INET" | "CIDR") {
            let raw = row.try_get_raw(idx).ok()?;
            return inet_to_string(raw.as_bytes().ok()?, type_name == "CIDR").map(SqlValue::Text);
        }
        decode_array(row, idx).map(SqlValue::Text)
    }

    fn decode_array(row: &PgRow, idx: usize) -> Option<String> {
        fn render<T: ToString>(items: Vec<Option<T>>) -> String {
            array_to_string(items.into_iter().map(|v| v.map(|v| v.to_string())))
        }

        if let Ok(v) = row.try_get::<Vec<Option<String>>, _>(idx) {
            return Some(array_to_string(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<i64>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<i32>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<i16>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<f64>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<f32>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<uuid::Uuid>>, _>(idx) {
            return Some(render(v));
        }
        if let Ok(v) = row.try_get::<Vec<Option<bool>>, _>(idx) {
            let flags = v.into_iter().map(|b| b.map(|b| if b { "t" } else { "f" }));
            return Some(render(flags.collect()));
        }
        None
    }

    /// Render an interval the way the server's default output style does.
    pub(super) fn interval_to_string(months: i32, days: i32, microseconds: i64) -> String {
        let mut parts = Vec::new();
        for (n, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
            if n != 0 {
                let plural = if n == 1 { "" } else { "s" };
                parts.push(format!("{n} {unit}{plural}"));
            }
        }
        if microseconds != 0 || parts.is_empty() {
            let sign = if microseconds < 0 { "-" } else { "" };
            let total = microseconds.unsigned_abs();
            let secs = total / 1_000_000;
            let frac = total % 1_000_000;
            let mut clock = format!(
                "{sign}{:02}:{:02}:{:02}",
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            if frac > 0 {
                let digits = format!("{frac:06}");
                clock.push('.');
                clock.push_str(digits.trim_end_matches('0'));
            }
            parts.push(clock);
        }
        parts.join(" ")
    }

    /// Render MONEY cents with the default `$` symbol and `,` grouping.
    pub(super) fn money_to_string(cents: i64) -> String {
        let sign = if cents < 0 { "-" } else { "" };
        let abs = cents.unsigned_abs();
        let whole = (abs / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        format!("{sign}${grouped}.{:02}", abs % 100)
    }

    /// Render array elements in `{a,b}` literal form.
    pub(super) fn array_to_string(items: impl IntoIterator<Item = Option<String>>) -> String {
        let elements: Vec<String> = items
            .into_iter()
            .map(|item| match item {
                None => "NULL".to_string(),
                Some(v) if needs_quotes(&v) => {
                    format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
                }
                Some(v) => v,
            })
            .collect();
        format!("{{{}}}", elements.join(","))
    }

    fn needs_quotes(v: &str) -> bool {
        v.is_empty()
            || v.eq_ignore_ascii_case("NULL")
            || v
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | ',' | '"' | '\\'))
    }

    /// Render a binary INET/CIDR: family, bits, is_cidr, length, address.
    pub(super) fn inet_to_string(buf: &[u8], cidr: bool) -> Option<String> {
        let [family, bits, _, len, addr @ ..] = buf else {
            return None;
        };
        let (host, max_bits) = match (family, addr.len()) {
            (2, 4) if *len == 4 => {
                let octets: [u8; 4] = addr.try_into().ok()?;
                (Ipv4Addr::from(octets).to_string(), 32)
            }
            (3, 16) if *len == 16 => {
                let octets: [u8; 16] = addr.try_into().ok()?;
                (Ipv6Addr::from(octets).to_string(), 128)
            }
            _ => return None,
        };
        let mut out = host;
        if cidr || *bits != max_bits {
            let _ = write!(out, "/{bits}");
        }
        Some(out)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        declared: &str,
        storage: &str,
    ) -> Result<SqlValue, sqlx::Error> {
        let declared_bool = matches!(
            categorize_type(declared, DatabaseType::SQLite),
            TypeCategory::Boolean
        );
        match storage {
            "INTEGER" if declared_bool => row.try_get::<bool, _>(idx).map(SqlValue::Bool),
            "INTEGER" => row.try_get::<i64, _>(idx).map(SqlValue::Int),
            "REAL" => row.try_get::<f64, _>(idx).map(SqlValue::Float),
            "BLOB" => row.try_get::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
            _ => row.try_get_unchecked::<String, _>(idx).map(SqlValue::Text),
        }
    }
}
