//! Conversion between PostgreSQL wire values and [`SqlValue`].
//!
//! Rows are read with the binary protocol for the types listed in
//! [`binds_natively`]; every other column is selected as `::text` and bound
//! back through a `::text::<type>` cast. Parameters adapt to the type the
//! server expects, so a masked value that became text (or an integer of a
//! different width) still binds against its column.

use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::core::value::{SqlNullType, SqlValue};

type BoxError = Box<dyn Error + Sync + Send>;

/// Whether a `format_type` rendering is read and bound with its binary encoding.
pub fn binds_natively(data_type: &str) -> bool {
    matches!(
        base_type_name(data_type).as_str(),
        "boolean"
            | "smallint"
            | "integer"
            | "bigint"
            | "real"
            | "double precision"
            | "numeric"
            | "text"
            | "character varying"
            | "character"
            | "name"
            | "uuid"
            | "bytea"
            | "json"
            | "jsonb"
            | "date"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "time without time zone"
    )
}

/// `format_type` output without modifiers: `numeric(10,2)` becomes `numeric`,
/// `timestamp(3) without time zone` becomes `timestamp without time zone`.
fn base_type_name(data_type: &str) -> String {
    let mut out = String::with_capacity(data_type.len());
    let mut depth = 0usize;
    for ch in data_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Typed access to the columns of a result row.
pub trait ColumnSource {
    fn column_count(&self) -> usize;
    fn column_name(&self, idx: usize) -> &str;
    fn column_type(&self, idx: usize) -> &Type;
    /// Decode one column; SQL NULL is `Ok(None)`.
    fn decode<'a, T: FromSql<'a>>(&'a self, idx: usize) -> Result<Option<T>, BoxError>;
}

impl ColumnSource for Row {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn column_name(&self, idx: usize) -> &str {
        self.columns()[idx].name()
    }

    fn column_type(&self, idx: usize) -> &Type {
        self.columns()[idx].type_()
    }

    fn decode<'a, T: FromSql<'a>>(&'a self, idx: usize) -> Result<Option<T>, BoxError> {
        Ok(self.try_get::<_, Option<T>>(idx)?)
    }
}

/// Convert every column of a row.
///
/// A value that cannot be decoded is an error naming the column.
pub fn row_values<R: ColumnSource>(row: &R) -> Result<Vec<SqlValue>, BoxError> {
    (0..row.column_count())
        .map(|idx| {
            column_value(row, idx).map_err(|e| -> BoxError {
                format!(
                    "cannot decode column {} ({}): {}",
                    row.column_name(idx),
                    row.column_type(idx),
                    e
                )
                .into()
            })
        })
        .collect()
}

/// Convert one column of a row by its wire type.
pub fn column_value<R: ColumnSource>(row: &R, idx: usize) -> Result<SqlValue, BoxError> {
    let ty = row.column_type(idx).clone();
    match ty {
        Type::BOOL => decode(row, idx, SqlValue::Bool, SqlNullType::Bool),
        Type::INT2 => decode(row, idx, SqlValue::I16, SqlNullType::I16),
        Type::INT4 => decode(row, idx, SqlValue::I32, SqlNullType::I32),
        Type::INT8 => decode(row, idx, SqlValue::I64, SqlNullType::I64),
        Type::FLOAT4 => decode(row, idx, SqlValue::F32, SqlNullType::F32),
        Type::FLOAT8 => decode(row, idx, SqlValue::F64, SqlNullType::F64),
        Type::NUMERIC => decode(row, idx, SqlValue::Decimal, SqlNullType::Decimal),
        Type::UUID => decode(row, idx, SqlValue::Uuid, SqlNullType::Uuid),
        Type::BYTEA => decode(row, idx, SqlValue::Bytes, SqlNullType::Bytes),
        Type::JSON | Type::JSONB => decode(row, idx, SqlValue::Json, SqlNullType::Json),
        Type::TIMESTAMP => decode(row, idx, SqlValue::DateTime, SqlNullType::DateTime),
        Type::TIMESTAMPTZ => decode(
            row,
            idx,
            SqlValue::DateTimeOffset,
            SqlNullType::DateTimeOffset,
        ),
        Type::DATE => decode(row, idx, SqlValue::Date, SqlNullType::Date),
        Type::TIME => decode(row, idx, SqlValue::Time, SqlNullType::Time),
        _ => decode(row, idx, SqlValue::Text, SqlNullType::String),
    }
}

fn decode<'a, R, T>(
    row: &'a R,
    idx: usize,
    wrap: fn(T) -> SqlValue,
    null: SqlNullType,
) -> Result<SqlValue, BoxError>
where
    R: ColumnSource,
    T: FromSql<'a>,
{
    Ok(row
        .decode::<T>(idx)?
        .map(wrap)
        .unwrap_or(SqlValue::Null(null)))
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::I16(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I32(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => int_to_sql(*v, ty, out),
            SqlValue::F32(v) => float_to_sql(f64::from(*v), ty, out),
            SqlValue::F64(v) => float_to_sql(*v, ty, out),
            SqlValue::Decimal(v) => match *ty {
                Type::NUMERIC => v.to_sql(ty, out),
                Type::FLOAT4 | Type::FLOAT8 => match v.to_f64() {
                    Some(f) => float_to_sql(f, ty, out),
                    None => Err(format!("decimal {} out of float range", v).into()),
                },
                Type::INT2 | Type::INT4 | Type::INT8 => match v.to_i64() {
                    Some(i) if v.fract().is_zero() => int_to_sql(i, ty, out),
                    _ => Err(format!("decimal {} is not an integer", v).into()),
                },
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::Text(v) => text_to_sql(v, ty, out),
            SqlValue::Bytes(v) => match *ty {
                Type::BYTEA => v.as_slice().to_sql(ty, out),
                _ => text_to_sql(&hex::encode(v), ty, out),
            },
            SqlValue::Uuid(v) => match *ty {
                Type::UUID => v.to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::DateTime(v) => match *ty {
                Type::TIMESTAMP => v.to_sql(ty, out),
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(v).to_sql(ty, out),
                Type::DATE => v.date().to_sql(ty, out),
                _ => text_to_sql(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string(), ty, out),
            },
            SqlValue::DateTimeOffset(v) => match *ty {
                Type::TIMESTAMPTZ => v.to_sql(ty, out),
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                Type::DATE => v.date_naive().to_sql(ty, out),
                _ => text_to_sql(&v.to_rfc3339(), ty, out),
            },
            SqlValue::Date(v) => match *ty {
                Type::DATE => v.to_sql(ty, out),
                Type::TIMESTAMP => v.and_time(NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => Utc
                    .from_utc_datetime(&v.and_time(NaiveTime::MIN))
                    .to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::Time(v) => match *ty {
                Type::TIME => v.to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        _ => text_to_sql(&v.to_string(), ty, out),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => text_to_sql(&v.to_string(), ty, out),
    }
}

/// Bind a string against any expected type, parsing it when the type is binary-encoded.
fn text_to_sql(v: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => match v.trim().to_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => true.to_sql(ty, out),
            "f" | "false" | "0" | "no" | "off" => false.to_sql(ty, out),
            other => Err(format!("invalid boolean '{}'", other).into()),
        },
        Type::INT2 => v.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => v.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => v.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => v.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => v.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(v.trim())?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(v.trim())?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out),
        Type::BYTEA => hex::decode(v.trim_start_matches("\\x"))?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(v.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::TIMESTAMP => {
            NaiveDateTime::parse_from_str(v.trim(), "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out)
        }
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(v.trim())
            .or_else(|_| DateTime::parse_from_str(v.trim(), "%Y-%m-%d %H:%M:%S%.f%:z"))?
            .to_sql(ty, out),
        // Text-encoded types (text, varchar, bpchar, name, citext, enums and
        // anything selected through a ::text cast).
        _ => {
            out.extend_from_slice(v.as_bytes());
            Ok(IsNull::No)
        }
    }
}
