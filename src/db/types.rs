//! Postgres row to JSON conversion.
//!
//! Type conversion uses a two-phase approach:
//! 1. `classify` maps a column type to a `ColumnShape` (scalar or
//!    one-dimensional array of a `TypeCategory`)
//! 2. Per-category decoders extract the value
//!
//! Values arrive in text format from the simple protocol and in binary
//! format from parameterized statements. Both render the same JSON. A text
//! value that no decoder understands is returned verbatim; a binary value
//! that no decoder understands is an error, never a silent `null`.

use crate::error::{DbError, DbResult};
use crate::models::FieldInfo;
use serde_json::Value as JsonValue;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{
    PgColumn, PgHasArrayType, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef, Postgres,
};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use uuid::Uuid;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for Postgres column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Enum,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Unknown,
}

/// Scalar or one-dimensional array of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnShape {
    Scalar(TypeCategory),
    Array(TypeCategory),
}

/// sqlx reports types it has not looked up in the catalog under this name.
const UNRESOLVED_TYPE_NAME: &str = "?";

/// Classify a Postgres type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    match lower.as_str() {
        "numeric" | "decimal" => TypeCategory::Decimal,
        "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "smallserial"
        | "serial" | "bigserial" | "oid" => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "interval" => TypeCategory::Interval,
        "text" | "varchar" | "bpchar" | "char" | "name" | "unknown" | "citext" => {
            TypeCategory::Text
        }
        _ => TypeCategory::Unknown,
    }
}

fn resolved_kind(ty: &PgTypeInfo) -> Option<&PgTypeKind> {
    (ty.name() != UNRESOLVED_TYPE_NAME).then(|| ty.kind())
}

/// Strip domains down to the type that defines the wire format.
pub fn base_type(ty: &PgTypeInfo) -> &PgTypeInfo {
    match resolved_kind(ty) {
        Some(PgTypeKind::Domain(base)) => base_type(base),
        _ => ty,
    }
}

/// Element type of an array type, domains stripped.
pub fn array_element(ty: &PgTypeInfo) -> Option<&PgTypeInfo> {
    match resolved_kind(base_type(ty)) {
        Some(PgTypeKind::Array(element)) => Some(base_type(element)),
        _ => None,
    }
}

/// Classify a column or parameter type.
pub fn classify(ty: &PgTypeInfo) -> ColumnShape {
    let ty = base_type(ty);
    match resolved_kind(ty) {
        None => ColumnShape::Scalar(TypeCategory::Unknown),
        Some(PgTypeKind::Enum(_)) => ColumnShape::Scalar(TypeCategory::Enum),
        Some(PgTypeKind::Array(element)) => match classify(element) {
            ColumnShape::Scalar(category) => ColumnShape::Array(category),
            ColumnShape::Array(_) => ColumnShape::Scalar(TypeCategory::Unknown),
        },
        Some(_) => ColumnShape::Scalar(categorize_type(ty.name())),
    }
}

/// Whether values of this type can be rendered from the binary format.
pub fn decodes_binary(ty: &PgTypeInfo) -> bool {
    !matches!(
        classify(ty),
        ColumnShape::Scalar(TypeCategory::Unknown)
            | ColumnShape::Array(TypeCategory::Unknown | TypeCategory::Binary)
    )
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
///
/// `rust_decimal` tops out at 28 significant digits and has no NaN or
/// infinities, so results are rendered straight from the wire instead.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl PgHasArrayType for RawDecimal {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_numeric")
    }
}

impl<'r> Decode<'r, Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_from_binary(value.as_bytes()?)
                .map(RawDecimal)
                .ok_or_else(|| "malformed binary NUMERIC".into()),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary NUMERIC (base-10000 digit groups) as decimal text.
pub fn numeric_from_binary(buf: &[u8]) -> Option<String> {
    let word = |at: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*buf.get(at)?, *buf.get(at + 1)?]))
    };

    let ndigits = word(0)? as usize;
    let weight = word(2)? as i16 as i32;
    let sign = word(4)?;
    let dscale = word(6)? as usize;

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()?;
    let group = |idx: i32| -> u16 {
        if idx < 0 {
            0
        } else {
            digits.get(idx as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for idx in 1..=weight {
            out.push_str(&format!("{:04}", group(idx)));
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", group(idx)));
            idx += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Some(out)
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Decode bytea to a JSON string: UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

// =============================================================================
// Interval Rendering
// =============================================================================

const USECS_PER_SEC: i64 = 1_000_000;
const USECS_PER_MINUTE: i64 = 60 * USECS_PER_SEC;
const USECS_PER_HOUR: i64 = 60 * USECS_PER_MINUTE;

/// Render an interval the way the server prints it with the default
/// `IntervalStyle` (`postgres`), e.g. `1 year 2 mons -3 days +04:05:06.5`.
pub fn format_interval(interval: &PgInterval) -> String {
    let mut out = String::new();
    let mut is_zero = true;
    let mut is_before = false;

    let mut push_part = |out: &mut String, value: i64, unit: &str| {
        if value == 0 {
            return;
        }
        if !is_zero {
            out.push(' ');
        }
        if is_before && value > 0 {
            out.push('+');
        }
        out.push_str(&format!("{} {}{}", value, unit, if value != 1 { "s" } else { "" }));
        is_before = value < 0;
        is_zero = false;
    };

    let months = i64::from(interval.months);
    push_part(&mut out, months / 12, "year");
    push_part(&mut out, months % 12, "mon");
    push_part(&mut out, i64::from(interval.days), "day");

    let micros = interval.microseconds;
    let hours = micros / USECS_PER_HOUR;
    let minutes = (micros % USECS_PER_HOUR) / USECS_PER_MINUTE;
    let seconds = (micros % USECS_PER_MINUTE) / USECS_PER_SEC;
    let fraction = micros % USECS_PER_SEC;

    if is_zero || micros != 0 {
        if !is_zero {
            out.push(' ');
        }
        if micros < 0 {
            out.push('-');
        } else if is_before {
            out.push('+');
        }
        out.push_str(&format!(
            "{:02}:{:02}:{:02}",
            hours.abs(),
            minutes.abs(),
            seconds.abs()
        ));
        if fraction != 0 {
            let digits = format!("{:06}", fraction.abs());
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
    }

    out
}

// =============================================================================
// Row to JSON
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> DbResult<serde_json::Map<String, JsonValue>>;
    fn field_infos(&self) -> Vec<FieldInfo>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> DbResult<serde_json::Map<String, JsonValue>> {
        (0..self.columns().len())
            .map(|idx| Ok((self.column(idx).name().to_string(), decode_column(self, idx)?)))
            .collect()
    }

    fn field_infos(&self) -> Vec<FieldInfo> {
        columns_to_fields(self.columns())
    }
}

/// Map column descriptors to `{name, dataTypeID}` pairs.
pub fn columns_to_fields(columns: &[PgColumn]) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|col| {
            let oid = col.type_info().oid().map(|oid| oid.0).unwrap_or_default();
            FieldInfo::new(col.name(), oid)
        })
        .collect()
}

/// Decode one column of a row into JSON.
///
/// Text-format values fall back to the server's own rendering when a typed
/// decode fails (`infinity` timestamps, multi-dimensional arrays, unknown
/// types). Binary-format failures are reported with the column name.
pub fn decode_column(row: &PgRow, idx: usize) -> DbResult<JsonValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(JsonValue::Null);
    }
    let format = raw.format();

    let column = row.column(idx);
    let ty = base_type(column.type_info());
    let decoded = match classify(ty) {
        ColumnShape::Scalar(category) => decode_scalar(row, idx, ty, category, format),
        ColumnShape::Array(category) => decode_array(row, idx, ty, category, format),
    };

    match (decoded, format) {
        (Ok(value), _) => Ok(value),
        (Err(_), PgValueFormat::Text) => Ok(JsonValue::String(
            row.try_get_unchecked::<String, _>(idx)?,
        )),
        (Err(e), PgValueFormat::Binary) => Err(DbError::execution(
            format!(
                "Failed to decode column \"{}\" of type {}: {}",
                column.name(),
                column.type_info().name(),
                e
            ),
            None,
        )),
    }
}

fn undecodable(ty: &PgTypeInfo) -> sqlx::Error {
    sqlx::Error::Decode(
        format!(
            "no binary decoder for type {}; cast the column to text",
            ty.name()
        )
        .into(),
    )
}

fn float_json(v: f64) -> JsonValue {
    match serde_json::Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("Infinity".to_string()),
        None => JsonValue::String("-Infinity".to_string()),
    }
}

fn render_timestamp(ts: chrono::NaiveDateTime) -> JsonValue {
    JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn render_timestamptz(ts: chrono::DateTime<chrono::Utc>) -> JsonValue {
    JsonValue::String(ts.to_rfc3339())
}

fn decode_scalar(
    row: &PgRow,
    idx: usize,
    ty: &PgTypeInfo,
    category: TypeCategory,
    format: PgValueFormat,
) -> Result<JsonValue, sqlx::Error> {
    let name = ty.name().to_lowercase();

    let value = match category {
        TypeCategory::Integer => match name.as_str() {
            "int2" => JsonValue::from(row.try_get_unchecked::<i16, _>(idx)?),
            "int4" => JsonValue::from(row.try_get_unchecked::<i32, _>(idx)?),
            "oid" => JsonValue::from(row.try_get_unchecked::<Oid, _>(idx)?.0),
            _ => JsonValue::from(row.try_get_unchecked::<i64, _>(idx)?),
        },
        TypeCategory::Float => match name.as_str() {
            "float4" => float_json(f64::from(row.try_get_unchecked::<f32, _>(idx)?)),
            _ => float_json(row.try_get_unchecked::<f64, _>(idx)?),
        },
        TypeCategory::Decimal => JsonValue::String(row.try_get_unchecked::<RawDecimal, _>(idx)?.0),
        TypeCategory::Boolean => JsonValue::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        // enum labels travel as UTF-8 in both formats
        TypeCategory::Text | TypeCategory::Enum => {
            JsonValue::String(row.try_get_unchecked::<String, _>(idx)?)
        }
        TypeCategory::Binary => decode_binary_value(&row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        TypeCategory::Json => row.try_get_unchecked::<JsonValue, _>(idx)?,
        TypeCategory::Uuid => JsonValue::String(row.try_get_unchecked::<Uuid, _>(idx)?.to_string()),
        TypeCategory::Date => {
            JsonValue::String(row.try_get_unchecked::<chrono::NaiveDate, _>(idx)?.to_string())
        }
        TypeCategory::Time => {
            JsonValue::String(row.try_get_unchecked::<chrono::NaiveTime, _>(idx)?.to_string())
        }
        TypeCategory::Timestamp => {
            render_timestamp(row.try_get_unchecked::<chrono::NaiveDateTime, _>(idx)?)
        }
        TypeCategory::TimestampTz => render_timestamptz(
            row.try_get_unchecked::<chrono::DateTime<chrono::Utc>, _>(idx)?,
        ),
        TypeCategory::Interval => match format {
            PgValueFormat::Text => JsonValue::String(row.try_get_unchecked::<String, _>(idx)?),
            PgValueFormat::Binary => {
                JsonValue::String(format_interval(&row.try_get_unchecked::<PgInterval, _>(idx)?))
            }
        },
        TypeCategory::Unknown => match format {
            PgValueFormat::Text => JsonValue::String(row.try_get_unchecked::<String, _>(idx)?),
            PgValueFormat::Binary => return Err(undecodable(ty)),
        },
    };

    Ok(value)
}

fn decode_array(
    row: &PgRow,
    idx: usize,
    ty: &PgTypeInfo,
    category: TypeCategory,
    format: PgValueFormat,
) -> Result<JsonValue, sqlx::Error> {
    if format == PgValueFormat::Text {
        let text = row.try_get_unchecked::<&str, _>(idx)?;
        // nested dimensions and explicit bounds keep the server's rendering
        if text.starts_with("{{") || text.starts_with('[') {
            return Ok(JsonValue::String(text.to_string()));
        }
    }

    let element = array_element(ty)
        .map(|element| element.name().to_lowercase())
        .unwrap_or_default();

    match category {
        TypeCategory::Integer => match element.as_str() {
            "int2" => array_of::<i16>(row, idx, JsonValue::from),
            "int4" => array_of::<i32>(row, idx, JsonValue::from),
            "oid" => array_of::<Oid>(row, idx, |v| JsonValue::from(v.0)),
            _ => array_of::<i64>(row, idx, JsonValue::from),
        },
        TypeCategory::Float => match element.as_str() {
            "float4" => array_of::<f32>(row, idx, |v| float_json(f64::from(v))),
            _ => array_of::<f64>(row, idx, float_json),
        },
        TypeCategory::Decimal => array_of::<RawDecimal>(row, idx, |v| JsonValue::String(v.0)),
        TypeCategory::Boolean => array_of::<bool>(row, idx, JsonValue::Bool),
        TypeCategory::Text | TypeCategory::Enum => array_of::<String>(row, idx, JsonValue::String),
        TypeCategory::Json => array_of::<JsonValue>(row, idx, |v| v),
        TypeCategory::Uuid => array_of::<Uuid>(row, idx, |v| JsonValue::String(v.to_string())),
        TypeCategory::Date => {
            array_of::<chrono::NaiveDate>(row, idx, |v| JsonValue::String(v.to_string()))
        }
        TypeCategory::Time => {
            array_of::<chrono::NaiveTime>(row, idx, |v| JsonValue::String(v.to_string()))
        }
        TypeCategory::Timestamp => array_of::<chrono::NaiveDateTime>(row, idx, render_timestamp),
        TypeCategory::TimestampTz => {
            array_of::<chrono::DateTime<chrono::Utc>>(row, idx, render_timestamptz)
        }
        TypeCategory::Interval => {
            array_of::<PgInterval>(row, idx, |v| JsonValue::String(format_interval(&v)))
        }
        TypeCategory::Binary | TypeCategory::Unknown => Err(undecodable(ty)),
    }
}

fn array_of<T>(
    row: &PgRow,
    idx: usize,
    render: impl Fn(T) -> JsonValue,
) -> Result<JsonValue, sqlx::Error>
where
    T: for<'a> Decode<'a, Postgres> + Type<Postgres>,
{
    let items = row.try_get_unchecked::<Vec<Option<T>>, _>(idx)?;
    Ok(JsonValue::Array(
        items
            .into_iter()
            .map(|item| item.map(&render).unwrap_or(JsonValue::Null))
            .collect(),
    ))
}
