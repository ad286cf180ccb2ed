//! Parameter binding for PostgreSQL statements.
//!
//! sqlx always transmits parameters in binary format, so a JSON value cannot
//! simply be handed over as text for the server to coerce. Instead the
//! statement is prepared first, the server reports the type it inferred for
//! each placeholder, and every value is converted to that type here before
//! being encoded. A value that does not parse as the inferred type fails the
//! same way the server would fail an untyped literal.

use crate::db::types::{ColumnShape, TypeCategory, array_element, base_type, classify};
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
use sqlx::{Type, TypeInfo};
use uuid::Uuid;

/// SQLSTATE `invalid_text_representation`.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
/// SQLSTATE `feature_not_supported`.
const FEATURE_NOT_SUPPORTED: &str = "0A000";
/// SQLSTATE `protocol_violation`, raised by the server on a count mismatch.
const PROTOCOL_VIOLATION: &str = "08P01";

/// A value converted to the type the server expects for its placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(u32),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    /// Text-like types and enum labels
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval { months: i32, days: i32, microseconds: i64 },
    Array {
        element: PgTypeInfo,
        items: Vec<BoundParam>,
    },
}

/// A bound value together with the parameter type it is encoded as.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub value: Bound,
    pub ty: PgTypeInfo,
}

impl Type<Postgres> for BoundParam {
    /// OID 0 leaves the type unspecified; `produces` always overrides it.
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl<'q> Encode<'q, Postgres> for BoundParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match &self.value {
            Bound::Null => Ok(IsNull::Yes),
            Bound::Bool(v) => <bool as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Int2(v) => <i16 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Int4(v) => <i32 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Int8(v) => <i64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Oid(v) => <Oid as Encode<'q, Postgres>>::encode_by_ref(&Oid(*v), buf),
            Bound::Float4(v) => <f32 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Float8(v) => <f64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Numeric(v) => <Decimal as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Text(v) => <String as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Bytes(v) => <Vec<u8> as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Json(v) => <JsonValue as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Uuid(v) => <Uuid as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Date(v) => <NaiveDate as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Time(v) => <NaiveTime as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::Timestamp(v) => <NaiveDateTime as Encode<'q, Postgres>>::encode_by_ref(v, buf),
            Bound::TimestampTz(v) => {
                <DateTime<Utc> as Encode<'q, Postgres>>::encode_by_ref(v, buf)
            }
            Bound::Interval {
                months,
                days,
                microseconds,
            } => {
                let interval = PgInterval {
                    months: *months,
                    days: *days,
                    microseconds: *microseconds,
                };
                <PgInterval as Encode<'q, Postgres>>::encode_by_ref(&interval, buf)
            }
            Bound::Array { element, items } => {
                if items.is_empty() {
                    // zero dimensions, no null flag, element OID
                    let oid = element.oid().ok_or("array element type has no OID")?;
                    buf.extend_from_slice(&0_i32.to_be_bytes());
                    buf.extend_from_slice(&0_i32.to_be_bytes());
                    buf.extend_from_slice(&oid.0.to_be_bytes());
                    Ok(IsNull::No)
                } else {
                    <&[BoundParam] as Encode<'q, Postgres>>::encode_by_ref(&items.as_slice(), buf)
                }
            }
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.ty.clone())
    }
}

/// Convert every parameter to the type reported for its placeholder.
pub fn resolve_params(params: &[QueryParam], types: &[PgTypeInfo]) -> DbResult<Vec<BoundParam>> {
    if params.len() != types.len() {
        return Err(DbError::execution(
            format!(
                "bind message supplies {} parameters, but prepared statement \"\" requires {}",
                params.len(),
                types.len()
            ),
            Some(PROTOCOL_VIOLATION.to_string()),
        ));
    }

    params
        .iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (param, ty))| resolve(idx + 1, param, ty))
        .collect()
}

fn resolve(position: usize, param: &QueryParam, ty: &PgTypeInfo) -> DbResult<BoundParam> {
    let value = match (param, classify(ty)) {
        (QueryParam::Null, _) => Bound::Null,
        (_, ColumnShape::Array(_)) => match array_element(ty) {
            Some(element) => Bound::Array {
                element: element.clone(),
                items: resolve_elements(position, param, ty, element)?,
            },
            None => return Err(unsupported(position, ty)),
        },
        (_, ColumnShape::Scalar(category)) => resolve_scalar(position, param, ty, category)?,
    };

    Ok(BoundParam {
        value,
        ty: ty.clone(),
    })
}

fn resolve_elements(
    position: usize,
    param: &QueryParam,
    ty: &PgTypeInfo,
    element: &PgTypeInfo,
) -> DbResult<Vec<BoundParam>> {
    let elements: Vec<QueryParam> = match param {
        QueryParam::Json(JsonValue::Array(items)) => items.iter().map(QueryParam::from_json).collect(),
        other => {
            let text = other.literal().unwrap_or_default();
            parse_array_literal(&text)
                .ok_or_else(|| invalid_input(ty, &text))?
                .into_iter()
                .map(|item| item.map_or(QueryParam::Null, QueryParam::String))
                .collect()
        }
    };

    elements
        .iter()
        .map(|item| resolve(position, item, element))
        .collect()
}

fn resolve_scalar(
    position: usize,
    param: &QueryParam,
    ty: &PgTypeInfo,
    category: TypeCategory,
) -> DbResult<Bound> {
    if let (TypeCategory::Json, QueryParam::Json(v)) = (category, param) {
        return Ok(Bound::Json(v.clone()));
    }

    let text = param.literal().unwrap_or_default();
    let trimmed = text.trim();
    let name = base_type(ty).name().to_lowercase();
    let invalid = || invalid_input(ty, &text);

    let bound = match category {
        TypeCategory::Integer => match name.as_str() {
            "int2" => Bound::Int2(trimmed.parse().map_err(|_| invalid())?),
            "int4" => Bound::Int4(trimmed.parse().map_err(|_| invalid())?),
            "oid" => Bound::Oid(trimmed.parse().map_err(|_| invalid())?),
            _ => Bound::Int8(trimmed.parse().map_err(|_| invalid())?),
        },
        TypeCategory::Float => match name.as_str() {
            "float4" => Bound::Float4(trimmed.parse().map_err(|_| invalid())?),
            _ => Bound::Float8(trimmed.parse().map_err(|_| invalid())?),
        },
        TypeCategory::Decimal => Bound::Numeric(
            Decimal::from_str_exact(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| invalid())?,
        ),
        TypeCategory::Boolean => Bound::Bool(parse_bool(trimmed).ok_or_else(invalid)?),
        TypeCategory::Text | TypeCategory::Enum => Bound::Text(text.clone()),
        TypeCategory::Binary => Bound::Bytes(parse_bytea(&text).ok_or_else(invalid)?),
        TypeCategory::Json => Bound::Json(serde_json::from_str(&text).map_err(|_| invalid())?),
        TypeCategory::Uuid => Bound::Uuid(Uuid::parse_str(trimmed).map_err(|_| invalid())?),
        TypeCategory::Date => Bound::Date(parse_date(trimmed).ok_or_else(invalid)?),
        TypeCategory::Time => Bound::Time(parse_time(trimmed).ok_or_else(invalid)?),
        TypeCategory::Timestamp => {
            Bound::Timestamp(parse_timestamp(trimmed).ok_or_else(invalid)?)
        }
        TypeCategory::TimestampTz => {
            Bound::TimestampTz(parse_timestamptz(trimmed).ok_or_else(invalid)?)
        }
        TypeCategory::Interval => {
            let interval = parse_interval(trimmed).ok_or_else(invalid)?;
            Bound::Interval {
                months: interval.months,
                days: interval.days,
                microseconds: interval.microseconds,
            }
        }
        TypeCategory::Unknown => return Err(unsupported(position, ty)),
    };

    Ok(bound)
}

fn invalid_input(ty: &PgTypeInfo, text: &str) -> DbError {
    DbError::execution(
        format!(
            "invalid input syntax for type {}: \"{}\"",
            ty.name().to_lowercase(),
            text
        ),
        Some(INVALID_TEXT_REPRESENTATION.to_string()),
    )
}

fn unsupported(position: usize, ty: &PgTypeInfo) -> DbError {
    let name = ty.name().to_lowercase();
    DbError::execution(
        format!(
            "parameter ${position} has type {name}, which cannot be bound from JSON; \
             cast the placeholder instead, e.g. ${position}::text::{name}"
        ),
        Some(FEATURE_NOT_SUPPORTED.to_string()),
    )
}

// =============================================================================
// Literal parsing
// =============================================================================

/// Parse a one-dimensional array literal such as `{1,"a b",NULL}`.
///
/// Returns `None` for malformed or nested literals.
pub fn parse_array_literal(text: &str) -> Option<Vec<Option<String>>> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = inner.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quoted => current.push(chars.next()?),
            '"' => {
                quoted = !quoted;
                was_quoted = true;
            }
            '{' | '}' if !quoted => return None,
            ',' if !quoted => {
                items.push(finish_element(&current, was_quoted));
                current.clear();
                was_quoted = false;
            }
            _ => current.push(ch),
        }
    }
    if quoted {
        return None;
    }
    items.push(finish_element(&current, was_quoted));

    Some(items)
}

fn finish_element(raw: &str, was_quoted: bool) -> Option<String> {
    if was_quoted {
        return Some(raw.to_string());
    }
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("NULL") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Boolean spellings the server accepts, including unique prefixes.
fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "t" | "tr" | "tru" | "true" | "y" | "ye" | "yes" | "on" | "1" => Some(true),
        "f" | "fa" | "fal" | "fals" | "false" | "n" | "no" | "of" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `\x`-prefixed hex, otherwise the raw bytes of the text.
fn parse_bytea(text: &str) -> Option<Vec<u8>> {
    let Some(hex) = text.strip_prefix("\\x") else {
        return Some(text.as_bytes().to_vec());
    };
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
        .or_else(|| parse_timestamptz_with_offset(text).map(|ts| ts.naive_utc()))
}

fn parse_timestamptz_with_offset(text: &str) -> Option<DateTime<Utc>> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

    DateTime::parse_from_rfc3339(text)
        .ok()
        .or_else(|| {
            FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        })
        .map(|ts| ts.with_timezone(&Utc))
}

/// Offset-less input is read as UTC.
fn parse_timestamptz(text: &str) -> Option<DateTime<Utc>> {
    parse_timestamptz_with_offset(text).or_else(|| {
        let trimmed = text.trim_end_matches(['Z', 'z']);
        parse_timestamp(trimmed).map(|ts| ts.and_utc())
    })
}

const USECS_PER_SEC: f64 = 1_000_000.0;

/// Parse the verbose interval syntax: `1 year 2 mons 3 days 04:05:06`,
/// `90 minutes`, `@ 2 hours ago`.
pub fn parse_interval(text: &str) -> Option<PgInterval> {
    let mut interval = PgInterval {
        months: 0,
        days: 0,
        microseconds: 0,
    };
    let mut tokens = text.split_whitespace().peekable();
    let mut parsed_any = false;
    let mut negate = false;

    if tokens.peek() == Some(&"@") {
        tokens.next();
    }

    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("ago") {
            negate = true;
            continue;
        }
        if token.contains(':') {
            interval.microseconds += parse_clock(token)?;
            parsed_any = true;
            continue;
        }

        let amount: f64 = token.parse().ok()?;
        let unit = tokens.next()?.to_ascii_lowercase();
        let whole = || (amount.fract() == 0.0).then_some(amount as i32);

        match unit.as_str() {
            "year" | "years" | "yr" | "yrs" | "y" => interval.months += whole()?.checked_mul(12)?,
            "mon" | "mons" | "month" | "months" => interval.months += whole()?,
            "week" | "weeks" | "w" => interval.days += whole()?.checked_mul(7)?,
            "day" | "days" | "d" => interval.days += whole()?,
            "hour" | "hours" | "hr" | "hrs" | "h" => {
                interval.microseconds += (amount * 3600.0 * USECS_PER_SEC).round() as i64
            }
            "minute" | "minutes" | "min" | "mins" | "m" => {
                interval.microseconds += (amount * 60.0 * USECS_PER_SEC).round() as i64
            }
            "second" | "seconds" | "sec" | "secs" | "s" => {
                interval.microseconds += (amount * USECS_PER_SEC).round() as i64
            }
            "millisecond" | "milliseconds" | "msec" | "msecs" | "ms" => {
                interval.microseconds += (amount * 1000.0).round() as i64
            }
            "microsecond" | "microseconds" | "usec" | "usecs" | "us" => {
                interval.microseconds += amount.round() as i64
            }
            _ => return None,
        }
        parsed_any = true;
    }

    if !parsed_any {
        return None;
    }
    if negate {
        interval.months = -interval.months;
        interval.days = -interval.days;
        interval.microseconds = -interval.microseconds;
    }
    Some(interval)
}

/// `[-]HH:MM[:SS[.ffffff]]` as microseconds.
fn parse_clock(token: &str) -> Option<i64> {
    let (sign, body) = match token.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, token.strip_prefix('+').unwrap_or(token)),
    };
    let mut parts = body.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((sign * (hours * 3600.0 + minutes * 60.0 + seconds) * USECS_PER_SEC).round() as i64)
}
