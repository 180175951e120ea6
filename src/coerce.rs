//! Cell-level type coercion.
//!
//! [`coerce`] turns one raw worksheet cell into the value a column stores.
//! It is total: every input yields either a [`FieldValue`] or a message that
//! the row validator records against the cell.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use itertools::Itertools;
use log::debug;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use uuid::Uuid;

use crate::{
    data::{CellValue, FieldValue, Value, parse_naive_time},
    defaults,
    schema::{ColumnSchema, IntegerWidth, SqlType},
};

/// Accepted date and timestamp layouts, tried in order. `true` marks layouts with a time part.
pub const TEMPORAL_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d", false),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%d %H:%M:%S%.f", true),
    ("%Y-%m-%dT%H:%M:%S", true),
    ("%d/%m/%Y", false),
    ("%m/%d/%Y", false),
    ("%Y/%m/%d", false),
    ("%d-%m-%Y", false),
    ("%m-%d-%Y", false),
    ("%Y%m%d", false),
    ("%d.%m.%Y", false),
    ("%m.%d.%Y", false),
    ("%Y-%m-%d %H:%M", true),
    ("%d/%m/%Y %H:%M:%S", true),
    ("%m/%d/%Y %H:%M:%S", true),
    ("%Y/%m/%d %H:%M:%S", true),
];

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

const TRUE_TOKENS: &[&str] = &["1", "true", "yes", "y", "on"];
const FALSE_TOKENS: &[&str] = &["0", "false", "no", "n", "off"];

pub fn coerce(raw: &CellValue, column: &ColumnSchema) -> Result<FieldValue, String> {
    if raw.is_null_like() {
        return coerce_null(column);
    }

    let value = match &column.sql_type {
        SqlType::String => Value::String(coerce_string(raw, column.max_length)?),
        SqlType::Boolean => Value::Boolean(coerce_bool(raw)?),
        SqlType::Integer(width) => Value::Integer(coerce_integer(raw, *width)?),
        SqlType::Decimal => Value::Decimal(coerce_decimal(raw, column.precision, column.scale)?),
        SqlType::Float => Value::Float(coerce_float(raw)?),
        SqlType::Date => Value::Date(coerce_temporal(raw)?.date()),
        SqlType::DateTime => Value::DateTime(coerce_temporal(raw)?),
        SqlType::Time => Value::Time(coerce_time(raw)?),
        SqlType::Guid => Value::Guid(coerce_guid(raw)?),
        SqlType::Unknown(declared) => {
            debug!(
                "Column '{}' has unrecognised type '{}'; storing text as-is",
                column.name, declared
            );
            Value::String(raw.text().trim().to_string())
        }
    };
    Ok(FieldValue::Value(value))
}

fn coerce_null(column: &ColumnSchema) -> Result<FieldValue, String> {
    if column.nullable {
        return Ok(FieldValue::Null);
    }
    match column.default_expression() {
        Some(expression) => Ok(defaults::resolve(expression, column).into()),
        None => Err(format!(
            "Column '{}' cannot be NULL and has no default value",
            column.name
        )),
    }
}

fn coerce_string(raw: &CellValue, max_length: Option<usize>) -> Result<String, String> {
    let text = raw.text().trim().to_string();
    let length = text.chars().count();
    match max_length {
        Some(max) if length > max => Err(format!("String length ({length}) exceeds max {max}")),
        _ => Ok(text),
    }
}

pub fn parse_bool_token(value: &str) -> Option<bool> {
    let token = value.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn coerce_bool(raw: &CellValue) -> Result<bool, String> {
    match raw {
        CellValue::Bool(value) => Ok(*value),
        CellValue::DateTime(_) => Err(format!("Invalid boolean: '{raw}'")),
        other => parse_bool_token(&other.text()).ok_or_else(|| format!("Invalid boolean: '{raw}'")),
    }
}

/// Strips currency symbols, thousands separators, underscores and whitespace.
/// Accounting notation `(1,234.00)` becomes `-1234.00`.
pub fn clean_number(value: &str) -> String {
    let cleaned = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '_' && !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>();
    match cleaned
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) if !inner.starts_with('-') => format!("-{inner}"),
        Some(inner) => inner.to_string(),
        None => cleaned,
    }
}

pub(crate) fn integral(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (value.is_finite() && value.fract() == 0.0 && (-LIMIT..LIMIT).contains(&value))
        .then_some(value as i64)
}

fn coerce_integer(raw: &CellValue, width: IntegerWidth) -> Result<i64, String> {
    let parsed = match raw {
        CellValue::Int(value) => Some(*value),
        CellValue::Float(value) => integral(*value),
        CellValue::Text(text) => {
            let cleaned = clean_number(text);
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().and_then(integral))
        }
        CellValue::Bool(_) | CellValue::DateTime(_) | CellValue::Empty => None,
    };
    let value = parsed.ok_or_else(|| format!("Invalid integer: '{raw}'"))?;
    let (min, max) = width.bounds();
    if value < min || value > max {
        return Err(format!(
            "Integer {value} is out of range ({min} to {max})"
        ));
    }
    Ok(value)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn coerce_decimal(
    raw: &CellValue,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Result<Decimal, String> {
    let parsed = match raw {
        CellValue::Int(value) => Some(Decimal::from(*value)),
        CellValue::Float(value) if !value.is_finite() => {
            return Err(format!("Invalid numeric (inf/NaN): '{raw}'"));
        }
        CellValue::Float(value) => Decimal::from_f64(*value),
        CellValue::Text(text) => parse_decimal(&clean_number(text)),
        CellValue::Bool(_) | CellValue::DateTime(_) | CellValue::Empty => None,
    };
    let mut value = parsed.ok_or_else(|| format!("Invalid numeric: '{raw}'"))?;

    if let Some(scale) = scale {
        value = value.round_dp(scale);
    }
    if let Some(precision) = precision {
        let integer_digits = value
            .trunc()
            .abs()
            .to_string()
            .trim_start_matches('0')
            .len() as u32;
        let allowed = precision.saturating_sub(scale.unwrap_or(0));
        if integer_digits > allowed {
            return Err(format!(
                "Numeric value '{raw}' exceeds precision ({precision}, {})",
                scale.unwrap_or(0)
            ));
        }
    }
    Ok(value)
}

fn coerce_float(raw: &CellValue) -> Result<f64, String> {
    let parsed = match raw {
        CellValue::Int(value) => Some(*value as f64),
        CellValue::Float(value) => Some(*value),
        CellValue::Text(text) => clean_number(text).parse::<f64>().ok(),
        CellValue::Bool(_) | CellValue::DateTime(_) | CellValue::Empty => None,
    };
    match parsed {
        Some(value) if value.is_finite() => Ok(value),
        Some(_) => Err(format!("Invalid numeric (inf/NaN): '{raw}'")),
        None => Err(format!("Invalid numeric: '{raw}'")),
    }
}

/// Tries every entry of [`TEMPORAL_FORMATS`]; date-only layouts yield midnight.
pub fn parse_temporal(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    TEMPORAL_FORMATS.iter().find_map(|(format, has_time)| {
        if *has_time {
            NaiveDateTime::parse_from_str(trimmed, format).ok()
        } else {
            NaiveDate::parse_from_str(trimmed, format)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        }
    })
}

fn expected_formats() -> String {
    TEMPORAL_FORMATS
        .iter()
        .map(|(format, _)| *format)
        .join(", ")
}

fn coerce_temporal(raw: &CellValue) -> Result<NaiveDateTime, String> {
    match raw {
        CellValue::DateTime(value) => Ok(*value),
        // Compact layouts such as 20240315 arrive as numbers; serials never parse.
        CellValue::Int(_) | CellValue::Float(_) => parse_temporal(&raw.text()).ok_or_else(|| {
            format!(
                "Invalid date format: '{raw}'. Numbers are not accepted as date serials; format the cell as a date or use one of: {}",
                expected_formats()
            )
        }),
        other => parse_temporal(&other.text()).ok_or_else(|| {
            format!(
                "Invalid date format: '{raw}'. Expected one of: {}",
                expected_formats()
            )
        }),
    }
}

fn coerce_time(raw: &CellValue) -> Result<NaiveTime, String> {
    match raw {
        CellValue::DateTime(value) => Ok(value.time()),
        CellValue::Text(text) => parse_naive_time(text.trim())
            .ok()
            .or_else(|| parse_temporal(text).map(|parsed| parsed.time()))
            .ok_or_else(|| format!("Invalid time: '{raw}'. Expected HH:MM or HH:MM:SS")),
        _ => Err(format!("Invalid time: '{raw}'. Expected HH:MM or HH:MM:SS")),
    }
}

fn coerce_guid(raw: &CellValue) -> Result<Uuid, String> {
    match raw {
        CellValue::Text(text) => Uuid::parse_str(text.trim().trim_matches(['{', '}']))
            .map_err(|_| format!("Invalid GUID: '{raw}'")),
        _ => Err(format!("Invalid GUID: '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    fn required(name: &str, sql_type: SqlType) -> ColumnSchema {
        ColumnSchema::new(name, sql_type).not_null()
    }

    fn value_of(result: Result<FieldValue, String>) -> Value {
        match result {
            Ok(FieldValue::Value(value)) => value,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[test]
    fn blank_cells_follow_nullability_and_defaults() {
        let nullable = ColumnSchema::new("note", SqlType::String);
        assert_eq!(coerce(&CellValue::Empty, &nullable), Ok(FieldValue::Null));

        let defaulted = required("count", SqlType::Integer(IntegerWidth::Regular)).with_default("((0))");
        assert_eq!(
            coerce(&text("N/A"), &defaulted),
            Ok(FieldValue::Value(Value::Integer(0)))
        );

        let stamped = required("created", SqlType::DateTime).with_default("(getdate())");
        assert_eq!(
            coerce(&CellValue::Empty, &stamped),
            Ok(FieldValue::UseStorageDefault)
        );

        let strict = required("Amount", SqlType::Decimal);
        let err = coerce(&CellValue::Float(f64::NAN), &strict).unwrap_err();
        assert_eq!(err, "Column 'Amount' cannot be NULL and has no default value");
    }

    #[test]
    fn strings_are_trimmed_and_length_checked() {
        let column = required("code", SqlType::String).with_max_length(4);
        assert_eq!(
            value_of(coerce(&text("  AB12 "), &column)),
            Value::String("AB12".into())
        );
        assert_eq!(
            coerce(&text("ABCDE"), &column).unwrap_err(),
            "String length (5) exceeds max 4"
        );
        // Length counts characters, not bytes.
        assert!(coerce(&text("été!"), &column).is_ok());
    }

    #[test]
    fn booleans_accept_tokens_and_native_values() {
        let column = required("active", SqlType::Boolean);
        assert_eq!(value_of(coerce(&text("Yes"), &column)), Value::Boolean(true));
        assert_eq!(value_of(coerce(&text("off"), &column)), Value::Boolean(false));
        assert_eq!(value_of(coerce(&CellValue::Int(1), &column)), Value::Boolean(true));
        assert_eq!(value_of(coerce(&CellValue::Bool(false), &column)), Value::Boolean(false));
        assert!(coerce(&text("maybe"), &column).is_err());
    }

    #[test]
    fn integers_strip_separators_and_check_width() {
        let column = required("qty", SqlType::Integer(IntegerWidth::Regular));
        assert_eq!(value_of(coerce(&text(" 1,234 "), &column)), Value::Integer(1234));
        assert_eq!(value_of(coerce(&text("12.0"), &column)), Value::Integer(12));
        assert_eq!(value_of(coerce(&CellValue::Float(7.0), &column)), Value::Integer(7));
        assert!(coerce(&text("12.5"), &column).is_err());
        assert!(coerce(&text("3000000000"), &column).is_err());

        let tiny = required("flag", SqlType::Integer(IntegerWidth::Tiny));
        assert!(coerce(&CellValue::Int(-1), &tiny).is_err());
        assert!(coerce(&CellValue::Int(255), &tiny).is_ok());
    }

    #[test]
    fn decimals_are_exact_and_tolerate_formatting() {
        let column = required("amount", SqlType::Decimal);
        assert_eq!(
            value_of(coerce(&text("1,234.50"), &column)),
            Value::Decimal(Decimal::new(123450, 2))
        );
        assert_eq!(
            value_of(coerce(&text("$ (2,000.25)"), &column)),
            Value::Decimal(Decimal::new(-200025, 2))
        );
        assert_eq!(
            value_of(coerce(&text("1.5e3"), &column)),
            Value::Decimal(Decimal::new(1500, 0))
        );
        assert_eq!(coerce(&text("abc"), &column).unwrap_err(), "Invalid numeric: 'abc'");
    }

    #[test]
    fn decimal_precision_is_enforced() {
        let mut column = required("rate", SqlType::Decimal);
        column.precision = Some(5);
        column.scale = Some(2);
        assert_eq!(
            value_of(coerce(&text("123.456"), &column)),
            Value::Decimal(Decimal::new(12346, 2))
        );
        assert!(coerce(&text("1234.5"), &column).is_err());
    }

    #[test]
    fn floats_reject_non_finite_values() {
        let column = required("ratio", SqlType::Float);
        assert_eq!(value_of(coerce(&text("0.25"), &column)), Value::Float(0.25));
        assert_eq!(
            coerce(&text("inf"), &column).unwrap_err(),
            "Invalid numeric (inf/NaN): 'inf'"
        );
    }

    #[test]
    fn dates_parse_listed_formats_and_truncate() {
        let date = required("due", SqlType::Date);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for input in ["2024-03-15", "15/03/2024", "2024/03/15", "15.03.2024", "2024-03-15 08:30:00"] {
            assert_eq!(value_of(coerce(&text(input), &date)), Value::Date(expected), "{input}");
        }

        let stamp = required("seen", SqlType::DateTime);
        assert_eq!(
            value_of(coerce(&text("2024-03-15 08:30"), &stamp)),
            Value::DateTime(expected.and_hms_opt(8, 30, 0).unwrap())
        );
    }

    #[test]
    fn numeric_cells_parse_as_compact_dates_but_not_serials() {
        let date = required("due", SqlType::Date);
        assert_eq!(
            value_of(coerce(&CellValue::Float(20_240_315.0), &date)),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        assert_eq!(
            value_of(coerce(&CellValue::Int(20_240_315), &date)),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        let err = coerce(&CellValue::Float(45_000.0), &date).unwrap_err();
        assert!(err.starts_with("Invalid date format: '45000'"));
        assert!(err.contains("date serials"));
        let err = coerce(&text("next week"), &date).unwrap_err();
        assert!(err.contains("%Y-%m-%d"));
    }

    #[test]
    fn native_datetimes_pass_through() {
        let when = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 15, 0).unwrap();
        let cell = CellValue::DateTime(when);
        assert_eq!(
            value_of(coerce(&cell, &required("d", SqlType::Date))),
            Value::Date(when.date())
        );
        assert_eq!(
            value_of(coerce(&cell, &required("t", SqlType::Time))),
            Value::Time(when.time())
        );
    }

    #[test]
    fn guids_tolerate_braces() {
        let column = required("ref", SqlType::Guid);
        let parsed = value_of(coerce(&text("{67e55044-10b1-426f-9247-bb680e5fe0c8}"), &column));
        assert_eq!(parsed.as_display(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert!(coerce(&text("not-a-guid"), &column).is_err());
    }

    #[test]
    fn unknown_types_keep_trimmed_text() {
        let column = required("shape", SqlType::Unknown("geography".into()));
        assert_eq!(
            value_of(coerce(&text(" POINT(1 2) "), &column)),
            Value::String("POINT(1 2)".into())
        );
    }
}
