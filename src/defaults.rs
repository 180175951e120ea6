//! Resolving a column's declared default for a blank non-nullable cell.
//!
//! Storage engines report defaults as raw SQL fragments: `((0))`,
//! `(getdate())`, `N'pending'`, `CURRENT_TIMESTAMP`, `datetime('now')`. A
//! fragment that the engine must evaluate itself resolves to
//! [`DefaultValue::UseStorageDefault`] so the loader leaves the column out of
//! the insert. Anything else is parsed into a typed literal for the column.

use std::{str::FromStr, sync::LazyLock};

use log::{debug, warn};
use regex::Regex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    coerce::{clean_number, integral, parse_bool_token, parse_temporal},
    data::{FieldValue, Value, parse_naive_time},
    schema::{ColumnSchema, SqlType},
};

/// Engine functions whose value depends on when the row is written.
pub const TIMESTAMP_FUNCTIONS: &[&str] = &[
    "getdate",
    "getutcdate",
    "sysdatetime",
    "sysutcdatetime",
    "sysdatetimeoffset",
    "current_timestamp",
    "current_date",
    "current_time",
    "now",
    "localtimestamp",
];

static FUNCTION_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*\(.*\)$").expect("function call pattern compiles")
});

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    UseStorageDefault,
}

impl From<DefaultValue> for FieldValue {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Literal(value) => FieldValue::Value(value),
            DefaultValue::UseStorageDefault => FieldValue::UseStorageDefault,
        }
    }
}

/// Never fails: an expression that cannot be parsed for the column's type is left to storage.
pub fn resolve(expression: &str, column: &ColumnSchema) -> DefaultValue {
    let unwrapped = unwrap_parentheses(expression.trim());
    if is_engine_expression(unwrapped) {
        debug!(
            "Default '{}' for column '{}' is evaluated by storage",
            expression, column.name
        );
        return DefaultValue::UseStorageDefault;
    }

    match parse_literal(unwrapped, &column.sql_type) {
        Ok(value) => DefaultValue::Literal(value),
        Err(reason) => {
            warn!(
                "Default '{}' for column '{}' could not be used ({}); deferring to storage",
                expression, column.name, reason
            );
            DefaultValue::UseStorageDefault
        }
    }
}

/// Removes up to two layers of parentheses that wrap the whole expression.
fn unwrap_parentheses(mut expression: &str) -> &str {
    for _ in 0..2 {
        match strip_outer_parentheses(expression) {
            Some(inner) => expression = inner.trim(),
            None => break,
        }
    }
    expression
}

fn strip_outer_parentheses(expression: &str) -> Option<&str> {
    let inner = expression.strip_prefix('(')?.strip_suffix(')')?;
    // "(1)+(2)" starts and ends with parentheses that are not a pair.
    let mut depth = 0i32;
    for ch in inner.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

fn is_engine_expression(expression: &str) -> bool {
    let lowered = expression.to_ascii_lowercase();
    let name = lowered
        .split('(')
        .next()
        .unwrap_or_default()
        .trim();
    TIMESTAMP_FUNCTIONS.contains(&name) || FUNCTION_CALL.is_match(expression)
}

fn unquote(expression: &str) -> Option<String> {
    let body = expression
        .strip_prefix("N'")
        .or_else(|| expression.strip_prefix('\''))?
        .strip_suffix('\'')?;
    Some(body.replace("''", "'"))
}

fn parse_literal(expression: &str, sql_type: &SqlType) -> Result<Value, String> {
    let text = unquote(expression).unwrap_or_else(|| expression.to_string());
    match sql_type {
        SqlType::String | SqlType::Unknown(_) => Ok(Value::String(text)),
        SqlType::Boolean => parse_bool_token(&text)
            .map(Value::Boolean)
            .ok_or_else(|| format!("'{text}' is not a boolean")),
        SqlType::Integer(width) => {
            let cleaned = clean_number(&text);
            let value = cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| format!("'{text}' is not an integer"))?;
            let (min, max) = width.bounds();
            if value < min || value > max {
                return Err(format!("{value} is out of range ({min} to {max})"));
            }
            Ok(Value::Integer(value))
        }
        SqlType::Decimal => Decimal::from_str(&clean_number(&text))
            .map(Value::Decimal)
            .map_err(|err| err.to_string()),
        SqlType::Float => clean_number(&text)
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Float)
            .ok_or_else(|| format!("'{text}' is not a number")),
        SqlType::Date => parse_temporal(&text)
            .map(|parsed| Value::Date(parsed.date()))
            .ok_or_else(|| format!("'{text}' is not a date")),
        SqlType::DateTime => parse_temporal(&text)
            .map(Value::DateTime)
            .ok_or_else(|| format!("'{text}' is not a datetime")),
        SqlType::Time => parse_naive_time(text.trim())
            .map(Value::Time)
            .map_err(|err| err.to_string()),
        SqlType::Guid => Uuid::parse_str(text.trim_matches(['{', '}']))
            .map(Value::Guid)
            .map_err(|err| err.to_string()),
    }
}
