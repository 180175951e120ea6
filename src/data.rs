use std::{borrow::Cow, fmt};

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tokens that mark a cell as intentionally empty.
const NULL_TOKENS: &[&str] = &["null", "n/a", "na", "#n/a"];

/// A worksheet cell as delivered by the reader, before any schema is applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Blank cells, NaN floats, and the usual "not available" markers.
    pub fn is_null_like(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Float(value) => value.is_nan(),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                trimmed.is_empty()
                    || NULL_TOKENS
                        .iter()
                        .any(|token| trimmed.eq_ignore_ascii_case(token))
            }
            _ => false,
        }
    }

    /// True when the cell holds a number or text that parses as one.
    pub fn is_numeric(&self) -> bool {
        match self {
            CellValue::Int(_) | CellValue::Float(_) => true,
            CellValue::Text(text) => text.trim().parse::<f64>().is_ok(),
            _ => false,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Text(text) => Cow::Borrowed(text.as_str()),
            CellValue::Int(value) => Cow::Owned(value.to_string()),
            CellValue::Float(value) => Cow::Owned(format_float(*value)),
            CellValue::Bool(value) => Cow::Owned(value.to_string()),
            CellValue::DateTime(value) => Cow::Owned(format_datetime(value)),
        }
    }

    /// Lower-cased, trimmed text used by every header comparison.
    pub fn normalized(&self) -> String {
        normalize_text(&self.text())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

/// A cell value after coercion to its column's declared type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Guid(Uuid),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => format_datetime(dt),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::Guid(g) => g.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// What a validated record holds for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Value(Value),
    /// Omit the column so the storage engine applies its own default expression.
    UseStorageDefault,
    /// Placeholder for a cell that failed coercion; keeps row alignment for reporting.
    Invalid,
}

impl FieldValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, FieldValue::Invalid)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

pub fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn format_datetime(value: &NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];
    for fmt in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as time"))
}

/// Parses a reporting period (`YYYY-MM` or a full date) into the first day of its month.
pub fn parse_period_key(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    let parsed = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d")
        .or_else(|_| parse_naive_date(trimmed))
        .map_err(|_| anyhow!("Invalid period '{value}'. Use the format YYYY-MM"))?;
    parsed
        .with_day(1)
        .ok_or_else(|| anyhow!("Invalid period '{value}'"))
}

/// Converts a spreadsheet date serial (days since 1899-12-30) into a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Serials before 1900-03-01 sit on the far side of the phantom 1900-02-29.
    let epoch = if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let days = serial.trunc();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    epoch
        .and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::try_days(days as i64)?)?
        .checked_add_signed(TimeDelta::try_seconds(seconds)?)
}
