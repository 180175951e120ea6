//! Target-table column model and declared SQL type parsing.
//!
//! A [`ColumnSchema`] is read fresh from the storage engine at the start of
//! every ingest and is never cached between calls. This module owns:
//!
//! - [`SqlType`], the coercion family a declared column type belongs to
//! - [`DeclaredType`], which splits a raw declaration such as `VARCHAR(50)` or
//!   `DECIMAL(18,2)` into its family plus length/precision/scale
//! - the list of system-managed columns that never come from a spreadsheet

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

const DECIMAL_MAX_PRECISION: u32 = 38;

/// Columns populated by the loader itself: surrogate id, period marker, load timestamp.
pub const SYSTEM_COLUMNS: &[&str] = &["id", "period_date", "upload_date"];

pub const PERIOD_COLUMN: &str = "period_date";
pub const UPLOAD_COLUMN: &str = "upload_date";

pub fn is_system_column(name: &str) -> bool {
    let trimmed = name.trim();
    SYSTEM_COLUMNS
        .iter()
        .any(|system| trimmed.eq_ignore_ascii_case(system))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    /// Unsigned 8-bit, as SQL Server's TINYINT.
    Tiny,
    Small,
    Regular,
    Big,
}

impl IntegerWidth {
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            IntegerWidth::Tiny => (0, u8::MAX as i64),
            IntegerWidth::Small => (i16::MIN as i64, i16::MAX as i64),
            IntegerWidth::Regular => (i32::MIN as i64, i32::MAX as i64),
            IntegerWidth::Big => (i64::MIN, i64::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    String,
    Boolean,
    Integer(IntegerWidth),
    /// Exact numerics: DECIMAL, NUMERIC, MONEY.
    Decimal,
    /// Approximate numerics: FLOAT, REAL, DOUBLE.
    Float,
    Date,
    DateTime,
    Time,
    Guid,
    /// Any declaration this crate has no coercion for; values pass through as text.
    Unknown(String),
}

impl SqlType {
    pub fn as_str(&self) -> &str {
        match self {
            SqlType::String => "string",
            SqlType::Boolean => "boolean",
            SqlType::Integer(IntegerWidth::Tiny) => "tinyint",
            SqlType::Integer(IntegerWidth::Small) => "smallint",
            SqlType::Integer(IntegerWidth::Regular) => "int",
            SqlType::Integer(IntegerWidth::Big) => "bigint",
            SqlType::Decimal => "decimal",
            SqlType::Float => "float",
            SqlType::Date => "date",
            SqlType::DateTime => "datetime",
            SqlType::Time => "time",
            SqlType::Guid => "guid",
            SqlType::Unknown(name) => name.as_str(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Integer(_) | SqlType::Decimal | SqlType::Float
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::Date | SqlType::DateTime | SqlType::Time)
    }

    fn from_base_name(base: &str) -> SqlType {
        match base {
            "varchar" | "nvarchar" | "char" | "nchar" | "text" | "ntext" | "string"
            | "character" | "varying character" | "native character" | "clob" => {
                SqlType::String
            }
            "bit" | "bool" | "boolean" => SqlType::Boolean,
            "tinyint" => SqlType::Integer(IntegerWidth::Tiny),
            "smallint" => SqlType::Integer(IntegerWidth::Small),
            "int" | "integer" | "mediumint" => SqlType::Integer(IntegerWidth::Regular),
            "bigint" | "int8" => SqlType::Integer(IntegerWidth::Big),
            "decimal" | "numeric" | "money" | "smallmoney" => SqlType::Decimal,
            "float" | "real" | "double" | "double precision" => SqlType::Float,
            "date" => SqlType::Date,
            "datetime" | "datetime2" | "smalldatetime" | "timestamp" | "datetimeoffset" => {
                SqlType::DateTime
            }
            "time" => SqlType::Time,
            "uniqueidentifier" | "uuid" | "guid" => SqlType::Guid,
            other => SqlType::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SqlType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(DeclaredType::parse(value)?.sql_type)
    }
}

impl Serialize for SqlType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SqlType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        SqlType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

/// A column declaration split into its type family and size arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredType {
    pub sql_type: SqlType,
    pub max_length: Option<usize>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl DeclaredType {
    pub fn parse(declaration: &str) -> Result<Self> {
        let trimmed = declaration.trim();
        ensure!(!trimmed.is_empty(), "Column type declaration is empty");

        let (base, args) = match trimmed.find('(') {
            Some(start) => {
                ensure!(
                    trimmed.ends_with(')'),
                    "Column type '{trimmed}' must close with ')'"
                );
                (&trimmed[..start], Some(&trimmed[start + 1..trimmed.len() - 1]))
            }
            None => (trimmed, None),
        };
        let base = base
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let sql_type = SqlType::from_base_name(&base);

        let mut declared = DeclaredType {
            sql_type,
            max_length: None,
            precision: None,
            scale: None,
        };
        let Some(args) = args else {
            return Ok(declared);
        };

        let parts = args
            .split(',')
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        match &declared.sql_type {
            SqlType::String => {
                // VARCHAR(MAX) carries no usable bound.
                if let Some(first) = parts.first()
                    && !first.eq_ignore_ascii_case("max")
                {
                    let length = first
                        .parse::<usize>()
                        .map_err(|_| anyhow!("Invalid length '{first}' in '{trimmed}'"))?;
                    declared.max_length = Some(length);
                }
            }
            SqlType::Decimal => {
                if let Some(first) = parts.first() {
                    let precision = first
                        .parse::<u32>()
                        .map_err(|_| anyhow!("Invalid precision '{first}' in '{trimmed}'"))?;
                    ensure!(
                        precision > 0 && precision <= DECIMAL_MAX_PRECISION,
                        "Decimal precision must be between 1 and {DECIMAL_MAX_PRECISION}"
                    );
                    declared.precision = Some(precision);
                }
                if let Some(second) = parts.get(1) {
                    let scale = second
                        .parse::<u32>()
                        .map_err(|_| anyhow!("Invalid scale '{second}' in '{trimmed}'"))?;
                    if let Some(precision) = declared.precision {
                        ensure!(
                            scale <= precision,
                            "Decimal scale ({scale}) cannot exceed precision ({precision})"
                        );
                    }
                    declared.scale = Some(scale);
                }
            }
            _ => {}
        }
        Ok(declared)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expression: Option<String>,
}

impl ColumnSchema {
    /// A nullable column with no size arguments and no default.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            max_length: None,
            precision: None,
            scale: None,
            nullable: true,
            default_expression: None,
        }
    }

    pub fn from_declaration(
        name: impl Into<String>,
        declaration: &str,
        nullable: bool,
        default_expression: Option<String>,
    ) -> Result<Self> {
        let declared = DeclaredType::parse(declaration)?;
        Ok(Self {
            name: name.into(),
            sql_type: declared.sql_type,
            max_length: declared.max_length,
            precision: declared.precision,
            scale: declared.scale,
            nullable,
            default_expression,
        })
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(expression.into());
        self
    }

    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// The default expression, ignoring blank and `NULL` declarations.
    pub fn default_expression(&self) -> Option<&str> {
        self.default_expression
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty() && !expr.eq_ignore_ascii_case("null"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_parses_string_length() {
        let declared = DeclaredType::parse("NVARCHAR(50)").unwrap();
        assert_eq!(declared.sql_type, SqlType::String);
        assert_eq!(declared.max_length, Some(50));

        let unbounded = DeclaredType::parse("varchar(max)").unwrap();
        assert_eq!(unbounded.max_length, None);
    }

    #[test]
    fn declared_type_parses_precision_and_scale() {
        let declared = DeclaredType::parse("decimal(18, 2)").unwrap();
        assert_eq!(declared.sql_type, SqlType::Decimal);
        assert_eq!(declared.precision, Some(18));
        assert_eq!(declared.scale, Some(2));
        assert!(DeclaredType::parse("decimal(4,6)").is_err());
        assert!(DeclaredType::parse("decimal(18,2").is_err());
        // Float precision is a storage hint, not a decimal bound.
        assert_eq!(DeclaredType::parse("FLOAT(53)").unwrap().precision, None);
    }

    #[test]
    fn declared_type_maps_integer_widths() {
        assert_eq!(
            SqlType::from_str("TINYINT").unwrap(),
            SqlType::Integer(IntegerWidth::Tiny)
        );
        assert_eq!(
            SqlType::from_str("bigint").unwrap(),
            SqlType::Integer(IntegerWidth::Big)
        );
        assert_eq!(
            SqlType::from_str("INTEGER").unwrap(),
            SqlType::Integer(IntegerWidth::Regular)
        );
    }

    #[test]
    fn unknown_declarations_are_preserved() {
        let parsed = SqlType::from_str("geography").unwrap();
        assert_eq!(parsed, SqlType::Unknown("geography".to_string()));
        assert_eq!(parsed.to_string(), "geography");
    }

    #[test]
    fn system_columns_match_case_insensitively() {
        assert!(is_system_column("ID"));
        assert!(is_system_column(" Period_Date "));
        assert!(!is_system_column("facility_id"));
    }

    #[test]
    fn blank_default_expression_is_ignored() {
        let column = ColumnSchema::new("amount", SqlType::Decimal).with_default("   ");
        assert_eq!(column.default_expression(), None);
        let column = ColumnSchema::new("amount", SqlType::Decimal).with_default("NULL");
        assert_eq!(column.default_expression(), None);
    }
}
