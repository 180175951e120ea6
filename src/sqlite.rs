use std::{path::Path, time::Duration};

use chrono::NaiveDate;
use log::{debug, info, warn};
use rusqlite::{Connection, params, params_from_iter, types::Value as SqlValue};

use crate::{
    data::{FieldValue, Value},
    schema::{ColumnSchema, PERIOD_COLUMN, SqlType, UPLOAD_COLUMN, is_system_column},
    storage::{BulkLoader, LoadSummary, PeriodCount, Result, SchemaIntrospector, StorageError},
    validate::ValidatedRecord,
};

const PERIOD_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed schema introspection and loading.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn declared_columns(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let rows = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Err(StorageError::TableNotFound(table.to_string()));
        }

        rows.into_iter()
            .map(|(name, declared, not_null, default)| {
                let nullable = not_null == 0;
                if declared.trim().is_empty() {
                    let mut column = ColumnSchema::new(name, SqlType::Unknown(String::new()));
                    column.nullable = nullable;
                    column.default_expression = default;
                    return Ok(column);
                }
                ColumnSchema::from_declaration(name.clone(), &declared, nullable, default).map_err(
                    |err| StorageError::Declaration {
                        column: name,
                        message: err.to_string(),
                    },
                )
            })
            .collect()
    }
}

/// Double-quotes an identifier for interpolation into SQL.
fn quote_identifier(name: &str) -> Result<String> {
    if name.trim().is_empty() || name.chars().any(char::is_control) {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Float(number) => SqlValue::Real(*number),
        Value::Decimal(number) => SqlValue::Text(number.to_string()),
        Value::Boolean(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Date(date) => SqlValue::Text(date.format(PERIOD_FORMAT).to_string()),
        Value::DateTime(stamp) => SqlValue::Text(stamp.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Value::Time(time) => SqlValue::Text(time.format("%H:%M:%S%.f").to_string()),
        Value::Guid(guid) => SqlValue::Text(guid.to_string()),
    }
}

impl SchemaIntrospector for SqliteStore {
    fn columns(&self, table: &str, exclude_system: bool) -> Result<Vec<ColumnSchema>> {
        let columns = self.declared_columns(table)?;
        debug!("Table '{}' declares {} column(s)", table, columns.len());
        Ok(columns
            .into_iter()
            .filter(|column| !exclude_system || !is_system_column(&column.name))
            .collect())
    }

    fn period_counts(&self, table: &str, limit: usize) -> Result<Vec<PeriodCount>> {
        let columns = self.declared_columns(table)?;
        if !columns
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(PERIOD_COLUMN))
        {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {period}, COUNT(*) FROM {table} GROUP BY {period} ORDER BY {period} DESC LIMIT ?1",
            period = quote_identifier(PERIOD_COLUMN)?,
            table = quote_identifier(table)?,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(period, rows)| {
                let text = period?;
                // Tolerate timestamps written by other tools.
                let day = text.get(..10).unwrap_or(&text);
                match NaiveDate::parse_from_str(day, PERIOD_FORMAT) {
                    Ok(period) => Some(PeriodCount {
                        period,
                        rows: rows.max(0) as u64,
                    }),
                    Err(_) => {
                        warn!("Ignoring unparseable period value '{text}' in '{table}'");
                        None
                    }
                }
            })
            .collect())
    }
}

impl BulkLoader for SqliteStore {
    fn load(
        &self,
        records: &[ValidatedRecord],
        table: &str,
        period: NaiveDate,
        replace_existing: bool,
    ) -> Result<LoadSummary> {
        let table_sql = quote_identifier(table)?;
        let declared = self.declared_columns(table)?;
        let has_period = declared
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(PERIOD_COLUMN));
        // Stamp the load time ourselves only when the table has no default for it.
        let stamp_upload = declared.iter().any(|column| {
            column.name.eq_ignore_ascii_case(UPLOAD_COLUMN) && column.default_expression().is_none()
        });
        let period_text = period.format(PERIOD_FORMAT).to_string();

        let tx = self.conn.unchecked_transaction()?;
        let mut summary = LoadSummary::default();

        if replace_existing && has_period {
            summary.replaced_count = tx.execute(
                &format!(
                    "DELETE FROM {table_sql} WHERE {} = ?1",
                    quote_identifier(PERIOD_COLUMN)?
                ),
                params![period_text],
            )?;
            info!(
                "Removed {} existing row(s) for period {} from '{}'",
                summary.replaced_count, period_text, table
            );
        }

        for (idx, record) in records.iter().enumerate() {
            let number = idx + 1;
            let mut names = Vec::with_capacity(record.values.len() + 2);
            let mut placeholders = Vec::with_capacity(record.values.len() + 2);
            let mut values = Vec::with_capacity(record.values.len() + 1);

            for (column, value) in &record.values {
                let bound = match value {
                    FieldValue::UseStorageDefault => continue,
                    FieldValue::Invalid => {
                        return Err(StorageError::InvalidRecord {
                            record: number,
                            column: column.clone(),
                        });
                    }
                    FieldValue::Null => SqlValue::Null,
                    FieldValue::Value(value) => sql_value(value),
                };
                names.push(quote_identifier(column)?);
                placeholders.push("?");
                values.push(bound);
            }
            if has_period {
                names.push(quote_identifier(PERIOD_COLUMN)?);
                placeholders.push("?");
                values.push(SqlValue::Text(period_text.clone()));
            }
            if stamp_upload {
                names.push(quote_identifier(UPLOAD_COLUMN)?);
                placeholders.push("CURRENT_TIMESTAMP");
            }

            let sql = if names.is_empty() {
                format!("INSERT INTO {table_sql} DEFAULT VALUES")
            } else {
                format!(
                    "INSERT INTO {table_sql} ({}) VALUES ({})",
                    names.join(", "),
                    placeholders.join(", ")
                )
            };
            tx.prepare_cached(&sql)
                .and_then(|mut stmt| stmt.execute(params_from_iter(values.iter())))
                .map_err(|source| StorageError::RowFailed {
                    record: number,
                    row: record.source_row,
                    source,
                })?;
            summary.inserted_count += 1;
        }

        tx.commit()?;
        info!(
            "Inserted {} row(s) into '{}' for period {}",
            summary.inserted_count, table, period_text
        );
        Ok(summary)
    }
}
