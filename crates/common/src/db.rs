//! SQLite table adapter used to reset, seed and dump fixture tables
//!
//! Fixture schemas map onto SQLite schemas: `main` is the primary database
//! and any other schema must be attached with [`SqliteDb::attach`] first.

use crate::client::DbClient;
use crate::types::{Row, TableRef};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Database wrapper shared by every stage of a run
#[derive(Clone)]
pub struct SqliteDb {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDb {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Attach another database file under `schema`. `:memory:` is accepted.
    pub fn attach(&self, schema: &str, path: impl AsRef<Path>) -> Result<()> {
        let conn = self.conn.lock();
        let location = path.as_ref().to_string_lossy().to_string();
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)?),
            params![location],
        )?;
        debug!("Attached {} as schema {}", location, schema);
        Ok(())
    }

    /// Run raw SQL statements
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Delete every row of each target and clear its AUTOINCREMENT counter
    pub fn reset_tables(&self, targets: &[TableRef]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for target in targets {
            tx.execute(&format!("DELETE FROM {}", qualified(target)?), [])?;

            let schema = quote_ident(&target.schema)?;
            let has_sequence: i64 = tx.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
                    schema
                ),
                [],
                |row| row.get(0),
            )?;
            if has_sequence > 0 {
                tx.execute(
                    &format!("DELETE FROM {}.sqlite_sequence WHERE name = ?1", schema),
                    params![target.table],
                )?;
            }
            debug!("Reset {}", target);
        }

        tx.commit()?;
        Ok(())
    }

    /// Insert rows in declared order inside one transaction
    pub fn insert_rows(&self, target: &TableRef, rows: &[Row]) -> Result<()> {
        let table = qualified(target)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for row in rows {
            if row.is_empty() {
                tx.execute(&format!("INSERT INTO {} DEFAULT VALUES", table), [])?;
                continue;
            }

            let mut columns = Vec::with_capacity(row.len());
            for column in row.keys() {
                columns.push(quote_ident(column).map_err(|_| Error::InvalidRow {
                    table: target.to_string(),
                    reason: format!("invalid column name {:?}", column),
                })?);
            }
            let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();

            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            );
            tx.execute(&sql, params_from_iter(row.values().map(to_sql)))?;
        }

        tx.commit()?;
        debug!("Inserted {} row(s) into {}", rows.len(), target);
        Ok(())
    }

    /// Every row of the table in rowid order
    pub fn select_all(&self, target: &TableRef) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY rowid",
            qualified(target)?
        ))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), from_sql(row.get_ref(i)?));
            }
            results.push(record);
        }

        Ok(results)
    }
}

#[async_trait]
impl DbClient for SqliteDb {
    async fn reset(&self, targets: &[TableRef]) -> Result<()> {
        self.reset_tables(targets)
    }

    async fn bulk_insert(&self, target: &TableRef, rows: &[Row]) -> Result<()> {
        self.insert_rows(target, rows)
    }

    async fn fetch_all(&self, target: &TableRef) -> Result<Value> {
        let rows = self.select_all(target)?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

/// Quote an SQL identifier, rejecting names SQLite cannot hold
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn qualified(target: &TableRef) -> Result<String> {
    Ok(format!(
        "{}.{}",
        quote_ident(&target.schema)?,
        quote_ident(&target.table)?
    ))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Nested structures are stored as their JSON text
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}
