use std::path::Path;

use rusqlite::types::{FromSql, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};

use super::schema::{Migration, MIGRATIONS};

const SCHEMA_VERSION: &str = "schema_version";

const BOOTSTRAP: &str = r#"
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS options (
    key TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL DEFAULT ''
);
"#;

/// What `save_record` does when the row's key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Replace,
    Ignore,
}

/// Column name / value pairs of one row.
pub type Record = Vec<(&'static str, Value)>;

/// Thin record store over a single SQLite connection.
///
/// Every call runs on the connection's own thread, so writes are serialized.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(BOOTSTRAP)?;
            Ok(())
        })
        .await?;

        let store = Self { conn };
        let before = store.schema_version().await?;
        let after = store.migrate(MIGRATIONS).await?;
        if after > before {
            store
                .conn
                .call(|conn| {
                    conn.execute_batch("VACUUM")?;
                    Ok(())
                })
                .await?;
        }

        Ok(store)
    }

    // Migrations

    pub async fn schema_version(&self) -> Result<u32> {
        match self.get_opt(SCHEMA_VERSION).await? {
            None => Ok(0),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("invalid schema version `{v}`"))),
        }
    }

    /// Apply every step newer than the stored version, one transaction per
    /// step. Returns the resulting version.
    pub async fn migrate(&self, migrations: &'static [Migration]) -> Result<u32> {
        let mut current = self.schema_version().await?;
        let start = current;

        for migration in migrations.iter().filter(|m| m.version > start) {
            let version = migration.version;
            let sql = migration.sql;

            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute_batch(sql)?;
                    tx.execute(
                        "REPLACE INTO options (key, value) VALUES (?1, ?2)",
                        params![SCHEMA_VERSION, version.to_string()],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await
                .map_err(|source| AppError::Migration { version, source })?;

            tracing::info!("Applied schema migration {}", version);
            current = version;
        }

        Ok(current)
    }

    // Statements

    /// Run a statement. Returns the new rowid for an `INSERT` that inserted
    /// something, otherwise the number of affected rows.
    pub async fn exec(&self, sql: &'static str, params: Vec<Value>) -> Result<i64> {
        let result = self
            .conn
            .call(move |conn| {
                let count = conn.execute(sql, params_from_iter(params.iter()))?;
                if count > 0 && is_insert(sql) {
                    Ok(conn.last_insert_rowid())
                } else {
                    Ok(count as i64)
                }
            })
            .await?;
        Ok(result)
    }

    pub async fn query_all<T, F>(&self, sql: String, params: Vec<Value>, map: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), map)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn query_row<T, F>(&self, sql: String, params: Vec<Value>, map: F) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    {
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(&sql, params_from_iter(params.iter()), map)
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    pub async fn query_value<T>(&self, sql: String, params: Vec<Value>) -> Result<Option<T>>
    where
        T: FromSql + Send + 'static,
    {
        self.query_row(sql, params, |row| row.get::<_, T>(0)).await
    }

    pub async fn save_record(
        &self,
        table: &'static str,
        record: Record,
        on_conflict: OnConflict,
    ) -> Result<usize> {
        let count = self
            .conn
            .call(move |conn| Ok(save_record_in(conn, table, &record, on_conflict)?))
            .await?;
        Ok(count)
    }

    /// Run `f` inside one transaction: committed if it returns `Ok`, rolled
    /// back otherwise.
    pub async fn transaction<T, F>(&self, f: F) -> std::result::Result<T, tokio_rusqlite::Error>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
    {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
    }

    // Options

    pub async fn get_opt(&self, key: &str) -> Result<Option<String>> {
        self.query_value(
            "SELECT value FROM options WHERE key = ?1".to_string(),
            vec![Value::Text(key.to_string())],
        )
        .await
    }

    pub async fn set_opt(&self, key: &str, value: &str) -> Result<()> {
        self.save_record(
            "options",
            vec![
                ("key", Value::Text(key.to_string())),
                ("value", Value::Text(value.to_string())),
            ],
            OnConflict::Replace,
        )
        .await?;
        Ok(())
    }
}

/// Insert `record` into `table` on an open connection or transaction.
pub fn save_record_in(
    conn: &rusqlite::Connection,
    table: &str,
    record: &[(&'static str, Value)],
    on_conflict: OnConflict,
) -> rusqlite::Result<usize> {
    let command = match on_conflict {
        OnConflict::Replace => "REPLACE",
        OnConflict::Ignore => "INSERT OR IGNORE",
    };
    let columns = record
        .iter()
        .map(|(column, _)| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(",");
    let placeholders = vec!["?"; record.len()].join(",");
    let sql = format!("{command} INTO \"{table}\" ({columns}) VALUES ({placeholders})");

    conn.execute(&sql, params_from_iter(record.iter().map(|(_, value)| value)))
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}
