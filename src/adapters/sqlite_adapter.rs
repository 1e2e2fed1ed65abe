//! SQLite warehouse adapter.
//!
//! Dates are stored as `YYYY-MM-DD` text, so string comparison orders them
//! correctly. `$1`-style placeholders are bound by position.

use crate::domain::bar::format_date;
use crate::domain::config::WarehouseConfig;
use crate::domain::error::EtlError;
use crate::domain::schema;
use crate::ports::warehouse_port::{
    QueryResult, RowBatch, SqlValue, WarehousePort, insert_statement,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::path::Path;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Date(d) => ToSqlOutput::Owned(Value::Text(format_date(*d))),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            SqlValue::Text(String::from_utf8_lossy(t).into_owned())
        }
    }
}

pub struct SqliteWarehouse {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteWarehouse {
    pub fn from_config(config: &WarehouseConfig) -> Result<Self, EtlError> {
        let path = config
            .sqlite_path
            .as_deref()
            .ok_or_else(|| EtlError::missing("sqlite", "path"))?;
        Self::open(path, config.pool_size)
    }

    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, EtlError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| EtlError::persistence(e))?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database.
    pub fn in_memory() -> Result<Self, EtlError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| EtlError::persistence(e))?;

        Ok(Self { pool })
    }

    pub fn apply_default_schema(&self) -> Result<usize, EtlError> {
        schema::apply_default(self)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, EtlError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| EtlError::persistence(e))
    }
}

impl WarehousePort for SqliteWarehouse {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, EtlError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
        Ok(changed as u64)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), EtlError> {
        let conn = self.conn()?;
        conn.execute_batch(sql)
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))
    }

    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>, EtlError> {
        let result = self.query_rows(sql, params)?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EtlError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|c| c.to_uppercase())
            .collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value = row
                    .get_ref(i)
                    .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
                values.push(from_value_ref(value));
            }
            out.push(values);
        }

        Ok(QueryResult { columns, rows: out })
    }

    fn bulk_write(&self, table: &str, batch: &RowBatch) -> Result<usize, EtlError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let sql = insert_statement(table, &batch.columns);

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
        {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
            for (i, row) in batch.rows.iter().enumerate() {
                if row.len() != batch.columns.len() {
                    return Err(EtlError::persistence(format!(
                        "row {i} has {} values for {} columns",
                        row.len(),
                        batch.columns.len()
                    )));
                }
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;
            }
        }
        tx.commit()
            .map_err(|e: rusqlite::Error| EtlError::persistence(e))?;

        Ok(batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::WarehouseBackend;
    use chrono::NaiveDate;

    fn warehouse() -> SqliteWarehouse {
        let w = SqliteWarehouse::in_memory().unwrap();
        w.apply_default_schema().unwrap();
        w
    }

    #[test]
    fn from_config_missing_path() {
        let config = WarehouseConfig {
            backend: WarehouseBackend::Sqlite,
            sqlite_path: None,
            postgres_connection: None,
            pool_size: 4,
        };
        let result = SqliteWarehouse::from_config(&config);
        assert!(matches!(result, Err(EtlError::ConfigMissing { .. })));
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("warehouse.db");
        let w = SqliteWarehouse::open(&path, 2).unwrap();
        w.apply_default_schema().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn bulk_write_and_query_back() {
        let w = warehouse();
        let batch = RowBatch {
            columns: vec!["PAIR".into(), "DATE".into(), "RATE".into(), "SOURCE".into()],
            rows: vec![
                vec![
                    "USDGBP".into(),
                    SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                    SqlValue::Real(0.79),
                    "ecb".into(),
                ],
                vec![
                    "USDGBP".into(),
                    SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
                    SqlValue::Real(0.78),
                    "ecb".into(),
                ],
            ],
        };
        assert_eq!(w.bulk_write("FX_DAILY", &batch).unwrap(), 2);

        let result = w
            .query_rows(
                "SELECT pair, date, rate FROM FX_DAILY WHERE DATE >= $1 ORDER BY DATE",
                &[SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())],
            )
            .unwrap();
        assert_eq!(result.columns, vec!["PAIR", "DATE", "RATE"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][1].as_date(), NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(result.rows[0][2], SqlValue::Real(0.78));
    }

    #[test]
    fn bulk_write_rejects_ragged_rows() {
        let w = warehouse();
        let batch = RowBatch {
            columns: vec!["PAIR".into(), "DATE".into()],
            rows: vec![vec!["USDGBP".into()]],
        };
        assert!(matches!(
            w.bulk_write("FX_DAILY", &batch),
            Err(EtlError::PersistenceFailure { .. })
        ));
        let count = w
            .query_scalar("SELECT COUNT(*) FROM FX_DAILY", &[])
            .unwrap()
            .and_then(|v| v.as_i64());
        assert_eq!(count, Some(0));
    }

    #[test]
    fn query_scalar_without_rows_is_none() {
        let w = warehouse();
        let value = w
            .query_scalar("SELECT SOURCE FROM LOAD_METADATA WHERE SOURCE = $1", &["x".into()])
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn bad_sql_is_persistence_failure() {
        let w = warehouse();
        assert!(matches!(
            w.execute("INSERT INTO NOPE VALUES (1)", &[]),
            Err(EtlError::PersistenceFailure { .. })
        ));
    }
}
