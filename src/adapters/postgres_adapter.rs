//! PostgreSQL warehouse adapter.

use crate::domain::bar::{format_date, parse_date};
use crate::domain::config::WarehouseConfig;
use crate::domain::error::EtlError;
use crate::ports::warehouse_port::{
    QueryResult, RowBatch, SqlValue, WarehousePort, insert_statement,
};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use std::error::Error;

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Integer(v) => {
                if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Real(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if is_text(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(s) => {
                if *ty == Type::DATE {
                    parse_date(s)
                        .ok_or_else(|| format!("invalid date '{s}'"))?
                        .to_sql(ty, out)
                } else {
                    s.to_sql(ty, out)
                }
            }
            SqlValue::Date(d) => {
                if is_text(ty) {
                    format_date(*d).to_sql(ty, out)
                } else {
                    d.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

fn read_cell(row: &Row, index: usize) -> Result<SqlValue, postgres::Error> {
    let ty = row.columns()[index].type_();
    let value = if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)?.map(SqlValue::Integer)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)?
            .map(|v| SqlValue::Integer(i64::from(v)))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)?
            .map(|v| SqlValue::Integer(i64::from(v)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)?.map(SqlValue::Real)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)?
            .map(|v| SqlValue::Real(f64::from(v)))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(index)?.map(SqlValue::Date)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|v| SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|v| SqlValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string()))
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)?
            .map(|v| SqlValue::Integer(i64::from(v)))
    } else {
        row.try_get::<_, Option<String>>(index)?.map(SqlValue::Text)
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

pub struct PostgresWarehouse {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresWarehouse {
    pub fn from_config(config: &WarehouseConfig) -> Result<Self, EtlError> {
        let connection_string = config
            .postgres_connection
            .as_deref()
            .ok_or_else(|| EtlError::missing("postgres", "connection_string"))?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| EtlError::invalid("postgres", "connection_string", e.to_string()))?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| EtlError::persistence(e))?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, EtlError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| EtlError::persistence(e))
    }
}

impl WarehousePort for PostgresWarehouse {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, EtlError> {
        let mut client = self.conn()?;
        client
            .execute(sql, &param_refs(params))
            .map_err(|e| EtlError::persistence(e))
    }

    fn execute_batch(&self, sql: &str) -> Result<(), EtlError> {
        let mut client = self.conn()?;
        client
            .batch_execute(sql)
            .map_err(|e| EtlError::persistence(e))
    }

    fn query_scalar(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>, EtlError> {
        let mut client = self.conn()?;
        let rows = client
            .query(sql, &param_refs(params))
            .map_err(|e| EtlError::persistence(e))?;
        match rows.first() {
            Some(row) if !row.is_empty() => read_cell(row, 0)
                .map(Some)
                .map_err(|e| EtlError::persistence(e)),
            _ => Ok(None),
        }
    }

    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EtlError> {
        let mut client = self.conn()?;
        let stmt = client
            .prepare(sql)
            .map_err(|e| EtlError::persistence(e))?;
        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_uppercase())
            .collect();
        let rows = client
            .query(&stmt, &param_refs(params))
            .map_err(|e| EtlError::persistence(e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..columns.len())
                .map(|i| read_cell(row, i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EtlError::persistence(e))?;
            out.push(values);
        }

        Ok(QueryResult { columns, rows: out })
    }

    fn bulk_write(&self, table: &str, batch: &RowBatch) -> Result<usize, EtlError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let sql = insert_statement(table, &batch.columns);

        let mut client = self.conn()?;
        let mut tx = client
            .transaction()
            .map_err(|e| EtlError::persistence(e))?;
        let stmt = tx.prepare(&sql).map_err(|e| EtlError::persistence(e))?;
        for (i, row) in batch.rows.iter().enumerate() {
            if row.len() != batch.columns.len() {
                return Err(EtlError::persistence(format!(
                    "row {i} has {} values for {} columns",
                    row.len(),
                    batch.columns.len()
                )));
            }
            tx.execute(&stmt, &param_refs(row))
                .map_err(|e| EtlError::persistence(e))?;
        }
        tx.commit().map_err(|e| EtlError::persistence(e))?;

        Ok(batch.len())
    }
}
