//! PostgreSQL-backed store
//!
//! One `PgConnection` per [`Connection`]; no pool, so every worker owns its
//! session outright. Bulk loading streams the file through `COPY ... FROM STDIN`
//! into a temp staging table, then moves the rows over with the audit stamp
//! applied, all inside one transaction.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgTypeInfo};
use sqlx::{Connection as _, Executor as _, Postgres, QueryBuilder};

use super::{
    check_parameter_limit, insert_sql, BulkLoadSpec, Capabilities, Connection, PreparedInsert,
    StatementCounter, Store, POSTGRES_MAX_PARAMETERS,
};
use crate::record::{AuditStamp, Customer, CUSTOMERS_TABLE, CUSTOMER_COLUMNS};
use crate::{Error, Result};

const STAGING_TABLE: &str = "customers_staging";

#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    pub url: String,
    pub connect_timeout_seconds: u64,
    /// Session `statement_timeout`; 0 leaves the server default.
    pub statement_timeout_seconds: u64,
    /// Session `lock_timeout`; 0 leaves the server default.
    pub lock_timeout_seconds: u64,
    /// Allow `bulk-load` to stream local files through COPY.
    pub local_file_load: bool,
}

pub struct PgStore {
    connect: PgConnectOptions,
    options: PgStoreOptions,
    counter: StatementCounter,
}

impl PgStore {
    pub fn new(options: PgStoreOptions) -> Result<Self> {
        let connect = PgConnectOptions::from_str(&options.url).map_err(Error::Database)?;
        Ok(Self {
            connect,
            options,
            counter: StatementCounter::default(),
        })
    }

    async fn open(&self) -> Result<PgConnection> {
        let timeout = Duration::from_secs(self.options.connect_timeout_seconds.max(1));
        let mut conn = tokio::time::timeout(timeout, PgConnection::connect_with(&self.connect))
            .await
            .map_err(|_| {
                Error::Internal(format!(
                    "connecting to Postgres timed out after {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(Error::Database)?;

        if self.options.statement_timeout_seconds > 0 {
            conn.execute(
                format!(
                    "SET statement_timeout = '{}s'",
                    self.options.statement_timeout_seconds
                )
                .as_str(),
            )
            .await
            .map_err(Error::Database)?;
        }
        if self.options.lock_timeout_seconds > 0 {
            conn.execute(format!("SET lock_timeout = '{}s'", self.options.lock_timeout_seconds).as_str())
                .await
                .map_err(Error::Database)?;
        }

        Ok(conn)
    }
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            local_file_load: self.options.local_file_load,
            max_parameters: POSTGRES_MAX_PARAMETERS,
        }
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self.open().await?;
        tracing::debug!(
            host = self.connect.get_host(),
            database = self.connect.get_database().unwrap_or_default(),
            "Opened Postgres connection"
        );
        Ok(Box::new(PgStoreConnection {
            conn,
            counter: self.counter.clone(),
            capabilities: self.capabilities(),
        }))
    }
}

struct PgStoreConnection {
    conn: PgConnection,
    counter: StatementCounter,
    capabilities: Capabilities,
}

#[async_trait]
impl Connection for PgStoreConnection {
    async fn insert(&mut self, rows: &[Customer], stamp: &AuditStamp) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        check_parameter_limit(rows.len(), &self.capabilities)?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {CUSTOMERS_TABLE} ({}) ",
            CUSTOMER_COLUMNS.join(", ")
        ));
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.custom_id.as_str())
                .push_bind(row.name.as_str())
                .push_bind(row.email.as_str())
                .push_bind(row.company.as_str())
                .push_bind(row.city.as_str())
                .push_bind(row.country.as_str());
            b.push_bind(row.birthday.as_str()).push_unseparated("::date");
            b.push_bind(stamp.as_str()).push_unseparated("::timestamp");
            b.push_bind(stamp.as_str()).push_unseparated("::timestamp");
        });

        self.counter.record();
        let result = builder
            .build()
            .persistent(false)
            .execute(&mut self.conn)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn prepare(&mut self, rows: usize) -> Result<PreparedInsert> {
        if rows == 0 {
            return Err(Error::Internal(
                "cannot prepare an insert for zero rows".to_string(),
            ));
        }
        check_parameter_limit(rows, &self.capabilities)?;

        let statement = PreparedInsert::new(rows, insert_sql(rows));
        // The cache is keyed by SQL text, so the parameter types declared here
        // are the ones every later `execute` binds against.
        let types = text_parameters(statement.parameters());
        (&mut self.conn)
            .prepare_with(statement.sql(), &types)
            .await
            .map_err(Error::Database)?;
        Ok(statement)
    }

    async fn execute(
        &mut self,
        statement: &PreparedInsert,
        rows: &[Customer],
        stamp: &AuditStamp,
    ) -> Result<u64> {
        statement.check_arity(rows)?;

        let mut query = sqlx::query(statement.sql());
        for row in rows {
            for field in row.fields() {
                query = query.bind(field);
            }
            query = query.bind(stamp.as_str()).bind(stamp.as_str());
        }

        self.counter.record();
        let result = query
            .persistent(true)
            .execute(&mut self.conn)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn bulk_load(&mut self, spec: &BulkLoadSpec) -> Result<u64> {
        if !self.capabilities.local_file_load {
            return Err(Error::Capability(
                "local file loading is disabled (database.local_file_load = false)".to_string(),
            ));
        }
        if spec.skip_lines > 1 {
            return Err(Error::Capability(format!(
                "COPY skips at most one header line, {} requested",
                spec.skip_lines
            )));
        }

        let file = tokio::fs::File::open(&spec.path)
            .await
            .map_err(|source| Error::SourceOpen {
                path: spec.path.clone(),
                source,
            })?;

        let mut staging_columns = spec.columns.clone();
        staging_columns.sort_by_key(|(field, _)| *field);
        let staging_ddl = staging_columns
            .iter()
            .map(|(_, column)| format!("{column} TEXT"))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = spec.column_list();
        let select_list = staging_columns
            .iter()
            .map(|(_, column)| {
                if column == "birthday" {
                    format!("{column}::date")
                } else {
                    column.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        tracing::debug!(
            path = %spec.path.display(),
            line_terminator = ?spec.line_terminator,
            "Starting COPY bulk load"
        );

        let mut tx = self.conn.begin().await.map_err(Error::Database)?;

        self.counter.record();
        sqlx::query(&format!(
            "CREATE TEMP TABLE {STAGING_TABLE} ({staging_ddl}) ON COMMIT DROP"
        ))
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        self.counter.record();
        let copy_sql = format!(
            "COPY {STAGING_TABLE} ({column_list}) FROM STDIN WITH (FORMAT csv, HEADER {}, DELIMITER '{}', QUOTE '{}')",
            spec.skip_lines == 1,
            spec.delimiter as char,
            spec.quote as char
        );
        let mut copy = tx.copy_in_raw(&copy_sql).await.map_err(Error::Database)?;
        let sent = copy.read_from(file).await.map(|_| ());
        if let Err(e) = sent {
            let message = e.to_string();
            let _ = copy.abort(message).await;
            return Err(Error::Database(e));
        }
        let staged = copy.finish().await.map_err(Error::Database)?;

        self.counter.record();
        let result = sqlx::query(&format!(
            "INSERT INTO {} ({column_list}, created_at, updated_at)
             SELECT {select_list}, $1::timestamp, $1::timestamp FROM {STAGING_TABLE}",
            spec.table
        ))
        .bind(spec.stamp.as_str())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(staged, loaded = result.rows_affected(), "COPY bulk load committed");
        Ok(result.rows_affected())
    }

    async fn row_count(&mut self) -> Result<u64> {
        self.counter.record();
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {CUSTOMERS_TABLE}"))
            .fetch_one(&mut self.conn)
            .await
            .map_err(Error::Database)?;
        Ok(count.max(0) as u64)
    }

    async fn statement_count(&mut self) -> Result<u64> {
        Ok(self.counter.record())
    }

    async fn truncate(&mut self) -> Result<()> {
        self.counter.record();
        sqlx::query(&format!("TRUNCATE TABLE {CUSTOMERS_TABLE}"))
            .execute(&mut self.conn)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

/// Every field and stamp is bound as text; the `::date` and `::timestamp`
/// casts in the statement convert server-side.
fn text_parameters(count: usize) -> Vec<PgTypeInfo> {
    vec![<&str as sqlx::Type<Postgres>>::type_info(); count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::TypeInfo as _;

    #[test]
    fn prepared_parameters_are_declared_as_text() {
        let statement = PreparedInsert::new(3, insert_sql(3));
        let types = text_parameters(statement.parameters());
        assert_eq!(types.len(), 27);
        let bound = <&str as sqlx::Type<Postgres>>::type_info();
        assert!(types.iter().all(|ty| *ty == bound && ty.name() == "TEXT"));
    }
}
