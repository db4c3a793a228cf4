use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use crimestat_contracts::Scalar;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::project::GroupRow;
use crate::query::{AggregateQuery, DistinctQuery, TOTAL_ALIAS};
use crate::registry::{ColumnType, Dimension, FactTable};

/// Read access to the fact tables. Every engine operation takes the store it
/// should run against; implementations own their connection handling.
pub trait FactStore: Send + Sync {
    fn aggregate(
        &self,
        query: &AggregateQuery,
    ) -> impl Future<Output = Result<Vec<GroupRow>, StoreError>> + Send;

    /// Distinct values of one dimension. Order is unspecified.
    fn distinct(
        &self,
        query: &DistinctQuery,
    ) -> impl Future<Output = Result<Vec<Option<Scalar>>, StoreError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub connect_options: PgConnectOptions,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Duration,
    pub statement_timeout: Duration,
}

#[derive(Clone)]
pub struct PgFactStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgFactStore {
    pub async fn connect(config: &PgStoreConfig) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            config.acquire_timeout,
            PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .max_lifetime(config.max_lifetime)
                .connect_with(config.connect_options.clone()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self::from_pool(pool, config.statement_timeout))
    }

    pub fn from_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Checks that every registered table exists with all the columns its
    /// descriptor names.
    pub async fn validate_schema(&self, tables: &[FactTable]) -> Result<(), StoreError> {
        for table in tables {
            let rows = sqlx::query(
                "SELECT column_name \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1",
            )
            .bind(table.table)
            .fetch_all(&self.pool)
            .await?;

            if rows.is_empty() {
                return Err(StoreError::Schema(format!(
                    "required table `{}` does not exist in current schema",
                    table.table
                )));
            }

            let available_columns = rows
                .into_iter()
                .filter_map(|row| row.try_get::<String, _>("column_name").ok())
                .collect::<BTreeSet<_>>();

            let missing = missing_columns(table, &available_columns);
            if !missing.is_empty() {
                return Err(StoreError::Schema(format!(
                    "table `{}` is missing columns [{}]",
                    table.table,
                    missing.join(", ")
                )));
            }
        }

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runs one statement in a read-only transaction bounded by the
    /// configured statement timeout. The transaction is rolled back on any
    /// failure before the error is returned.
    async fn fetch_read_only(&self, sql: &str, binds: &[Scalar]) -> Result<Vec<PgRow>, StoreError> {
        let timeout_str = format!("{}ms", self.statement_timeout.as_millis());
        let mut tx = self.pool.begin().await?;

        let result = async {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;

            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(&timeout_str)
                .execute(&mut *tx)
                .await?;

            let mut query = sqlx::query(sql);
            for bind in binds {
                query = match bind {
                    Scalar::Int(value) => query.bind(*value),
                    Scalar::Text(value) => query.bind(value.as_str()),
                };
            }
            query.fetch_all(&mut *tx).await
        }
        .await;

        match result {
            Ok(rows) => {
                tx.commit().await?;
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "store.rollback_failed");
                }
                Err(err.into())
            }
        }
    }
}

fn decode_dimension(row: &PgRow, dimension: &Dimension) -> Result<Option<Scalar>, StoreError> {
    let schema_error = |err: sqlx::Error| {
        StoreError::Schema(format!("column `{}` could not be decoded: {}", dimension.key, err))
    };

    match dimension.column_type {
        ColumnType::Text => Ok(row
            .try_get::<Option<String>, _>(dimension.key)
            .map_err(schema_error)?
            .map(Scalar::Text)),
        ColumnType::Integer => Ok(row
            .try_get::<Option<i64>, _>(dimension.key)
            .map_err(schema_error)?
            .map(Scalar::Int)),
    }
}

pub(crate) fn missing_columns(table: &FactTable, available: &BTreeSet<String>) -> Vec<String> {
    table
        .required_columns()
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|column| !available.contains(*column))
        .map(str::to_string)
        .collect()
}

impl FactStore for PgFactStore {
    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<GroupRow>, StoreError> {
        let (sql, binds) = query.to_sql();
        tracing::debug!(table = query.table.id, sql = %sql, "store.aggregate");

        let rows = self.fetch_read_only(&sql, &binds).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let values = query
                .group_by
                .iter()
                .map(|d| decode_dimension(&row, d))
                .collect::<Result<Vec<_>, _>>()?;
            let total = row
                .try_get::<Option<String>, _>(TOTAL_ALIAS)
                .map_err(|err| StoreError::Schema(format!("measure total: {}", err)))?;
            out.push(GroupRow { values, total });
        }
        Ok(out)
    }

    async fn distinct(&self, query: &DistinctQuery) -> Result<Vec<Option<Scalar>>, StoreError> {
        let sql = query.to_sql();
        tracing::debug!(table = query.table.id, sql = %sql, "store.distinct");

        let rows = self.fetch_read_only(&sql, &[]).await?;
        rows.iter()
            .map(|row| decode_dimension(row, query.dimension))
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
