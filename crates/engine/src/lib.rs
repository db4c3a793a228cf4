//! Aggregation engine over the published fact tables.
//!
//! A request names a table and a set of equality filters; the registry
//! resolves the table, the query builder validates the filters and produces a
//! grouped `SUM` query, a [`FactStore`] runs it and the projector shapes the
//! grouped rows into an ordered [`QueryResult`].

use crimestat_contracts::{DimensionSummary, Distribution, QueryResult, Scalar, TableSummary};

pub mod dashboard;
pub mod error;
pub mod memory;
pub mod project;
pub mod query;
pub mod registry;
pub mod store;

pub use error::{EngineError, StoreError};
pub use memory::MemoryFactStore;
pub use query::FilterSpec;
pub use store::{FactStore, PgFactStore, PgStoreConfig};

use crate::query::AggregateQuery;

pub fn list_tables() -> Vec<TableSummary> {
    registry::tables().iter().map(|t| t.summary()).collect()
}

pub fn list_dimensions(table_id: &str) -> Result<Vec<DimensionSummary>, EngineError> {
    Ok(registry::resolve(table_id)?.dimension_summaries())
}

pub async fn distinct_values<S: FactStore>(
    store: &S,
    table_id: &str,
    dimension: &str,
) -> Result<Vec<Scalar>, EngineError> {
    let table = registry::resolve(table_id)?;
    let query = query::distinct(table, dimension)?;
    let values = store.distinct(&query).await?;
    Ok(project::sort_distinct(values))
}

pub async fn execute<S: FactStore>(
    store: &S,
    query: &AggregateQuery,
) -> Result<QueryResult, EngineError> {
    let groups = store.aggregate(query).await?;
    project::project(query, groups)
}

pub async fn query_aggregates<S: FactStore>(
    store: &S,
    table_id: &str,
    filters: &FilterSpec,
) -> Result<QueryResult, EngineError> {
    let table = registry::resolve(table_id)?;
    let query = query::build(table, filters)?;
    execute(store, &query).await
}

/// Measure totals per value of a single dimension.
pub async fn distribution<S: FactStore>(
    store: &S,
    table_id: &str,
    dimension: &str,
    filters: &FilterSpec,
) -> Result<Distribution, EngineError> {
    let table = registry::resolve(table_id)?;
    let query = query::build_grouped(table, filters, &[dimension])?;
    let result = execute(store, &query).await?;

    let mut labels = Vec::with_capacity(result.total);
    let mut values = Vec::with_capacity(result.total);
    for row in result.rows {
        labels.push(row.dimensions.into_iter().next().and_then(|(_, v)| v));
        values.push(row.value);
    }

    Ok(Distribution { labels, values })
}
