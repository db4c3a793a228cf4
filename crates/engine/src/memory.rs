//! In-process [`FactStore`] over fixed row sets.
//!
//! Evaluates the structured form of a query (predicates and group columns)
//! with the same semantics as the SQL the PostgreSQL store runs: NULL never
//! matches a predicate, `SUM` skips NULL measures, and an ungrouped query
//! always yields exactly one row.

use std::collections::{BTreeMap, BTreeSet};

use crimestat_contracts::Scalar;

use crate::error::StoreError;
use crate::project::GroupRow;
use crate::query::{AggregateQuery, DistinctQuery, Predicate};
use crate::store::FactStore;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Scalar>>>,
}

impl MemoryTable {
    fn column_index(&self, table: &str, column: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                StoreError::Schema(format!("column `{}` does not exist on `{}`", column, table))
            })
    }

    /// Rows with fewer or more values than declared columns are a schema
    /// failure at query time.
    fn checked_rows<'a>(
        &'a self,
        table: &str,
    ) -> impl Iterator<Item = Result<&'a [Option<Scalar>], StoreError>> + 'a {
        let width = self.columns.len();
        let table = table.to_string();
        self.rows.iter().enumerate().map(move |(idx, row)| {
            if row.len() == width {
                Ok(row.as_slice())
            } else {
                Err(StoreError::Schema(format!(
                    "row {} of `{}` has {} values, expected {}",
                    idx,
                    table,
                    row.len(),
                    width
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFactStore {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a physical table. Every row should have one value per column.
    pub fn with_table(
        mut self,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Option<Scalar>>>,
    ) -> Self {
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::Schema(format!("relation `{}` does not exist", name)))
    }
}

enum CompiledPredicate<'a> {
    Eq(usize, &'a Scalar),
    IdOrLabel(usize, Scalar, usize, Scalar),
}

impl CompiledPredicate<'_> {
    fn matches(&self, row: &[Option<Scalar>]) -> bool {
        match self {
            CompiledPredicate::Eq(idx, value) => row[*idx].as_ref() == Some(*value),
            CompiledPredicate::IdOrLabel(id_idx, id, label_idx, label) => {
                row[*id_idx].as_ref() == Some(id) || row[*label_idx].as_ref() == Some(label)
            }
        }
    }
}

fn aggregate_rows(
    data: &MemoryTable,
    query: &AggregateQuery,
) -> Result<Vec<GroupRow>, StoreError> {
    let name = query.table.table;

    let mut predicates = Vec::with_capacity(query.predicates.len());
    for predicate in &query.predicates {
        predicates.push(match predicate {
            Predicate::Eq { column, value } => {
                CompiledPredicate::Eq(data.column_index(name, column)?, value)
            }
            Predicate::IdOrLabel {
                id_column,
                id,
                column,
                label,
            } => CompiledPredicate::IdOrLabel(
                data.column_index(name, id_column)?,
                Scalar::Int(*id),
                data.column_index(name, column)?,
                Scalar::text(label.as_str()),
            ),
        });
    }

    let group_positions = query
        .group_by
        .iter()
        .map(|d| data.column_index(name, d.column))
        .collect::<Result<Vec<_>, _>>()?;
    let measure_position = data.column_index(name, query.table.measure)?;

    let mut groups: BTreeMap<Vec<Option<Scalar>>, Option<i128>> = BTreeMap::new();
    for row in data.checked_rows(name) {
        let row = row?;
        if !predicates.iter().all(|p| p.matches(row)) {
            continue;
        }

        let key = group_positions
            .iter()
            .map(|&idx| row[idx].clone())
            .collect::<Vec<_>>();
        let sum = groups.entry(key).or_insert(None);

        match &row[measure_position] {
            Some(Scalar::Int(value)) => *sum = Some(sum.unwrap_or(0) + i128::from(*value)),
            Some(Scalar::Text(raw)) => {
                return Err(StoreError::Schema(format!(
                    "measure `{}` holds non-integer value `{}`",
                    query.table.measure, raw
                )));
            }
            None => {}
        }
    }

    if groups.is_empty() && query.group_by.is_empty() {
        groups.insert(Vec::new(), None);
    }

    Ok(groups
        .into_iter()
        .map(|(values, sum)| GroupRow {
            values,
            total: sum.map(|s| s.to_string()),
        })
        .collect())
}

impl FactStore for MemoryFactStore {
    async fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<GroupRow>, StoreError> {
        aggregate_rows(self.table(query.table.table)?, query)
    }

    async fn distinct(&self, query: &DistinctQuery) -> Result<Vec<Option<Scalar>>, StoreError> {
        let data = self.table(query.table.table)?;
        let idx = data.column_index(query.table.table, query.dimension.column)?;

        let mut values = BTreeSet::new();
        for row in data.checked_rows(query.table.table) {
            if let Some(value) = &row?[idx] {
                values.insert(value.clone());
            }
        }

        Ok(values.into_iter().map(Some).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
