//! Filter validation and aggregate query construction.
//!
//! Filters are validated strictly: a key that is not a declared dimension of
//! the table is rejected for every table alike. Empty values are treated as
//! "no constraint".

use std::collections::BTreeMap;

use crimestat_contracts::Scalar;

use crate::error::EngineError;
use crate::registry::{ColumnType, Dimension, FactTable};

/// Requested equality filters, keyed by dimension.
pub type FilterSpec = BTreeMap<String, String>;

/// Output alias of the summed measure in generated SQL.
pub const TOTAL_ALIAS: &str = "measure_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Eq {
        column: &'static str,
        value: Scalar,
    },
    /// Numeric value against a dimension that also stores an integer id:
    /// matches either the id column or the label column.
    IdOrLabel {
        id_column: &'static str,
        id: i64,
        column: &'static str,
        label: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub table: &'static FactTable,
    pub group_by: Vec<&'static Dimension>,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistinctQuery {
    pub table: &'static FactTable,
    pub dimension: &'static Dimension,
}

/// Filter by every supplied predicate and group by every declared dimension.
pub fn build(table: &'static FactTable, filters: &FilterSpec) -> Result<AggregateQuery, EngineError> {
    let predicates = parse_filters(table, filters)?;
    Ok(AggregateQuery {
        table,
        group_by: table.dimensions.iter().collect(),
        predicates,
    })
}

/// Like [`build`], but groups by the given subset of dimensions only.
pub fn build_grouped(
    table: &'static FactTable,
    filters: &FilterSpec,
    group_keys: &[&str],
) -> Result<AggregateQuery, EngineError> {
    let predicates = parse_filters(table, filters)?;

    let mut group_by = Vec::with_capacity(group_keys.len());
    for key in group_keys {
        let dimension = table.require_dimension(key)?;
        if !group_by.contains(&dimension) {
            group_by.push(dimension);
        }
    }
    group_by.sort_by_key(|d| {
        table
            .dimensions
            .iter()
            .position(|declared| declared.key == d.key)
    });

    Ok(AggregateQuery {
        table,
        group_by,
        predicates,
    })
}

pub fn distinct(table: &'static FactTable, dimension: &str) -> Result<DistinctQuery, EngineError> {
    Ok(DistinctQuery {
        table,
        dimension: table.require_dimension(dimension)?,
    })
}

fn parse_filters(
    table: &'static FactTable,
    filters: &FilterSpec,
) -> Result<Vec<Predicate>, EngineError> {
    let mut out = Vec::with_capacity(filters.len());

    for (key, raw_value) in filters {
        let Some(dimension) = table.dimension(key) else {
            return Err(EngineError::InvalidFilter {
                table: table.id,
                key: key.clone(),
                reason: "not a dimension of this table",
            });
        };

        let value = raw_value.trim();
        if value.is_empty() {
            continue;
        }

        let numeric = value.parse::<i64>().ok();
        let predicate = match (dimension.column_type, numeric, dimension.id_column) {
            (ColumnType::Integer, Some(n), _) => Predicate::Eq {
                column: dimension.column,
                value: Scalar::Int(n),
            },
            (ColumnType::Integer, None, _) => {
                return Err(EngineError::InvalidFilter {
                    table: table.id,
                    key: key.clone(),
                    reason: "expected an integer value",
                });
            }
            (ColumnType::Text, Some(n), Some(id_column)) => Predicate::IdOrLabel {
                id_column,
                id: n,
                column: dimension.column,
                label: value.to_string(),
            },
            (ColumnType::Text, _, _) => Predicate::Eq {
                column: dimension.column,
                value: Scalar::text(value),
            },
        };
        out.push(predicate);
    }

    Ok(out)
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_expr(dimension: &Dimension) -> String {
    let cast = match dimension.column_type {
        ColumnType::Text => "text",
        ColumnType::Integer => "bigint",
    };
    format!(
        "{}::{} AS {}",
        quote_ident(dimension.column),
        cast,
        quote_ident(dimension.key)
    )
}

impl AggregateQuery {
    /// Parameterized SQL plus its bind values, in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<Scalar>) {
        let mut select_parts = self
            .group_by
            .iter()
            .map(|d| select_expr(d))
            .collect::<Vec<_>>();
        select_parts.push(format!(
            "SUM({})::text AS {}",
            quote_ident(self.table.measure),
            quote_ident(TOTAL_ALIAS)
        ));

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_parts.join(", "),
            quote_ident(self.table.table)
        );

        let mut binds = Vec::new();
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            for (idx, predicate) in self.predicates.iter().enumerate() {
                if idx != 0 {
                    sql.push_str(" AND ");
                }
                match predicate {
                    Predicate::Eq { column, value } => {
                        binds.push(value.clone());
                        sql.push_str(&format!("{} = ${}", quote_ident(column), binds.len()));
                    }
                    Predicate::IdOrLabel {
                        id_column,
                        id,
                        column,
                        label,
                    } => {
                        binds.push(Scalar::Int(*id));
                        let id_placeholder = binds.len();
                        binds.push(Scalar::text(label.as_str()));
                        sql.push_str(&format!(
                            "({} = ${} OR {} = ${})",
                            quote_ident(id_column),
                            id_placeholder,
                            quote_ident(column),
                            binds.len()
                        ));
                    }
                }
            }
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(
                &self
                    .group_by
                    .iter()
                    .map(|d| quote_ident(d.column))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        (sql, binds)
    }
}

impl DistinctQuery {
    pub fn to_sql(&self) -> String {
        let column = quote_ident(self.dimension.column);
        format!(
            "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL",
            select_expr(self.dimension),
            quote_ident(self.table.table),
            column
        )
    }
}
