use std::cmp::Ordering;

use crimestat_contracts::{AggregatedRow, QueryResult, Scalar};

use crate::error::{EngineError, StoreError};
use crate::query::AggregateQuery;
use crate::registry::FactTable;

/// One grouped row as returned by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    /// Aligned with `AggregateQuery::group_by`.
    pub values: Vec<Option<Scalar>>,
    /// `SUM(measure)` rendered as decimal text; `None` when the sum is NULL.
    pub total: Option<String>,
}

/// Narrows a decimal sum to `i64`.
///
/// Accepts an optional sign and an all-zero fractional part. Anything that
/// does not fit is `MeasureOverflow`; anything that is not a number at all is
/// a store schema error.
pub fn narrow_measure(table: &'static FactTable, raw: Option<&str>) -> Result<i64, EngineError> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(0);
    };

    let (integral, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    let digits = integral.strip_prefix(['-', '+']).unwrap_or(integral);
    let well_formed = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(StoreError::Schema(format!("measure sum `{}` is not numeric", raw)).into());
    }

    let overflow = || EngineError::MeasureOverflow {
        table: table.id,
        raw: raw.to_string(),
    };

    if fraction.bytes().any(|b| b != b'0') {
        return Err(overflow());
    }

    let wide = integral.parse::<i128>().map_err(|_| overflow())?;
    i64::try_from(wide).map_err(|_| overflow())
}

fn compare_values(a: &Option<Scalar>, b: &Option<Scalar>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Column positions to sort by: the table's ordering dimension first (when
/// grouped on), then every other group column in declared order.
fn sort_positions(query: &AggregateQuery) -> Vec<usize> {
    let ordering = query
        .table
        .ordering
        .and_then(|key| query.group_by.iter().position(|d| d.key == key));

    let mut positions = Vec::with_capacity(query.group_by.len());
    positions.extend(ordering);
    positions.extend((0..query.group_by.len()).filter(|idx| Some(*idx) != ordering));
    positions
}

pub fn project(query: &AggregateQuery, groups: Vec<GroupRow>) -> Result<QueryResult, EngineError> {
    let width = query.group_by.len();
    let mut keyed = Vec::with_capacity(groups.len());

    for group in groups {
        if group.values.len() != width {
            return Err(StoreError::Schema(format!(
                "expected {} group columns, store returned {}",
                width,
                group.values.len()
            ))
            .into());
        }
        let value = narrow_measure(query.table, group.total.as_deref())?;
        keyed.push((group.values, value));
    }

    let positions = sort_positions(query);
    keyed.sort_by(|(a, _), (b, _)| {
        positions
            .iter()
            .map(|&idx| compare_values(&a[idx], &b[idx]))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    let rows = keyed
        .into_iter()
        .map(|(values, value)| AggregatedRow {
            dimensions: query
                .group_by
                .iter()
                .map(|d| d.key.to_string())
                .zip(values)
                .collect(),
            measure: query.table.measure.to_string(),
            value,
        })
        .collect();

    Ok(QueryResult::new(rows))
}

/// Ascending, duplicate-free and null-free.
pub fn sort_distinct(values: Vec<Option<Scalar>>) -> Vec<Scalar> {
    let mut out = values.into_iter().flatten().collect::<Vec<_>>();
    out.sort();
    out.dedup();
    out
}
