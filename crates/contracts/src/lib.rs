use std::cmp::Ordering;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownTable,
    UnknownDimension,
    InvalidFilter,
    MeasureOverflow,
    StoreFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownTable => "UnknownTable",
            ErrorKind::UnknownDimension => "UnknownDimension",
            ErrorKind::InvalidFilter => "InvalidFilter",
            ErrorKind::MeasureOverflow => "MeasureOverflow",
            ErrorKind::StoreFailure => "StoreFailure",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UnknownTable => "ERR_UNKNOWN_TABLE",
            ErrorKind::UnknownDimension => "ERR_UNKNOWN_DIMENSION",
            ErrorKind::InvalidFilter => "ERR_INVALID_FILTER",
            ErrorKind::MeasureOverflow => "ERR_MEASURE_OVERFLOW",
            ErrorKind::StoreFailure => "ERR_STORE_FAILURE",
        }
    }

    /// Caller mistakes, as opposed to failures on the serving side.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownTable | ErrorKind::UnknownDimension | ErrorKind::InvalidFilter
        )
    }
}

/// A single dimension value as it appears on the wire.
///
/// Ordering is numeric-aware: values that parse as integers sort numerically
/// and before everything else, the rest sort lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Int(_) => None,
            Scalar::Text(s) => Some(s.as_str()),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Scalar::Int(_) => 0,
            Scalar::Text(_) => 1,
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => a
                .cmp(&b)
                .then_with(|| self.variant_rank().cmp(&other.variant_rank()))
                .then_with(|| self.as_str().cmp(&other.as_str())),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.as_str().cmp(&other.as_str()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub key: String,
    pub display_name: String,
}

/// One group of an aggregate query: the group's dimension values in declared
/// order followed by the summed measure, serialized as a flat JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedRow {
    pub dimensions: Vec<(String, Option<Scalar>)>,
    pub measure: String,
    pub value: i64,
}

impl AggregatedRow {
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.dimensions
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn group_key(&self) -> Vec<Option<Scalar>> {
        self.dimensions.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl Serialize for AggregatedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dimensions.len() + 1))?;
        for (key, value) in &self.dimensions {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(&self.measure, &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<AggregatedRow>,
    pub total: usize,
}

impl QueryResult {
    pub fn new(rows: Vec<AggregatedRow>) -> Self {
        let total = rows.len();
        Self { rows, total }
    }

    pub fn measure_sum(&self) -> i128 {
        self.rows.iter().map(|row| i128::from(row.value)).sum()
    }
}

/// Measure totals for a single dimension, shaped for charting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub labels: Vec<Option<Scalar>>,
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_people: i64,
    pub total_cities: usize,
    pub min_year: Option<i64>,
    pub max_year: Option<i64>,
    pub total_categories: usize,
}
