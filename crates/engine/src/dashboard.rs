//! Fixed overview figures for the landing dashboard.

use crimestat_contracts::{DashboardSummary, Distribution, Scalar};

use crate::error::EngineError;
use crate::query::FilterSpec;
use crate::store::FactStore;

const SUMMARY_TABLE: &str = "suc_turu_genel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chart {
    Yearly,
    Cities,
    Gender,
    Education,
}

impl Chart {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "yearly-distribution" => Some(Chart::Yearly),
            "cities-distribution" => Some(Chart::Cities),
            "gender-distribution" => Some(Chart::Gender),
            "education-distribution" => Some(Chart::Education),
            _ => None,
        }
    }

    /// Table and dimension the chart sums the measure over.
    pub fn source(self) -> (&'static str, &'static str) {
        match self {
            Chart::Yearly => (SUMMARY_TABLE, "yil"),
            Chart::Cities => (SUMMARY_TABLE, "il"),
            Chart::Gender => ("ceza_turu", "cinsiyet"),
            Chart::Education => ("egitim_durumu", "egitim_durumu"),
        }
    }
}

pub async fn chart<S: FactStore>(store: &S, chart: Chart) -> Result<Distribution, EngineError> {
    let (table, dimension) = chart.source();
    crate::distribution(store, table, dimension, &FilterSpec::new()).await
}

pub async fn summary<S: FactStore>(store: &S) -> Result<DashboardSummary, EngineError> {
    let table = crate::registry::resolve(SUMMARY_TABLE)?;

    let totals = crate::execute(
        store,
        &crate::query::build_grouped(table, &FilterSpec::new(), &[])?,
    )
    .await?;
    let total_people = totals.rows.first().map(|row| row.value).unwrap_or(0);

    let cities = crate::distinct_values(store, SUMMARY_TABLE, "il").await?;
    let categories = crate::distinct_values(store, SUMMARY_TABLE, "suc_turu").await?;
    let years = crate::distinct_values(store, SUMMARY_TABLE, "yil").await?;

    Ok(DashboardSummary {
        total_people,
        total_cities: cities.len(),
        min_year: years.first().and_then(Scalar::as_i64),
        max_year: years.last().and_then(Scalar::as_i64),
        total_categories: categories.len(),
    })
}
