use std::collections::BTreeSet;

use crimestat_contracts::{ErrorKind, Scalar};
use crimestat_engine::registry::{self, ColumnType, Dimension, FactTable};
use crimestat_engine::{EngineError, FactStore, FilterSpec, MemoryFactStore};

fn filters(pairs: &[(&str, &str)]) -> FilterSpec {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn int(v: i64) -> Option<Scalar> {
    Some(Scalar::Int(v))
}

fn text(v: &str) -> Option<Scalar> {
    Some(Scalar::text(v))
}

fn ceza_turu_store() -> MemoryFactStore {
    MemoryFactStore::new().with_table(
        "ceza_turu",
        &["id", "ceza_turu", "ceza_turu_id", "cinsiyet", "yil", "kisi_sayisi"],
        vec![
            vec![int(1), text("Hapis"), int(1), text("Erkek"), int(2020), int(5)],
            vec![int(2), text("Hapis"), int(1), text("Erkek"), int(2020), int(3)],
            vec![int(3), text("Hapis"), int(1), text("Kadın"), int(2020), int(2)],
        ],
    )
}

fn suc_turu_genel_store() -> MemoryFactStore {
    MemoryFactStore::new().with_table(
        "suc_turu_genel",
        &["id", "suc_turu", "suc_turu_id", "il", "il_id", "yil", "kisi_sayisi"],
        vec![
            vec![int(1), text("Hırsızlık"), int(1), text("İstanbul"), int(34), int(2021), int(40)],
            vec![int(2), text("Hırsızlık"), int(1), text("İstanbul"), int(34), int(2020), int(25)],
            vec![int(3), text("Yağma"), int(2), text("İstanbul"), int(34), int(2020), int(7)],
            vec![int(4), text("Yağma"), int(2), text("Ankara"), int(6), int(2020), int(11)],
            vec![int(5), text("Hırsızlık"), int(1), text("Ankara"), int(6), int(2021), None],
            vec![int(6), None, None, text("Ankara"), int(6), int(2022), int(2)],
        ],
    )
}

/// Synthetic rows for every registered table: a handful of repeating labels,
/// a NULL in every dimension column and a spread of years.
fn full_store() -> MemoryFactStore {
    let mut store = MemoryFactStore::new();

    for table in registry::tables() {
        let mut columns = vec!["id"];
        columns.extend(table.required_columns());

        let mut rows = Vec::new();
        for i in 0..8_i64 {
            let mut row = vec![int(i + 1)];
            for dimension in table.dimensions {
                let value = if i == 7 {
                    None
                } else {
                    match (dimension.column_type, dimension.key) {
                        (ColumnType::Integer, "yil") => int(2022 - i % 3),
                        (ColumnType::Integer, _) => int(18 + (i % 4) * 9),
                        (ColumnType::Text, key) => text(&format!("{}-{}", key, i % 3)),
                    }
                };
                row.push(value);
                if dimension.id_column.is_some() {
                    row.push(if i == 7 { None } else { int(i % 3 + 1) });
                }
            }
            row.push(int(i * 10 + 1));
            rows.push(row);
        }

        store = store.with_table(table.table, &columns, rows);
    }

    store
}

#[tokio::test]
async fn ceza_turu_filter_collapses_matching_rows() {
    let store = ceza_turu_store();
    let result = crimestat_engine::query_aggregates(&store, "ceza_turu", &filters(&[("cinsiyet", "Erkek")]))
        .await
        .expect("query should succeed");

    assert_eq!(result.total, 1);
    assert_eq!(
        serde_json::to_value(&result.rows).expect("rows serialize"),
        serde_json::json!([
            {"ceza_turu": "Hapis", "cinsiyet": "Erkek", "yil": 2020, "kisi_sayisi": 8}
        ])
    );
}

#[tokio::test]
async fn rows_are_unique_and_satisfy_every_filter() {
    let store = full_store();

    for table in registry::tables() {
        let result = crimestat_engine::query_aggregates(&store, table.id, &FilterSpec::new())
            .await
            .expect("unfiltered query should succeed");
        assert_eq!(result.total, result.rows.len());

        let keys = result.rows.iter().map(|row| row.group_key()).collect::<BTreeSet<_>>();
        assert_eq!(keys.len(), result.rows.len(), "{}", table.id);

        let Some(dimension) = table.dimensions.first() else {
            continue;
        };
        let value = match dimension.column_type {
            ColumnType::Text => format!("{}-1", dimension.key),
            ColumnType::Integer if dimension.key == "yil" => "2021".to_string(),
            ColumnType::Integer => "27".to_string(),
        };
        let filtered = crimestat_engine::query_aggregates(
            &store,
            table.id,
            &filters(&[(dimension.key, value.as_str())]),
        )
        .await
        .expect("filtered query should succeed");

        assert!(filtered.total > 0, "{}", table.id);
        for row in &filtered.rows {
            let got = row.get(dimension.key).expect("filtered dimension is set");
            assert_eq!(got.to_string(), value, "{}", table.id);
        }
    }
}

#[tokio::test]
async fn measure_sums_are_preserved() {
    let store = full_store();

    for table in registry::tables() {
        let result = crimestat_engine::query_aggregates(&store, table.id, &FilterSpec::new())
            .await
            .expect("query should succeed");

        // 1 + 11 + ... + 71
        assert_eq!(result.measure_sum(), 288, "{}", table.id);
    }
}

#[tokio::test]
async fn null_measures_are_skipped_and_rows_sorted_by_year() {
    let store = suc_turu_genel_store();
    let result = crimestat_engine::query_aggregates(&store, "suc_turu_genel", &FilterSpec::new())
        .await
        .expect("query should succeed");

    let rows = result
        .rows
        .iter()
        .map(|row| {
            (
                row.get("yil").and_then(Scalar::as_i64),
                row.get("suc_turu").map(|v| v.to_string()),
                row.get("il").map(|v| v.to_string()),
                row.value,
            )
        })
        .collect::<Vec<_>>();

    let s = |v: &str| Some(v.to_string());
    assert_eq!(
        rows,
        vec![
            (Some(2020), s("Hırsızlık"), s("İstanbul"), 25),
            (Some(2020), s("Yağma"), s("Ankara"), 11),
            (Some(2020), s("Yağma"), s("İstanbul"), 7),
            (Some(2021), s("Hırsızlık"), s("Ankara"), 0),
            (Some(2021), s("Hırsızlık"), s("İstanbul"), 40),
            (Some(2022), None, s("Ankara"), 2),
        ]
    );
}

#[tokio::test]
async fn repeated_queries_are_identical() {
    let store = suc_turu_genel_store();
    let spec = filters(&[("yil", "2020")]);

    let first = crimestat_engine::query_aggregates(&store, "suc_turu_genel", &spec)
        .await
        .expect("query should succeed");
    let second = crimestat_engine::query_aggregates(&store, "suc_turu_genel", &spec)
        .await
        .expect("query should succeed");

    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[tokio::test]
async fn province_id_and_label_filters_agree() {
    let store = suc_turu_genel_store();

    let by_id = crimestat_engine::query_aggregates(&store, "suc_turu_genel", &filters(&[("il", "34")]))
        .await
        .expect("query should succeed");
    let by_label =
        crimestat_engine::query_aggregates(&store, "suc_turu_genel", &filters(&[("il", "İstanbul")]))
            .await
            .expect("query should succeed");

    assert_eq!(by_id.total, 3);
    assert_eq!(by_id, by_label);
}

#[tokio::test]
async fn distinct_values_are_sorted_and_null_free_for_every_dimension() {
    let store = full_store();

    for table in registry::tables() {
        for dimension in table.dimensions {
            let values = crimestat_engine::distinct_values(&store, table.id, dimension.key)
                .await
                .expect("distinct should succeed");

            assert!(!values.is_empty(), "{}.{}", table.id, dimension.key);
            assert!(
                values.windows(2).all(|pair| pair[0] < pair[1]),
                "{}.{} not strictly ascending: {:?}",
                table.id,
                dimension.key,
                values
            );
        }
    }

    let years = crimestat_engine::distinct_values(&store, "ceza_turu", "yil")
        .await
        .expect("distinct should succeed");
    assert_eq!(years, vec![Scalar::Int(2020), Scalar::Int(2021), Scalar::Int(2022)]);
}

#[tokio::test]
async fn unknown_table_is_reported_from_every_entry_point() {
    let store = full_store();

    let err = crimestat_engine::list_dimensions("unknown_table").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTable);

    let err = crimestat_engine::distinct_values(&store, "unknown_table", "yil")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTable);

    let err = crimestat_engine::query_aggregates(&store, "unknown_table", &FilterSpec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTable);

    let err = crimestat_engine::distribution(&store, "unknown_table", "yil", &FilterSpec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTable);
}

#[tokio::test]
async fn invalid_filters_and_dimensions_are_rejected() {
    let store = ceza_turu_store();

    let err = crimestat_engine::query_aggregates(&store, "ceza_turu", &filters(&[("il", "Ankara")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFilter);

    let err = crimestat_engine::distinct_values(&store, "ceza_turu", "kisi_sayisi")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownDimension);
}

#[tokio::test]
async fn sums_beyond_i64_are_measure_overflow() {
    let store = MemoryFactStore::new().with_table(
        "ceza_turu",
        &["ceza_turu", "ceza_turu_id", "cinsiyet", "yil", "kisi_sayisi"],
        vec![
            vec![text("Hapis"), int(1), text("Erkek"), int(2020), int(i64::MAX)],
            vec![text("Hapis"), int(1), text("Erkek"), int(2020), int(1)],
        ],
    );

    let err = crimestat_engine::query_aggregates(&store, "ceza_turu", &FilterSpec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MeasureOverflow { table: "ceza_turu", .. }));
    assert_eq!(err.kind(), ErrorKind::MeasureOverflow);
}

#[tokio::test]
async fn missing_relation_is_a_store_failure() {
    let store = MemoryFactStore::new();
    let err = crimestat_engine::query_aggregates(&store, "yas", &FilterSpec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
}

#[tokio::test]
async fn ungrouped_query_over_empty_table_yields_zero_total() {
    static TOTAL_ONLY: FactTable = FactTable {
        id: "toplam",
        table: "toplam",
        display_name: "Toplam",
        dimensions: &[],
        measure: registry::MEASURE,
        ordering: None,
    };

    let store = MemoryFactStore::new().with_table("toplam", &["kisi_sayisi"], Vec::new());
    let query = crimestat_engine::query::build(&TOTAL_ONLY, &FilterSpec::new()).expect("valid");
    let result = crimestat_engine::execute(&store, &query)
        .await
        .expect("query should succeed");

    assert_eq!(result.total, 1);
    assert_eq!(
        serde_json::to_value(&result.rows).expect("serialize"),
        serde_json::json!([{"kisi_sayisi": 0}])
    );
}

#[tokio::test]
async fn distribution_sums_per_dimension_value() {
    let store = suc_turu_genel_store();
    let yearly = crimestat_engine::distribution(&store, "suc_turu_genel", "yil", &FilterSpec::new())
        .await
        .expect("distribution should succeed");

    assert_eq!(yearly.labels, vec![int(2020), int(2021), int(2022)]);
    assert_eq!(yearly.values, vec![43, 40, 2]);
}

#[tokio::test]
async fn dashboard_summary_counts_provinces_categories_and_years() {
    let store = suc_turu_genel_store();
    let summary = crimestat_engine::dashboard::summary(&store)
        .await
        .expect("summary should succeed");

    assert_eq!(summary.total_people, 85);
    assert_eq!(summary.total_cities, 2);
    assert_eq!(summary.total_categories, 2);
    assert_eq!(summary.min_year, Some(2020));
    assert_eq!(summary.max_year, Some(2022));
}

#[tokio::test]
async fn aliased_year_column_round_trips_under_its_public_key() {
    static YEARLY: FactTable = FactTable {
        id: "suc_yillik",
        table: "suc_yillik",
        display_name: "Suç Yıllık",
        dimensions: &[
            Dimension::text("suc_turu"),
            Dimension::integer("yil").stored_as("yıl"),
        ],
        measure: registry::MEASURE,
        ordering: Some("yil"),
    };

    let store = MemoryFactStore::new().with_table(
        "suc_yillik",
        &["suc_turu", "yıl", "kisi_sayisi"],
        vec![
            vec![text("Yağma"), int(2021), int(4)],
            vec![text("Hırsızlık"), int(2020), int(9)],
            vec![text("Hırsızlık"), int(2020), int(1)],
            vec![text("Yağma"), int(2020), int(3)],
        ],
    );

    let query = crimestat_engine::query::build(&YEARLY, &filters(&[("yil", "2020")])).expect("valid");
    let result = crimestat_engine::execute(&store, &query)
        .await
        .expect("query should succeed");
    assert_eq!(
        serde_json::to_value(&result.rows).expect("serialize"),
        serde_json::json!([
            {"suc_turu": "Hırsızlık", "yil": 2020, "kisi_sayisi": 10},
            {"suc_turu": "Yağma", "yil": 2020, "kisi_sayisi": 3}
        ])
    );

    let distinct = crimestat_engine::query::distinct(&YEARLY, "yil").expect("known dimension");
    let years = crimestat_engine::project::sort_distinct(
        store.distinct(&distinct).await.expect("distinct should succeed"),
    );
    assert_eq!(years, vec![Scalar::Int(2020), Scalar::Int(2021)]);
}

#[tokio::test]
async fn short_rows_are_a_schema_failure() {
    let store = MemoryFactStore::new().with_table(
        "ceza_turu",
        &["ceza_turu", "ceza_turu_id", "cinsiyet", "yil", "kisi_sayisi"],
        vec![
            vec![text("Hapis"), int(1), text("Erkek"), int(2020), int(5)],
            vec![text("Hapis"), int(1)],
        ],
    );

    let err = crimestat_engine::query_aggregates(&store, "ceza_turu", &filters(&[("cinsiyet", "Erkek")]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(crimestat_engine::StoreError::Schema(_))));

    let err = crimestat_engine::distinct_values(&store, "ceza_turu", "yil")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreFailure);
}
