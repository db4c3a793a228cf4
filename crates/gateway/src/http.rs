use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use crimestat_contracts::{
    AggregatedRow, DashboardSummary, DimensionSummary, Distribution, ErrorKind, Scalar,
    TableSummary,
};
use crimestat_engine::dashboard::{self, Chart};
use crimestat_engine::{EngineError, FactStore, FilterSpec, PgFactStore, StoreError, registry};
use serde::Serialize;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{GatewayConfig, StartupError};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState<S> {
    pub config: GatewayConfig,
    store: S,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Connects the PostgreSQL store, optionally validates the registered tables
/// against the live schema, and builds the router over it.
pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let store = PgFactStore::connect(&config.store_config())
        .await
        .map_err(|err| StartupError {
            code: "ERR_DB_UNAVAILABLE",
            message: format!("failed to initialize statistics database pool: {}", err),
        })?;

    if config.validate_schema {
        store
            .validate_schema(registry::tables())
            .await
            .map_err(|err| match err {
                StoreError::Schema(detail) => StartupError {
                    code: "ERR_INVALID_CONFIG",
                    message: detail,
                },
                other => StartupError {
                    code: "ERR_DB_UNAVAILABLE",
                    message: format!("failed to validate statistics schema: {}", other),
                },
            })?;
    }

    Ok(router_with_store(config, store))
}

pub fn router_with_store<S>(config: GatewayConfig, store: S) -> Router
where
    S: FactStore + Clone + 'static,
{
    let state = AppState { config, store };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<S>))
        .route("/metrics", get(metrics::<S>))
        .route("/api/tablolar", get(list_tables))
        .route("/api/dashboard/summary", get(dashboard_summary::<S>))
        .route("/api/dashboard/{chart}", get(dashboard_chart::<S>))
        .route("/api/{table}/kolonlar", get(list_dimensions))
        .route(
            "/api/{table}/unique-values/{dimension}",
            get(list_distinct_values::<S>),
        )
        .route("/api/{table}/veriler", get(query_rows::<S>))
        .route("/api/{table}/grafik-veriler", get(query_chart_rows::<S>))
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz<S: FactStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let store_ready = tokio::time::timeout(
        Duration::from_millis(state.config.query_timeout_ms.max(50)),
        state.store.ping(),
    )
    .await
    .is_ok_and(|res| res.is_ok());
    checks.insert("store", store_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics<S>(State(state): State<AppState<S>>) -> Response {
    if !state.config.metrics_enabled {
        return not_found().await.into_response();
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    success: bool,
    data: Vec<T>,
    total: usize,
}

impl<T> ListResponse<T> {
    fn new(data: Vec<T>) -> Self {
        Self {
            success: true,
            total: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct RowsResponse {
    success: bool,
    rows: Vec<AggregatedRow>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    success: bool,
    #[serde(flatten)]
    summary: DashboardSummary,
}

#[derive(Debug, Serialize)]
struct DistributionResponse {
    success: bool,
    #[serde(flatten)]
    distribution: Distribution,
}

async fn list_tables(headers: HeaderMap) -> Response {
    observe("/api/tablolar", &headers, "-", async {
        Ok(ListResponse::<TableSummary>::new(crimestat_engine::list_tables()))
    })
    .await
}

async fn list_dimensions(Path(table): Path<String>, headers: HeaderMap) -> Response {
    observe("/api/{table}/kolonlar", &headers, &table, async {
        crimestat_engine::list_dimensions(&table)
            .map(ListResponse::<DimensionSummary>::new)
            .map_err(|err| engine_error_response(&err))
    })
    .await
}

async fn list_distinct_values<S: FactStore>(
    State(state): State<AppState<S>>,
    Path((table, dimension)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    observe(
        "/api/{table}/unique-values/{dimension}",
        &headers,
        &table,
        async {
            let result = crimestat_engine::distinct_values(&state.store, &table, &dimension).await;
            record_store_query(table_label(&table), "distinct", &result);
            result
                .map(ListResponse::<Scalar>::new)
                .map_err(|err| engine_error_response(&err))
        },
    )
    .await
}

async fn query_rows<S: FactStore>(
    State(state): State<AppState<S>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    filters: Result<Query<FilterSpec>, QueryRejection>,
) -> Response {
    observe(
        "/api/{table}/veriler",
        &headers,
        &table,
        run_query(&state.store, &table, filters),
    )
    .await
}

async fn query_chart_rows<S: FactStore>(
    State(state): State<AppState<S>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    filters: Result<Query<FilterSpec>, QueryRejection>,
) -> Response {
    observe(
        "/api/{table}/grafik-veriler",
        &headers,
        &table,
        run_query(&state.store, &table, filters),
    )
    .await
}

async fn run_query<S: FactStore>(
    store: &S,
    table: &str,
    filters: Result<Query<FilterSpec>, QueryRejection>,
) -> Result<RowsResponse, ApiError> {
    let Query(filters) = filters.map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            Some(ErrorKind::InvalidFilter),
            ErrorKind::InvalidFilter.code(),
            "query string must be a flat list of key=value filters".to_string(),
            false,
        )
    })?;

    let result = crimestat_engine::query_aggregates(store, table, &filters).await;
    record_store_query(table_label(table), "aggregate", &result);
    let result = result.map_err(|err| engine_error_response(&err))?;

    Ok(RowsResponse {
        success: true,
        total: result.total,
        rows: result.rows,
    })
}

async fn dashboard_summary<S: FactStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> Response {
    observe("/api/dashboard/summary", &headers, "-", async {
        let result = dashboard::summary(&state.store).await;
        record_store_query("dashboard", "summary", &result);
        result
            .map(|summary| SummaryResponse {
                success: true,
                summary,
            })
            .map_err(|err| engine_error_response(&err))
    })
    .await
}

async fn dashboard_chart<S: FactStore>(
    State(state): State<AppState<S>>,
    Path(chart): Path<String>,
    headers: HeaderMap,
) -> Response {
    observe("/api/dashboard/{chart}", &headers, "-", async {
        let Some(chart) = Chart::from_slug(&chart) else {
            return Err(not_found_error());
        };

        let (table, _) = chart.source();
        let result = dashboard::chart(&state.store, chart).await;
        record_store_query(table, "distribution", &result);
        result
            .map(|distribution| DistributionResponse {
                success: true,
                distribution,
            })
            .map_err(|err| engine_error_response(&err))
    })
    .await
}

async fn not_found() -> ApiError {
    not_found_error()
}

fn not_found_error() -> ApiError {
    json_error(
        StatusCode::NOT_FOUND,
        None,
        "ERR_NOT_FOUND",
        "no such route".to_string(),
        false,
    )
}

/// Runs a handler body inside a request span and records its HTTP metrics.
/// The response always carries the request id.
async fn observe<T, F>(route: &'static str, headers: &HeaderMap, table: &str, handler: F) -> Response
where
    T: Serialize,
    F: Future<Output = Result<T, ApiError>>,
{
    let request_id = extract_request_id(headers);
    let span = tracing::info_span!(
        "http.request",
        route = route,
        request_id = %request_id,
        table = %table,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let result = async move {
        let result = handler.await;

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency_ms", latency_ms);
        match &result {
            Ok(_) => tracing::Span::current().record("outcome", "ok"),
            Err((_, Json(body))) => tracing::Span::current().record("outcome", body.code.as_str()),
        };
        tracing::debug!("http.request.completed");

        result
    }
    .instrument(span)
    .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(route, "GET", status.as_u16(), started.elapsed());

    let mut response = match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Metric label for a caller-supplied table id. Anything outside the
/// registry collapses into a single series.
fn table_label(table: &str) -> &'static str {
    registry::resolve(table).map_or("unknown", |t| t.id)
}

fn record_store_query<T>(table: &str, kind: &str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind().as_str(),
    };
    crate::metrics::observe_store_query(table, kind, outcome);
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    code: String,
    message: String,
    retryable: bool,
}

fn json_error(
    status: StatusCode,
    kind: Option<ErrorKind>,
    code: impl Into<String>,
    message: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            kind,
            code: code.into(),
            message: message.into(),
            retryable,
        }),
    )
}

/// Client mistakes are echoed back; serving-side failures are logged in full
/// and reported with a generic message.
fn engine_error_response(err: &EngineError) -> ApiError {
    let kind = err.kind();

    if kind.is_client_error() {
        return json_error(
            StatusCode::BAD_REQUEST,
            Some(kind),
            kind.code(),
            err.to_string(),
            false,
        );
    }

    tracing::error!(error = %err, kind = kind.as_str(), "engine.request_failed");

    match err {
        EngineError::Store(StoreError::Timeout) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(kind),
            kind.code(),
            "statistics store timed out".to_string(),
            true,
        ),
        EngineError::Store(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(kind),
            kind.code(),
            "statistics store unavailable".to_string(),
            true,
        ),
        _ => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(kind),
            kind.code(),
            "aggregated total is out of range".to_string(),
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_sanitized_and_bounded() {
        assert_eq!(
            sanitize_request_id("abc-123_x.y"),
            Some("abc-123_x.y".to_string())
        );
        assert_eq!(
            sanitize_request_id("a b<script>c"),
            Some("abscriptc".to_string())
        );
        assert_eq!(sanitize_request_id("<>"), None);
        assert_eq!(
            sanitize_request_id(&"z".repeat(100)).map(|s| s.len()),
            Some(64)
        );
    }

    #[test]
    fn missing_request_id_gets_a_fresh_ulid() {
        let id = extract_request_id(&HeaderMap::new());
        assert!(id.parse::<Ulid>().is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-7"));
        assert_eq!(extract_request_id(&headers), "req-7");
    }

    #[test]
    fn client_errors_map_to_bad_request() {
        let (status, Json(body)) =
            engine_error_response(&EngineError::UnknownTable("nope".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.kind, Some(ErrorKind::UnknownTable));
        assert_eq!(body.code, "ERR_UNKNOWN_TABLE");
        assert!(body.message.contains("nope"));
        assert!(!body.retryable);

        let (status, Json(body)) = engine_error_response(&EngineError::InvalidFilter {
            table: "ceza_turu",
            key: "il".to_string(),
            reason: "not a dimension of this table",
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "ERR_INVALID_FILTER");
    }

    #[test]
    fn serving_failures_map_to_internal_error_without_details() {
        let (status, Json(body)) = engine_error_response(&EngineError::Store(StoreError::Schema(
            "relation `secret_table` does not exist".to_string(),
        )));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.kind, Some(ErrorKind::StoreFailure));
        assert!(!body.message.contains("secret_table"));
        assert!(body.retryable);

        let (status, Json(body)) = engine_error_response(&EngineError::MeasureOverflow {
            table: "yas",
            raw: "1e40".to_string(),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "ERR_MEASURE_OVERFLOW");
        assert!(!body.retryable);
    }

    #[test]
    fn error_bodies_have_no_rows_field() {
        let (_, Json(body)) = engine_error_response(&EngineError::UnknownTable("x".to_string()));
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["success"], serde_json::json!(false));
        assert_eq!(value["kind"], serde_json::json!("UnknownTable"));
        assert!(value.get("rows").is_none());
    }
}
