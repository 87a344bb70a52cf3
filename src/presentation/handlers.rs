// HTTP request handlers
use crate::application::ingestion_service::{IngestError, IngestReport};
use crate::application::telemetry_repository::RepositoryError;
use crate::domain::range::{Bound, RangeQuery, RangeScope};
use crate::domain::subsystem::Subsystem;
use crate::infrastructure::chunked_stream::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INSTANT_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"];

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Present when a batch was published but could not be persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            report: None,
        }),
    )
}

fn repository_error(err: RepositoryError) -> ApiError {
    tracing::error!("Repository request failed: {}", err);
    api_error(StatusCode::BAD_GATEWAY, err.to_string())
}

async fn respond<T: Serialize>(headers: &HeaderMap, data: &T) -> Result<Response, ApiError> {
    json_response(StatusCode::OK, data, accepts_brotli(headers))
        .await
        .map_err(|status| api_error(status, "failed to encode response"))
}

/// Window selection shared by the stats, series and interval endpoints.
/// `start`/`end` are sample indices, `from`/`to` are instants; an index wins over an instant.
#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
    pub scope: Option<RangeScope>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub factor: Option<usize>,
}

impl WindowParams {
    pub fn range_query(&self) -> Result<RangeQuery, String> {
        let first = bound(self.start, self.from.as_deref())?;
        let second = bound(self.end, self.to.as_deref())?;
        let scope = self.scope.unwrap_or(if first.is_some() || second.is_some() {
            RangeScope::Zoom
        } else {
            RangeScope::Full
        });

        match (scope, first, second) {
            (RangeScope::Full, _, _) => Ok(RangeQuery::Full),
            (RangeScope::Zoom, Some(start), Some(end)) => Ok(RangeQuery::Zoom { start, end }),
            (RangeScope::Marked, Some(first), Some(second)) => Ok(RangeQuery::Marked { first, second }),
            _ => Err("window needs both ends, as start/end indices or from/to instants".to_string()),
        }
    }
}

fn bound(index: Option<usize>, instant: Option<&str>) -> Result<Option<Bound>, String> {
    match (index, instant) {
        (Some(index), _) => Ok(Some(Bound::Index(index))),
        (None, Some(raw)) => parse_instant(raw)
            .map(|instant| Some(Bound::Instant(instant)))
            .ok_or_else(|| format!("invalid instant `{raw}`")),
        (None, None) => Ok(None),
    }
}

pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    INSTANT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[derive(Debug, Deserialize)]
pub struct DailyRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RecomputeParams {
    pub date: Option<NaiveDate>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Ingest a raw telemetry export
pub async fn ingest(State(state): State<Arc<AppState>>, body: String) -> Result<Json<IngestReport>, ApiError> {
    match state.ingestion_service.ingest(&body).await {
        Ok(report) => Ok(Json(report)),
        Err(err) => {
            let message = err.to_string();
            match err {
                IngestError::Parse(_) => Err(api_error(StatusCode::BAD_REQUEST, message)),
                IngestError::Persistence { report, .. } => {
                    tracing::error!("{}", message);
                    Err((
                        StatusCode::BAD_GATEWAY,
                        Json(ErrorResponse {
                            error: message,
                            report: Some(*report),
                        }),
                    ))
                }
            }
        }
    }
}

/// Per-subsystem energy and activity over a window
pub async fn range_stats(
    Query(params): Query<WindowParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let query = params
        .range_query()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    respond(&headers, &state.analysis_service.range_summary(&query)).await
}

/// Decimated chart series with a full-resolution legend
pub async fn chart_series(
    Query(params): Query<WindowParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let query = params
        .range_query()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    respond(&headers, &state.analysis_service.chart_series(&query, params.factor)).await
}

/// Stream a chart series (legend, point chunks, completion)
pub async fn stream_chart_series(
    Query(params): Query<WindowParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params
        .range_query()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let rx = state.analysis_service.stream_chart_series(query, params.factor);
    Ok(stream_from_receiver(rx, accepts_brotli(&headers)))
}

/// Maximal activity runs of one subsystem within a window
pub async fn activity_intervals(
    Path(subsystem): Path<String>,
    Query(params): Query<WindowParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let subsystem = subsystem
        .parse::<Subsystem>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    let query = params
        .range_query()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    respond(&headers, &state.analysis_service.activity_report(subsystem, &query)).await
}

/// Stored daily aggregates
pub async fn list_daily(
    Query(range): Query<DailyRange>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let records = state
        .daily_service
        .list(range.from, range.to)
        .await
        .map_err(repository_error)?;
    respond(&headers, &records).await
}

/// Recompute and store daily aggregates for one date or every date
pub async fn recompute_daily(
    Query(params): Query<RecomputeParams>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .daily_service
        .recompute(params.date)
        .await
        .map_err(repository_error)?;
    Ok(Json(records))
}
