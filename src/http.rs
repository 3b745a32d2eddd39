//! HTTP surface for records and their current values.
//!
//! - `GET  /recs?tag=`           records from the directory
//! - `GET  /recs/{id}`           one record
//! - `GET  /recs/{id}/current`   last observed `{ts, value}`, nulls if never set
//! - `POST /recs/{id}/current`   manual write of `{value}` at server time

use crate::cache::CurrentValueCache;
use crate::directory::RecordDirectory;
use crate::types::{CurrentInput, CurrentValue, Record, RecordId, Timestamp};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<CurrentValueCache>,
    pub directory: Arc<dyn RecordDirectory>,
}

impl ApiState {
    pub fn new(cache: Arc<CurrentValueCache>, directory: Arc<dyn RecordDirectory>) -> Self {
        Self { cache, directory }
    }
}

/// Handler error, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub tag: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/recs", get(list_records))
        .route("/recs/{id}", get(get_record))
        .route("/recs/{id}/current", get(get_current).post(post_current))
        .with_state(state)
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse().map_err(|_| {
        debug!(id = raw, "invalid record id");
        ApiError::NotFound(format!("invalid record id: {raw}"))
    })
}

async fn list_records(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let records = state.directory.read_records(&query.tag).map_err(|err| {
        warn!(error = %err, "cannot list records");
        ApiError::Internal(err.to_string())
    })?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<ApiState>,
    Path(raw): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let id = parse_id(&raw)?;
    match state.directory.read_record(&id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::NotFound(format!("record not found: {id}"))),
        Err(err) => {
            warn!(error = %err, "cannot read record");
            Err(ApiError::Internal(err.to_string()))
        }
    }
}

async fn get_current(
    State(state): State<ApiState>,
    Path(raw): Path<String>,
) -> Result<Json<CurrentValue>, ApiError> {
    let id = parse_id(&raw)?;
    Ok(Json(state.cache.get(&id)))
}

async fn post_current(
    State(state): State<ApiState>,
    Path(raw): Path<String>,
    body: Result<Json<CurrentInput>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw)?;
    let Json(input) = body.map_err(|rejection| {
        debug!(error = %rejection, "cannot decode current body");
        ApiError::BadRequest(rejection.body_text())
    })?;

    state.cache.set(id, input.value, Timestamp::now());
    Ok(StatusCode::OK)
}
