//! Sync endpoint routes.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_check, handle_pull, handle_push, PushResponse};
use crate::AppState;
use quadrant_engine::PushBatch;

/// Query parameters for GET /sync.
#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    /// `check=true` asks for the freshness scalar instead of the full
    /// live set.
    pub check: Option<bool>,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", get(pull_handler).post(push_handler))
}

/// POST /sync - apply an incremental push batch.
async fn push_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(batch): Json<PushBatch>,
) -> Result<Json<PushResponse>> {
    let response = handle_push(&state.pool, &auth.user_id, batch).await?;
    Ok(Json(response))
}

/// GET /sync - full live set; GET /sync?check=true - freshness scalar.
async fn pull_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SyncQuery>,
) -> Result<Response> {
    if query.check.unwrap_or(false) {
        let response = handle_check(&state.pool, &auth.user_id).await?;
        Ok(Json(response).into_response())
    } else {
        let response = handle_pull(&state.pool, &auth.user_id).await?;
        Ok(Json(response).into_response())
    }
}
