use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::auto_fact_tables::{commit, CommitFactTableRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCreateRequest {
    pub fact_tables: Vec<CommitFactTableRequest>,
}

/// POST /api/datasources/:id/fact-tables/auto-create - verify a candidate
/// batch against the live warehouse and enqueue background creation
pub async fn auto_create_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AutoCreateRequest>,
) -> Result<Json<Value>, ApiError> {
    commit(&state, &ctx, &id, req.fact_tables).await?;

    Ok(Json(json!({ "status": 200 })))
}
