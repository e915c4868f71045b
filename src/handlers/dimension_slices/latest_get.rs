use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/dimension-slices/datasource/:datasource_id/:query_id - most
/// recent analysis record for an exposure query, null when none has run
pub async fn latest_get(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path((datasource_id, query_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .slice_runner
        .latest(&ctx, &datasource_id, &query_id)
        .await?;

    Ok(Json(json!({
        "status": 200,
        "dimensionSlices": record,
    })))
}
