use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/dimension-slices/:id - fetch one analysis record
pub async fn single_get(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .slice_runner
        .get(&ctx, &id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Dimension slices {} not found", id)))?;

    Ok(Json(json!({
        "status": 200,
        "dimensionSlices": record,
    })))
}
