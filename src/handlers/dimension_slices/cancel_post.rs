use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/dimension-slices/:id/cancel - request cancellation of a run
pub async fn cancel_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.slice_runner.cancel(&ctx, &id).await?;

    Ok(Json(json!({ "status": 200 })))
}
