use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::datasources::delete_datasource;
use crate::state::AppState;

/// DELETE /api/datasources/:id - delete after dependency checks
pub async fn single_delete(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    delete_datasource(&state, &ctx, &id).await?;

    Ok(Json(json!({ "status": 200 })))
}
