use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::datasources::{update_datasource, UpdateDataSourceRequest};
use crate::state::AppState;

/// PUT /api/datasources/:id - partial update of a data source
pub async fn single_put(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDataSourceRequest>,
) -> Result<Json<Value>, ApiError> {
    update_datasource(&state, &ctx, &id, req).await?;

    Ok(Json(json!({ "status": 200 })))
}
