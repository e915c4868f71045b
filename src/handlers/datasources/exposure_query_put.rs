use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::models::datasource::ExposureQueryUpdates;
use crate::services::datasources::update_exposure_query;
use crate::state::AppState;

/// PUT /api/datasources/:id/exposure-queries/:query_id - partial update of
/// one exposure query
pub async fn exposure_query_put(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path((id, query_id)): Path<(String, String)>,
    Json(updates): Json<ExposureQueryUpdates>,
) -> Result<Json<Value>, ApiError> {
    update_exposure_query(&state, &ctx, &id, &query_id, updates).await?;

    Ok(Json(json!({ "status": 200 })))
}
