use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/datasources/:id - fetch one data source, credentials stripped
pub async fn single_get(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, &id)
        .await?
        .filter(|ds| ctx.can_view_datasource(ds))
        .ok_or_else(|| ApiError::not_found(format!("Data source {} not found", id)))?;

    Ok(Json(json!({
        "status": 200,
        "datasource": ds.to_api_value(),
    })))
}
