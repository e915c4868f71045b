use axum::{extract::State, response::Json, Extension};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::datasources::{create_datasource, CreateDataSourceRequest};
use crate::state::AppState;

/// POST /api/datasources - create a data source
pub async fn single_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Json(req): Json<CreateDataSourceRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = create_datasource(&state, &ctx, req).await?;

    Ok(Json(json!({
        "status": 200,
        "id": id,
    })))
}
