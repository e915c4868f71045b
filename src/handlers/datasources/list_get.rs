use axum::{extract::State, response::Json, Extension};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/datasources - list the data sources visible to the caller
pub async fn list_get(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let all = state.stores.datasources.list_for_org(&ctx.org).await?;

    let visible: Vec<Value> = all
        .iter()
        .filter(|ds| ctx.can_view_datasource(ds))
        .map(|ds| ds.to_api_value())
        .collect();

    Ok(Json(json!({
        "status": 200,
        "datasources": visible,
    })))
}
