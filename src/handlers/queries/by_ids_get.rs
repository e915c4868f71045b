use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/queries/:ids - fetch query records by comma-separated ids.
/// Output order matches input order; missing ids come back as null.
pub async fn by_ids_get(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(ids): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ids: Vec<String> = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let queries = state.stores.queries.get_by_ids(&ctx.org, &ids).await?;

    Ok(Json(json!({
        "status": 200,
        "queries": queries,
    })))
}
