use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::auto_fact_tables::discover;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub schema: String,
}

/// POST /api/datasources/:id/fact-tables/discover - propose fact-table
/// candidates from tracked events. Discovery problems after authorization
/// ride a 200 body with a message.
pub async fn discover_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DiscoverRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = discover(&state, &ctx, &id, &req.schema).await?;

    let mut body = json!({
        "status": 200,
        "autoFactTablesToCreate": result.candidates,
    });
    if let Some(message) = result.message {
        body["message"] = Value::String(message);
    }

    Ok(Json(body))
}
