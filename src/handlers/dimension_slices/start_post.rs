use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::services::dimension_slices::parse_lookback_days;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub data_source_id: String,
    pub query_id: String,
    #[serde(default)]
    pub lookback_days: Option<Value>,
}

/// POST /api/dimension-slices - run dimension analysis for one exposure
/// query. Awaits the warehouse query and returns the settled record.
pub async fn start_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    let lookback_days = parse_lookback_days(req.lookback_days.as_ref())?;

    let ds = state
        .stores
        .datasources
        .get(&ctx.org, &req.data_source_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Data source {} not found", req.data_source_id))
        })?;

    ctx.check_run_dimension_analysis(&ds)?;

    let record = state
        .slice_runner
        .start(&ctx, &ds, &req.query_id, lookback_days)
        .await?;

    Ok(Json(json!({
        "status": 200,
        "dimensionSlices": record,
    })))
}
