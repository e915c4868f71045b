use axum::{response::Json, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::integrations::bigquery::BigQueryIntegration;
use crate::models::datasource::BigQueryParams;

#[derive(Debug, Deserialize)]
pub struct DatasetsRequest {
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

/// POST /api/bigquery/datasets - list datasets visible to a service
/// account, used during BigQuery connection setup
pub async fn datasets_post(
    Extension(ctx): Extension<ReqContext>,
    Json(req): Json<DatasetsRequest>,
) -> Result<Json<Value>, ApiError> {
    ctx.check_create_datasource(&[])?;

    let integration = BigQueryIntegration::new(BigQueryParams {
        project_id: req.project_id,
        client_email: req.client_email,
        private_key: req.private_key,
        default_dataset: None,
    });

    let datasets = integration
        .list_datasets()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(Json(json!({
        "status": 200,
        "datasets": datasets,
    })))
}
