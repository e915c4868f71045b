use axum::{response::Json, Extension};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::integrations::oauth::GoogleOauthClient;

#[derive(Debug, Deserialize)]
pub struct RedirectRequest {
    #[serde(default)]
    pub projects: Vec<String>,
}

/// POST /api/oauth/google/redirect - consent URL for connecting a Google
/// Analytics data source. Gated by create permission on the target projects.
pub async fn google_redirect_post(
    Extension(ctx): Extension<ReqContext>,
    Json(req): Json<RedirectRequest>,
) -> Result<Json<Value>, ApiError> {
    ctx.check_create_datasource(&req.projects)?;

    let state = Uuid::new_v4().simple().to_string();
    let url = GoogleOauthClient::new()
        .auth_url(&state)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(Json(json!({
        "status": 200,
        "url": url.to_string(),
    })))
}
