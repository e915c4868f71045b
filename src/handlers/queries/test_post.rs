use std::collections::HashMap;

use axum::{extract::State, response::Json, Extension};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestQueryRequest {
    pub query: String,
    pub datasource_id: String,
    #[serde(default)]
    pub template_variables: HashMap<String, String>,
}

/// Replace `{{ name }}` placeholders with the supplied variable values.
/// Unknown placeholders are left untouched.
fn render_template(query: &str, variables: &HashMap<String, String>) -> String {
    let mut sql = query.to_string();
    for (name, value) in variables {
        sql = sql.replace(&format!("{{{{ {} }}}}", name), value);
        sql = sql.replace(&format!("{{{{{}}}}}", name), value);
    }
    sql
}

/// POST /api/queries/test - run ad-hoc SQL against a data source. Query
/// failures are reported in the body, not as an HTTP error.
pub async fn test_post(
    Extension(ctx): Extension<ReqContext>,
    State(state): State<AppState>,
    Json(req): Json<TestQueryRequest>,
) -> Result<Json<Value>, ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, &req.datasource_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Data source {} not found", req.datasource_id))
        })?;

    ctx.check_run_test_queries(&ds)?;

    let sql = render_template(&req.query, &req.template_variables);

    let integration = state
        .integrations
        .build(ds.datasource_type, &ds.params)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    match integration.run_test_query(&sql).await {
        Ok(run) => Ok(Json(json!({
            "status": 200,
            "duration": run.duration_ms,
            "results": run.results,
            "sql": sql,
        }))),
        Err(e) => Ok(Json(json!({
            "status": 200,
            "duration": 0,
            "results": [],
            "sql": sql,
            "error": e.to_string(),
        }))),
    }
}
