use axum::response::Json;
use serde_json::{json, Value};

/// GET / - service description
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "status": 200,
        "name": "Lakeview API",
        "version": version,
        "description": "Data source management API for warehouse-backed experiment analytics",
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "datasources": "/api/datasources[/:id] (protected)",
            "exposure_queries": "/api/datasources/:id/exposure-queries/:queryId (protected)",
            "queries": "/api/queries/test, /api/queries/:ids (protected)",
            "dimension_slices": "/api/dimension-slices[/:id] (protected)",
            "fact_tables": "/api/datasources/:id/fact-tables/* (protected)",
            "oauth": "/api/oauth/google/redirect (protected)",
            "bigquery": "/api/bigquery/datasets (protected)"
        }
    }))
}

/// GET /health - liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": 200,
        "healthy": true,
        "timestamp": chrono::Utc::now(),
    }))
}
