use axum::{
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};

use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

pub mod bigquery;
pub mod datasources;
pub mod dimension_slices;
pub mod fact_tables;
pub mod oauth;
pub mod public;
pub mod queries;

/// The full application router: public probes plus the JWT-protected API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(api_routes(state))
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(datasource_routes())
        .merge(query_routes())
        .merge(dimension_slice_routes())
        .merge(fact_table_routes())
        .route("/api/oauth/google/redirect", post(oauth::google_redirect_post))
        .route("/api/bigquery/datasets", post(bigquery::datasets_post))
        .route_layer(from_fn(jwt_auth_middleware))
        .with_state(state)
}

fn datasource_routes() -> Router<AppState> {
    Router::new()
        .route("/api/datasources", get(datasources::list_get))
        .route("/api/datasources", post(datasources::single_post))
        .route("/api/datasources/:id", get(datasources::single_get))
        .route("/api/datasources/:id", put(datasources::single_put))
        .route("/api/datasources/:id", delete(datasources::single_delete))
        .route(
            "/api/datasources/:id/exposure-queries/:query_id",
            put(datasources::exposure_query_put),
        )
}

fn query_routes() -> Router<AppState> {
    Router::new()
        .route("/api/queries/test", post(queries::test_post))
        .route("/api/queries/:ids", get(queries::by_ids_get))
}

fn dimension_slice_routes() -> Router<AppState> {
    Router::new()
        .route("/api/dimension-slices", post(dimension_slices::start_post))
        .route("/api/dimension-slices/:id", get(dimension_slices::single_get))
        .route(
            "/api/dimension-slices/:id/cancel",
            post(dimension_slices::cancel_post),
        )
        .route(
            "/api/dimension-slices/datasource/:datasource_id/:query_id",
            get(dimension_slices::latest_get),
        )
}

fn fact_table_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/datasources/:id/fact-tables/discover",
            post(fact_tables::discover_post),
        )
        .route(
            "/api/datasources/:id/fact-tables/auto-create",
            post(fact_tables::auto_create_post),
        )
}
