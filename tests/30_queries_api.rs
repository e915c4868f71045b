mod common;

use axum::http::StatusCode;
use serde_json::json;

use lakeview_api::models::query::Query;
use lakeview_api::testing::{analyst_ctx, postgres_datasource, StubBehavior, TestHarness};

#[tokio::test]
async fn test_query_renders_template_variables_and_returns_rows() {
    let harness = TestHarness::new().await;
    let app = harness.app();
    let ds = harness.seed_datasource(postgres_datasource()).await;
    harness
        .stub
        .set_test_rows(vec![json!({"user_id": "u_9", "event": "purchase"})]);

    let (status, body) = common::post(
        &app,
        "/api/queries/test",
        &analyst_ctx(),
        json!({
            "query": "SELECT * FROM events WHERE name = '{{ eventName }}'",
            "datasourceId": ds.id,
            "templateVariables": { "eventName": "purchase" }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["sql"],
        "SELECT * FROM events WHERE name = 'purchase'"
    );
    assert_eq!(body["results"][0]["event"], "purchase");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_query_failures_ride_a_200_body() {
    let harness = TestHarness::new().await;
    let app = harness.app();
    let ds = harness.seed_datasource(postgres_datasource()).await;
    harness
        .stub
        .set_behavior(StubBehavior::FailQueries("relation missing".to_string()));

    let (status, body) = common::post(
        &app,
        "/api/queries/test",
        &analyst_ctx(),
        json!({ "query": "SELECT 1", "datasourceId": ds.id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["error"].as_str().unwrap().contains("relation missing"));
    assert_eq!(body["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_query_against_a_missing_datasource_is_404() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let (status, _) = common::post(
        &app,
        "/api/queries/test",
        &analyst_ctx(),
        json!({ "query": "SELECT 1", "datasourceId": "ds_missing" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queries_by_ids_preserve_input_order_with_nulls_for_missing() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let a = Query::new(
        "org_1".to_string(),
        "ds_1".to_string(),
        "sql".to_string(),
        "SELECT 1".to_string(),
    );
    let c = Query::new(
        "org_1".to_string(),
        "ds_1".to_string(),
        "sql".to_string(),
        "SELECT 2".to_string(),
    );
    harness.store.seed_query(a.clone()).await;
    harness.store.seed_query(c.clone()).await;

    let uri = format!("/api/queries/{},qry_missing,{}", a.id, c.id);
    let (status, body) = common::get(&app, &uri, &analyst_ctx()).await;

    assert_eq!(status, StatusCode::OK);
    let queries = body["queries"].as_array().unwrap();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0]["id"], a.id.as_str());
    assert!(queries[1].is_null());
    assert_eq!(queries[2]["id"], c.id.as_str());
}
