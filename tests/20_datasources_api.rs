mod common;

use axum::http::StatusCode;
use serde_json::json;

use lakeview_api::context::Role;
use lakeview_api::testing::{
    analyst_ctx, ctx_with, mixpanel_datasource, postgres_datasource, TestHarness,
};

#[tokio::test]
async fn list_strips_credentials_and_filters_by_project() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let open = harness.seed_datasource(postgres_datasource()).await;
    let mut scoped = mixpanel_datasource();
    scoped.projects = vec!["prj_hidden".to_string()];
    harness.seed_datasource(scoped).await;

    let ctx = ctx_with(Role::Collaborator, &["prj_other"]);
    let (status, body) = common::get(&app, "/api/datasources", &ctx).await;

    assert_eq!(status, StatusCode::OK);
    let listed = body["datasources"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], open.id.as_str());
    assert_eq!(listed[0]["params"]["host"], "db.internal");
    assert!(listed[0]["params"].get("password").is_none());
}

#[tokio::test]
async fn get_returns_404_for_unknown_id() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let (status, body) = common::get(&app, "/api/datasources/ds_missing", &analyst_ctx()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn create_requires_admin_and_returns_the_new_id() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let req = json!({
        "name": "New warehouse",
        "type": "postgres",
        "params": {
            "type": "postgres",
            "host": "db2.internal",
            "port": 5432,
            "user": "app",
            "password": "s3cret",
            "database": "events"
        }
    });

    let (status, _) = common::post(&app, "/api/datasources", &analyst_ctx(), req.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = ctx_with(Role::Admin, &[]);
    let (status, body) = common::post(&app, "/api/datasources", &admin, req).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = common::get(&app, &format!("/api/datasources/{}", id), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasource"]["name"], "New warehouse");
    // Event-tracking defaults are merged in on create
    assert_eq!(
        body["datasource"]["settings"]["events"]["experimentEvent"],
        "$experiment_started"
    );
}

#[tokio::test]
async fn type_changes_are_rejected_on_update() {
    let harness = TestHarness::new().await;
    let app = harness.app();
    let ds = harness.seed_datasource(postgres_datasource()).await;

    let admin = ctx_with(Role::Admin, &[]);
    let (status, body) = common::put(
        &app,
        &format!("/api/datasources/{}", ds.id),
        &admin,
        json!({ "type": "bigquery" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("type"));
}

#[tokio::test]
async fn exposure_query_update_merges_only_the_named_entry() {
    let harness = TestHarness::new().await;
    let app = harness.app();
    let ds = harness.seed_datasource(postgres_datasource()).await;

    let (status, _) = common::put(
        &app,
        &format!("/api/datasources/{}/exposure-queries/eq_main", ds.id),
        &analyst_ctx(),
        json!({ "name": "Renamed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let admin = ctx_with(Role::Admin, &[]);
    let (_, body) = common::get(&app, &format!("/api/datasources/{}", ds.id), &admin).await;
    let queries = body["datasource"]["settings"]["exposureQueries"]
        .as_array()
        .unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["id"], "eq_main");
    assert_eq!(queries[0]["name"], "Renamed");
    // Sibling fields and the second entry are untouched
    assert_eq!(queries[0]["userIdType"], "user_id");
    assert_eq!(queries[1]["id"], "eq_anonymous");
}

#[tokio::test]
async fn delete_is_blocked_while_metrics_reference_the_source() {
    let harness = TestHarness::new().await;
    let app = harness.app();
    let ds = harness.seed_datasource(postgres_datasource()).await;

    harness
        .store
        .seed_metric(lakeview_api::models::metric::Metric {
            id: "met_1".to_string(),
            organization: "org_1".to_string(),
            datasource: ds.id.clone(),
            name: "Revenue".to_string(),
        })
        .await;

    let admin = ctx_with(Role::Admin, &[]);
    let (status, body) =
        common::delete(&app, &format!("/api/datasources/{}", ds.id), &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("metric"));

    // The record survives a blocked delete
    let (status, _) = common::get(&app, &format!("/api/datasources/{}", ds.id), &admin).await;
    assert_eq!(status, StatusCode::OK);
}
