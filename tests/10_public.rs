mod common;

use axum::http::{Method, StatusCode};
use lakeview_api::testing::TestHarness;

#[tokio::test]
async fn root_and_health_respond_without_auth() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let (status, body) = common::send(&app, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["name"], "Lakeview API");

    let (status, body) = common::send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
}

#[tokio::test]
async fn api_routes_require_a_bearer_token() {
    let harness = TestHarness::new().await;
    let app = harness.app();

    let (status, body) = common::send(&app, Method::GET, "/api/datasources", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Authorization header"));
}

#[tokio::test]
async fn garbage_tokens_get_the_error_envelope() {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let harness = TestHarness::new().await;
    let app = harness.app();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/datasources")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], 401);
    assert!(body["message"].as_str().unwrap().contains("Invalid JWT"));
}
