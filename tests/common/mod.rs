// Shared helpers for driving the router in-process. Each test builds its own
// application over in-memory stores and a stub warehouse, so no external
// services are required.

// Not every test binary uses every helper
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lakeview_api::context::ReqContext;
use lakeview_api::testing::bearer_token;

/// Send one request through the router, returning the status and JSON body.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    ctx: Option<&ReqContext>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ctx) = ctx {
        builder = builder.header("authorization", bearer_token(ctx));
    }

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).expect("request body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response JSON")
    };

    (status, json)
}

pub async fn get(app: &Router, uri: &str, ctx: &ReqContext) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Some(ctx), None).await
}

pub async fn post(app: &Router, uri: &str, ctx: &ReqContext, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(ctx), Some(body)).await
}

pub async fn put(app: &Router, uri: &str, ctx: &ReqContext, body: Value) -> (StatusCode, Value) {
    send(app, Method::PUT, uri, Some(ctx), Some(body)).await
}

pub async fn delete(app: &Router, uri: &str, ctx: &ReqContext) -> (StatusCode, Value) {
    send(app, Method::DELETE, uri, Some(ctx), None).await
}
