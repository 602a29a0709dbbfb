//! Request orchestration tests driving the router in-process.

mod common;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use clf_serve::server::api::{build_router, AppState};
use clf_serve::server::auth::basic_header;

use common::{credentials, line_count, monitoring_file, test_config, valid_body, PASSWORD, USERNAME};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_inference(body: &Value, auth: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::post("/inference").header(CONTENT_TYPE, "application/json");
    if let Some((user, pass)) = auth {
        builder = builder.header(AUTHORIZATION, basic_header(user, pass));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_check(auth: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::get("/check");
    if let Some((user, pass)) = auth {
        builder = builder.header(AUTHORIZATION, basic_header(user, pass));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_check_active() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let (status, body) = send(&app, get_check(Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "active"}));
}

#[tokio::test]
async fn test_check_requires_auth() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let (status, body) = send(&app, get_check(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"detail": "Invalid credentials."}));

    let (status, _) = send(&app, get_check(Some((USERNAME, "wrong")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_three_observations_scored_and_persisted() {
    let tmp = TempDir::new().unwrap();
    let (state, worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let (status, body) = send(&app, post_inference(&valid_body(3), Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identifier"], json!(["obs-0", "obs-1", "obs-2"]));

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    for p in predictions {
        let p = p.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    drop(app);
    let summary = worker.shutdown().await.unwrap();
    assert_eq!(summary.rows_written, 3);

    let path = monitoring_file(tmp.path());
    assert_eq!(line_count(&path), 4);
    let contents = std::fs::read_to_string(path).unwrap();
    let header = contents.lines().next().unwrap();
    assert!(header.starts_with("mean_radius,mean_texture,"));
    assert!(header.ends_with(",prediction,identifier,request_time"));
}

#[tokio::test]
async fn test_unrecognized_feature_rejected() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let mut body = valid_body(2);
    body["data"]["worst_radius"] = json!([1.0, 2.0]);

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["detail"], "Validation error");

    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field_name"], "worst_radius");
    assert_eq!(errors[0]["expected_type"], "extra_forbidden");
    assert_eq!(errors[0]["value_received"], json!([1.0, 2.0]));
}

#[tokio::test]
async fn test_length_mismatch_rejected() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let mut body = valid_body(3);
    body["data"]["mean_area"] = json!([500.0, 600.0]);

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field_name"], "mean_area");
    assert_eq!(errors[0]["expected_type"], "length_mismatch");
}

#[tokio::test]
async fn test_missing_and_extra_fields_all_reported() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let mut body = valid_body(1);
    body.as_object_mut().unwrap().remove("identifier");
    body["data"].as_object_mut().unwrap().remove("mean_symmetry");
    body["model_version"] = json!("v2");

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut fields: Vec<&str> = response["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field_name"].as_str().unwrap())
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["identifier", "mean_symmetry", "model_version"]);
}

#[tokio::test]
async fn test_wrong_password_skips_all_work() {
    let tmp = TempDir::new().unwrap();
    let (state, worker) = AppState::bootstrap(&test_config(tmp.path(), 1), credentials()).unwrap();
    let app = build_router(state.clone());

    let (status, body) = send(&app, post_inference(&valid_body(3), Some((USERNAME, "nope")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"detail": "Invalid credentials."}));

    // An invalid body with bad credentials is still a 401, not a 422.
    let (status, _) = send(&app, post_inference(&json!({"junk": true}), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(state.metrics.observations_scored.get(), 0);
    assert_eq!(state.metrics.groups_enqueued.get(), 0);

    drop(app);
    drop(state);
    let summary = worker.shutdown().await.unwrap();
    assert_eq!(summary.rows_written, 0);
    assert_eq!(line_count(&monitoring_file(tmp.path())), 1);
}

#[tokio::test]
async fn test_large_body_checks_credentials_first() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state.clone());

    // Roughly 3 MB, above axum's 2 MB default.
    let body = valid_body(25_000);
    assert!(body.to_string().len() > 2 * 1024 * 1024);

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, "nope")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response, json!({"detail": "Invalid credentials."}));

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["predictions"].as_array().unwrap().len(), 25_000);
    assert_eq!(state.metrics.observations_scored.get(), 25_000);
}

#[tokio::test]
async fn test_body_over_configured_limit_is_validation_error() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path(), 5);
    config.server.max_body_bytes = 1024;
    let (state, _worker) = AppState::bootstrap(&config, credentials()).unwrap();
    let app = build_router(state.clone());

    let body = valid_body(50);
    assert!(body.to_string().len() > 1024);

    let (status, response) = send(&app, post_inference(&body, Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response["detail"], "Validation error");
    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field_name"], "body");
    assert_eq!(errors[0]["expected_type"], "body_too_large");

    // Still authentication before size.
    let (status, _) = send(&app, post_inference(&body, Some(("intruder", PASSWORD)))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A small body still fits.
    let (status, _) = send(&app, post_inference(&valid_body(1), Some((USERNAME, PASSWORD)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.metrics.observations_scored.get(), 1);
}

#[tokio::test]
async fn test_invalid_json_is_validation_error() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    let request = Request::post("/inference")
        .header(AUTHORIZATION, basic_header(USERNAME, PASSWORD))
        .body(Body::from("{\"identifier\": ["))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["expected_type"], "json_invalid");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let tmp = TempDir::new().unwrap();
    let (state, _worker) = AppState::bootstrap(&test_config(tmp.path(), 5), credentials()).unwrap();
    let app = build_router(state);

    send(&app, post_inference(&valid_body(2), Some((USERNAME, PASSWORD)))).await;

    let request = Request::get("/metrics")
        .header(AUTHORIZATION, basic_header(USERNAME, PASSWORD))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("clf_observations_scored_total 2"));
    assert!(text.contains(r#"clf_http_requests_total{endpoint="inference",status="200"} 1"#));
    assert!(text.contains("clf_monitoring_queue_free_slots"));

    let unauthenticated = Request::get("/metrics").body(Body::empty()).unwrap();
    let (status, _) = send(&app, unauthenticated).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bootstrap_fails_without_model() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path(), 5);
    config.model.artifact_path = tmp.path().join("missing.json");

    assert!(AppState::bootstrap(&config, credentials()).is_err());
}
