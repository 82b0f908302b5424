use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use remote_node::{app, User};
use remote_service::{encode, ExcludedKeys, ParameterBag};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- context ---

#[tokio::test]
async fn external_request_context() {
    let resp = app().oneshot(get("/context?name=Ada")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ctx: Value = body_json(resp).await;
    assert_eq!(ctx["query"], json!({ "name": "Ada" }));
    assert_eq!(ctx["fields"]["provider"], "rest");
    assert!(ctx["fields"]["headers"].is_object());
}

#[tokio::test]
async fn envelope_restores_context() {
    let bag = ParameterBag::new()
        .with_query(json!({ "active": true }))
        .with("user", json!({ "id": 7 }));
    let envelope = encode(&bag, &ExcludedKeys::default());

    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/context?name=ignored")
                .header("X-Internal-Request", envelope)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    let ctx: Value = body_json(resp).await;
    assert_eq!(ctx["query"], json!({ "active": true }));
    assert_eq!(ctx["fields"]["user"], json!({ "id": 7 }));
    assert!(ctx["fields"].get("provider").is_none());
    assert!(ctx["fields"].get("headers").is_none());
}

#[tokio::test]
async fn broken_envelope_is_ignored() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/context")
                .header("x-internal-request", "%E0%A4%A")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let ctx: Value = body_json(resp).await;
    assert_eq!(ctx["fields"]["provider"], "rest");
}

// --- create ---

#[tokio::test]
async fn create_user_returns_201() {
    let resp = app()
        .oneshot(json_request("POST", "/users", r#"{"name":"Ada"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let user: User = body_json(resp).await;
    assert_eq!(user.id, 1);
    assert_eq!(user.name, "Ada");
    assert!(!user.active);
    assert!(user.created_by.is_none());
}

#[tokio::test]
async fn create_user_records_the_calling_user() {
    let envelope = encode(
        &ParameterBag::new().with("user", json!({ "id": 42 })),
        &ExcludedKeys::default(),
    );
    let mut req = json_request("POST", "/users", r#"{"name":"Ada"}"#);
    req.headers_mut()
        .insert("x-internal-request", envelope.parse().unwrap());

    let resp = app().oneshot(req).await.unwrap();
    let user: User = body_json(resp).await;
    assert_eq!(user.created_by, Some(json!(42)));
}

#[tokio::test]
async fn create_user_blank_name_is_bad_request() {
    let resp = app()
        .oneshot(json_request("POST", "/users", r#"{"name":" "}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(resp).await;
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["code"], 400);
    assert_eq!(body["className"], "bad-request");
    assert_eq!(body["data"], json!({ "field": "name" }));
}

#[tokio::test]
async fn create_user_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/users", r#"{"nom":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- get ---

#[tokio::test]
async fn get_user_not_found() {
    let resp = app().oneshot(get("/users/99")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(resp).await;
    assert_eq!(body["name"], "NotFound");
    assert_eq!(body["message"], "No record found for id '99'");
}

#[tokio::test]
async fn get_user_bad_id_returns_400() {
    let resp = app().oneshot(get("/users/not-a-number")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!body_bytes(resp).await.is_empty());
}

// --- update / patch / remove ---

#[tokio::test]
async fn update_user_not_found() {
    let resp = app()
        .oneshot(json_request("PUT", "/users/5", r#"{"name":"Nope"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_user_not_found() {
    let resp = app()
        .oneshot(json_request("PATCH", "/users/5", r#"{"active":true}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn remove_user_not_found() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/users/5")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collection_verbs_on_an_empty_store() {
    let resp = app().oneshot(get("/users")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let users: Vec<User> = body_json(resp).await;
    assert!(users.is_empty());

    let resp = app()
        .oneshot(json_request("PATCH", "/users", r#"{"active":true}"#))
        .await
        .unwrap();
    let users: Vec<User> = body_json(resp).await;
    assert!(users.is_empty());

    let resp = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/users")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    let users: Vec<User> = body_json(resp).await;
    assert!(users.is_empty());
}
