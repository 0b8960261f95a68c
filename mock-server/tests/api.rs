use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_couch::app;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.to_string())
        .unwrap()
}

// --- server ---

#[tokio::test]
async fn welcome_is_json() {
    let resp = app().oneshot(request("GET", "/", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        "application/json"
    );
    let body = body_json(resp).await;
    assert_eq!(body["couchdb"], "Welcome");
}

#[tokio::test]
async fn session_sets_auth_cookie() {
    let resp = app()
        .oneshot(request("POST", "/_session", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[http::header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("AuthSession="));
    assert!(cookie.ends_with("; Version=1; Path=/; HttpOnly"));
}

#[tokio::test]
async fn redirect_points_at_target() {
    let resp = app()
        .oneshot(request("GET", "/_redirect?to=/db/doc", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[http::header::LOCATION], "/db/doc");
}

#[tokio::test]
async fn echo_reports_host_and_authorization() {
    let req = Request::builder()
        .uri("/_echo")
        .header(http::header::HOST, "replica.local:5985")
        .header(http::header::AUTHORIZATION, "Basic abc")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["host"], "replica.local:5985");
    assert_eq!(body["authorization"], "Basic abc");
}

// --- databases ---

#[tokio::test]
async fn missing_db_is_not_found() {
    let resp = app().oneshot(request("GET", "/nope", "")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn missing_doc_reason_is_missing() {
    use tower::Service;

    let mut app = app().into_service();
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/db/foo", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["reason"], "missing");
}

#[tokio::test]
async fn non_object_doc_is_bad_request() {
    use tower::Service;

    let mut app = app().into_service();
    ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db", ""))
        .await
        .unwrap();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db/foo", "[1,2]"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- full document lifecycle ---

#[tokio::test]
async fn document_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // create db, twice
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

    // create doc
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db/foo", r#"{"content":"test123456"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let rev1 = created["rev"].as_str().unwrap().to_string();
    assert!(rev1.starts_with("1-"));

    // fetch
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/db/foo", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = body_json(resp).await;
    assert_eq!(doc["_id"], "foo");
    assert_eq!(doc["_rev"], rev1.as_str());
    assert_eq!(doc["content"], "test123456");

    // update with current rev
    let update = format!(r#"{{"_rev":"{rev1}","content":"testupdated"}}"#);
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db/foo", &update))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let updated = body_json(resp).await;
    let rev2 = updated["rev"].as_str().unwrap().to_string();
    assert!(rev2.starts_with("2-"));

    // update with stale rev conflicts
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("PUT", "/db/foo", &update))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert_eq!(body["reason"], "Document update conflict.");

    // delete with current rev
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", &format!("/db/foo?rev={rev2}"), ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // gone
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/db/foo", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // drop db
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", "/db", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", "/db", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(!body_bytes(resp).await.is_empty());
}
