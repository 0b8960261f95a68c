use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Documents keyed by id, per database.
pub type Database = HashMap<String, Map<String, Value>>;

pub type Server = Arc<RwLock<HashMap<String, Database>>>;

type Reply = (StatusCode, Json<Value>);

#[derive(Deserialize)]
pub struct RevQuery {
    pub rev: Option<String>,
}

#[derive(Deserialize)]
pub struct RedirectQuery {
    pub to: String,
}

pub fn app() -> Router {
    let server: Server = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/", get(welcome))
        .route("/_session", post(create_session))
        .route("/_redirect", get(redirect))
        .route("/_echo", get(echo))
        .route("/{db}", put(create_db).get(db_info).delete(delete_db))
        .route("/{db}/{doc}", get(get_doc).put(put_doc).delete(delete_doc))
        .with_state(server)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// CouchDB-shaped error body.
pub fn couch_error(status: StatusCode, error: &str, reason: &str) -> Reply {
    (status, Json(json!({ "error": error, "reason": reason })))
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

async fn welcome() -> Json<Value> {
    Json(json!({ "couchdb": "Welcome", "vendor": { "name": "mock-couch" } }))
}

async fn create_session() -> Response {
    let cookie = format!(
        "AuthSession={}; Version=1; Path=/; HttpOnly",
        Uuid::new_v4().simple()
    );
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true, "name": null, "roles": [] })),
    )
        .into_response()
}

async fn redirect(Query(query): Query<RedirectQuery>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, query.to)]).into_response()
}

async fn echo(headers: HeaderMap) -> Json<Value> {
    let value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "host": value(header::HOST),
        "authorization": value(header::AUTHORIZATION),
    }))
}

async fn create_db(State(server): State<Server>, Path(db): Path<String>) -> Reply {
    let mut dbs = server.write().await;
    if dbs.contains_key(&db) {
        return couch_error(
            StatusCode::PRECONDITION_FAILED,
            "file_exists",
            "The database could not be created, the file already exists.",
        );
    }
    dbs.insert(db, Database::new());
    (StatusCode::CREATED, Json(json!({ "ok": true })))
}

async fn db_info(State(server): State<Server>, Path(db): Path<String>) -> Reply {
    let dbs = server.read().await;
    match dbs.get(&db) {
        Some(docs) => (
            StatusCode::OK,
            Json(json!({ "db_name": db, "doc_count": docs.len() })),
        ),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist."),
    }
}

async fn delete_db(State(server): State<Server>, Path(db): Path<String>) -> Reply {
    match server.write().await.remove(&db) {
        Some(_) => (StatusCode::OK, Json(json!({ "ok": true }))),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist."),
    }
}

async fn get_doc(
    State(server): State<Server>,
    Path((db, id)): Path<(String, String)>,
) -> Reply {
    let dbs = server.read().await;
    let Some(docs) = dbs.get(&db) else {
        return couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist.");
    };
    match docs.get(&id) {
        Some(doc) => (StatusCode::OK, Json(Value::Object(doc.clone()))),
        None => couch_error(StatusCode::NOT_FOUND, "not_found", "missing"),
    }
}

async fn put_doc(
    State(server): State<Server>,
    Path((db, id)): Path<(String, String)>,
    body: String,
) -> Reply {
    let Ok(Value::Object(mut doc)) = serde_json::from_str::<Value>(&body) else {
        return couch_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "Document must be a JSON object",
        );
    };

    let mut dbs = server.write().await;
    let Some(docs) = dbs.get_mut(&db) else {
        return couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist.");
    };

    let current = docs
        .get(&id)
        .and_then(|existing| existing.get("_rev"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let supplied = doc.get("_rev").and_then(Value::as_str);
    if current.as_deref() != supplied {
        return couch_error(StatusCode::CONFLICT, "conflict", "Document update conflict.");
    }

    let rev = next_rev(current.as_deref());
    doc.insert("_id".to_string(), Value::String(id.clone()));
    doc.insert("_rev".to_string(), Value::String(rev.clone()));
    docs.insert(id.clone(), doc);
    (
        StatusCode::CREATED,
        Json(json!({ "ok": true, "id": id, "rev": rev })),
    )
}

async fn delete_doc(
    State(server): State<Server>,
    Path((db, id)): Path<(String, String)>,
    Query(query): Query<RevQuery>,
) -> Reply {
    let mut dbs = server.write().await;
    let Some(docs) = dbs.get_mut(&db) else {
        return couch_error(StatusCode::NOT_FOUND, "not_found", "Database does not exist.");
    };
    let Some(doc) = docs.get(&id) else {
        return couch_error(StatusCode::NOT_FOUND, "not_found", "missing");
    };
    let current = doc.get("_rev").and_then(Value::as_str).map(str::to_string);
    if current != query.rev {
        return couch_error(StatusCode::CONFLICT, "conflict", "Document update conflict.");
    }
    docs.remove(&id);
    let rev = next_rev(current.as_deref());
    (
        StatusCode::OK,
        Json(json!({ "ok": true, "id": id, "rev": rev })),
    )
}
