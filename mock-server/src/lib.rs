use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Body served at `/files/lorem.pdf`.
pub const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n";

/// Size of the body served at `/files/large.bin`.
pub const LARGE_FILE_LEN: usize = 256 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact: String,
    pub length: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub size: usize,
    pub content_type: Option<String>,
}

/// What `/echo` saw of a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Clone)]
struct Stored {
    content_type: Option<String>,
    body: Bytes,
}

type Db = Arc<RwLock<HashMap<Uuid, Stored>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/fact", get(fact))
        .route("/slow-fact", get(slow_fact))
        .route("/garbage", get(garbage))
        .route("/status/{code}", get(status))
        .route("/echo", any(echo))
        .route("/files/{name}", get(file))
        .route("/upload", post(upload))
        .route("/uploads/{id}", get(get_upload))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Deterministic content of `/files/large.bin`.
pub fn large_file() -> Vec<u8> {
    (0..LARGE_FILE_LEN).map(|i| (i % 251) as u8).collect()
}

async fn fact() -> Json<Fact> {
    Json(Fact {
        fact: "cats sleep".to_string(),
        length: 10,
    })
}

async fn slow_fact() -> Json<Fact> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    fact().await
}

async fn garbage() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "not json")
}

async fn status(Path(code): Path<u16>) -> Result<StatusCode, StatusCode> {
    StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn file(Path(name): Path<String>) -> Result<Response, StatusCode> {
    match name.as_str() {
        "lorem.pdf" => Ok(([(header::CONTENT_TYPE, "application/pdf")], SAMPLE_PDF).into_response()),
        "large.bin" => Ok(([(header::CONTENT_TYPE, "application/octet-stream")], large_file()).into_response()),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn upload(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Json<UploadReceipt> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let id = Uuid::new_v4();
    let receipt = UploadReceipt {
        id,
        size: body.len(),
        content_type: content_type.clone(),
    };
    db.write().await.insert(id, Stored { content_type, body });
    tracing::info!(%id, size = receipt.size, "stored upload");
    Json(receipt)
}

async fn get_upload(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Response, StatusCode> {
    let stored = db.read().await.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    let content_type = stored
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], stored.body).into_response())
}
