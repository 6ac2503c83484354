//! In-process stand-in for the storage service and the regeneration function.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub const PDF_PREFIX: &[u8] = b"%PDF-1.4 ";

#[derive(Clone)]
struct PlatformState {
    base: String,
    hits: Arc<Mutex<Vec<String>>>,
    authorization: Arc<Mutex<Option<String>>>,
}

impl PlatformState {
    fn record(&self, hit: String, headers: &HeaderMap) {
        self.hits.lock().unwrap().push(hit);
        *self.authorization.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
}

/// Buckets `broken` and `empty` make signing fail or answer without a URL.
/// Objects whose name starts with `missing` are served as 404. Invoice
/// `inv_bad` fails to regenerate, `inv_nourl` regenerates without a file URL
/// and `inv_gone` regenerates to a missing object.
pub struct FakePlatform {
    state: PlatformState,
}

impl FakePlatform {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = PlatformState {
            base: format!("http://{}", addr),
            hits: Arc::new(Mutex::new(Vec::new())),
            authorization: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/storage/v1/object/sign/{bucket}/{*path}", post(sign).get(download))
            .route("/functions/v1/generate-invoice-pdf", post(regenerate))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state }
    }

    pub fn base(&self) -> String {
        self.state.base.clone()
    }

    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.state.base)
    }

    pub fn regenerate_url(&self) -> String {
        format!("{}/functions/v1/generate-invoice-pdf", self.state.base)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.state.base, bucket, path)
    }

    pub fn hits(&self) -> Vec<String> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.authorization.lock().unwrap().clone()
    }
}

async fn sign(
    State(state): State<PlatformState>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(format!("POST /storage/v1/object/sign/{}/{}", bucket, path), &headers);
    match bucket.as_str() {
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "bucket unavailable").into_response(),
        "empty" => Json(json!({})).into_response(),
        _ => {
            let expires_in = body["expiresIn"].as_u64().unwrap_or_default();
            Json(json!({
                "signedURL": format!("/object/sign/{}/{}?token=signed-{}", bucket, path, expires_in)
            }))
            .into_response()
        }
    }
}

async fn download(
    State(state): State<PlatformState>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.record(format!("GET /storage/v1/object/sign/{}/{}", bucket, path), &headers);
    if path.starts_with("missing") {
        return (StatusCode::NOT_FOUND, "Object not found").into_response();
    }
    let mut body = PDF_PREFIX.to_vec();
    body.extend_from_slice(path.as_bytes());
    body.into_response()
}

async fn regenerate(
    State(state): State<PlatformState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("POST /functions/v1/generate-invoice-pdf".to_string(), &headers);
    let invoice_id = body["invoiceId"].as_str().unwrap_or_default().to_string();
    let signed = |name: &str| {
        format!(
            "{}/storage/v1/object/sign/invoices/{}.pdf?token=fresh",
            state.base, name
        )
    };
    match invoice_id.as_str() {
        "inv_bad" => (StatusCode::INTERNAL_SERVER_ERROR, "template render failed").into_response(),
        "inv_nourl" => Json(json!({"success": true})).into_response(),
        "inv_gone" => {
            Json(json!({ "fileUrl": signed(&format!("missing-{}", invoice_id)) })).into_response()
        }
        _ => Json(json!({ "fileUrl": signed(&invoice_id) })).into_response(),
    }
}
