//! A fake ingestion service for end-to-end tests.
//!
//! Serves the three-phase protocol on an ephemeral port and records every
//! request so tests can assert on exactly what the daemon sent. Uploads
//! and confirms can be made to fail to exercise the retry paths.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
pub struct RemoteState {
    pub ingests: Vec<serde_json::Value>,
    /// Authorization header observed on each ingest request.
    pub auth_headers: Vec<Option<String>>,
    /// (handshake_id, uploaded byte count)
    pub uploads: Vec<(String, usize)>,
    pub confirms: Vec<serde_json::Value>,
    pub fail_uploads: bool,
    pub fail_confirms: bool,
    next_id: u64,
}

#[derive(Clone)]
struct SharedState {
    state: Arc<Mutex<RemoteState>>,
    base_url: String,
}

pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
    pub base_url: String,
}

impl FakeRemote {
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(RemoteState::default()));
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake remote");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let shared = SharedState {
            state: Arc::clone(&state),
            base_url: base_url.clone(),
        };
        thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build runtime");
            rt.block_on(async move {
                listener.set_nonblocking(true).unwrap();
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let app = Router::new()
                    .route("/v1/ingest/request", post(ingest_request))
                    .route("/v1/ingest/confirm", post(confirm))
                    .route("/uploads/:handshake", put(upload))
                    .with_state(shared);
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self { state, base_url }
    }

    pub fn ingests(&self) -> Vec<serde_json::Value> {
        self.state.lock().unwrap().ingests.clone()
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().auth_headers.clone()
    }

    pub fn uploads(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn confirms(&self) -> Vec<serde_json::Value> {
        self.state.lock().unwrap().confirms.clone()
    }

    pub fn success_confirms(&self) -> usize {
        self.confirms()
            .iter()
            .filter(|c| c["status"] == "SUCCESS")
            .count()
    }

    pub fn failed_confirms(&self) -> usize {
        self.confirms()
            .iter()
            .filter(|c| c["status"] == "FAILED")
            .count()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.state.lock().unwrap().fail_uploads = fail;
    }

    pub fn set_fail_confirms(&self, fail: bool) {
        self.state.lock().unwrap().fail_confirms = fail;
    }
}

async fn ingest_request(
    State(shared): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut state = shared.state.lock().unwrap();
    state.next_id += 1;
    let handshake = format!("hs-{}", state.next_id);
    state.ingests.push(body);
    state.auth_headers.push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let response = serde_json::json!({
        "handshake_id": handshake,
        "upload_url": format!("{}/uploads/{handshake}", shared.base_url),
        "expires_at": (chrono::Utc::now() + chrono::Duration::minutes(10)).to_rfc3339(),
    });
    (StatusCode::CREATED, Json(response))
}

async fn upload(
    State(shared): State<SharedState>,
    Path(handshake): Path<String>,
    body: axum::body::Bytes,
) -> StatusCode {
    let mut state = shared.state.lock().unwrap();
    if state.fail_uploads {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.uploads.push((handshake, body.len()));
    StatusCode::OK
}

async fn confirm(
    State(shared): State<SharedState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let mut state = shared.state.lock().unwrap();
    // Failed-upload reports are always accepted; only success confirms
    // are failable, so tests can pin a record in PENDING.
    if state.fail_confirms && body["status"] == "SUCCESS" {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.confirms.push(body);
    StatusCode::OK
}
