//! In-process stand-in for the bucket and identity provider HTTP APIs.
//!
//! Available to other crates with the "test-utils" feature.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use structures::{AuthResponse, AuthUser, LoginRequest};
use tokio::sync::oneshot;

use crate::{
    constants::{APIKEY_HEADER, UPSERT_HEADER},
    BucketClient, Credentials,
};

pub const TEST_EMAIL: &str = "painter@example.com";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const TEST_ANON_KEY: &str = "anon-key";

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub key: String,
    pub content_type: String,
    pub token: String,
    pub upsert: bool,
    pub size: usize,
    pub received_at: DateTime<Utc>,
}

#[derive(Default)]
struct FakeState {
    objects: HashMap<String, Vec<u8>>,
    uploads: Vec<UploadRecord>,
    tokens: Vec<String>,
    logins: usize,
    reject_uploads: Option<StatusCode>,
    reject_logins: bool,
    login_body: Option<String>,
}

type SharedState = Arc<Mutex<FakeState>>;

pub struct FakeRemote {
    addr: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeRemote {
    pub async fn start() -> Self {
        let state = SharedState::default();
        let router = Router::new()
            .route("/storage/*key", get(get_object).post(put_object))
            .route("/auth/v1/token", post(login))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
        });

        FakeRemote {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    pub fn bucket_url(&self) -> String {
        format!("http://{}/storage/", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/auth/v1/token?grant_type=password", self.addr)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_url: self.api_url(),
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
            anon_key: TEST_ANON_KEY.to_string(),
        }
    }

    /// Credentials pointing nowhere, for clients that never upload.
    pub fn unused_credentials() -> Credentials {
        Credentials {
            api_url: "http://127.0.0.1:1/auth/v1/token".to_string(),
            email: TEST_EMAIL.to_string(),
            password: TEST_PASSWORD.to_string(),
            anon_key: TEST_ANON_KEY.to_string(),
        }
    }

    pub fn client(&self) -> BucketClient {
        BucketClient::new(self.bucket_url(), self.credentials()).expect("client")
    }

    pub fn put_object(&self, key: &str, bytes: Vec<u8>) {
        self.lock().objects.insert(key.to_string(), bytes);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.lock().uploads.clone()
    }

    pub fn login_count(&self) -> usize {
        self.lock().logins
    }

    pub fn is_valid_token(&self, token: &str) -> bool {
        self.lock().tokens.iter().any(|t| t == token)
    }

    pub fn reject_uploads(&self, status: Option<reqwest::StatusCode>) {
        self.lock().reject_uploads = status;
    }

    pub fn reject_logins(&self, reject: bool) {
        self.lock().reject_logins = reject;
    }

    /// Replaces the body of successful logins, e.g. with something unparsable.
    pub fn set_login_body(&self, body: Option<String>) {
        self.lock().login_body = body;
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake remote state poisoned")
    }
}

impl Drop for FakeRemote {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn get_object(State(state): State<SharedState>, Path(key): Path<String>) -> Response {
    let state = state.lock().expect("poisoned");
    match state.objects.get(&key) {
        Some(bytes) => bytes.clone().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "statusCode": "404", "error": "not_found" })),
        )
            .into_response(),
    }
}

async fn put_object(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().expect("poisoned");

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    if !state.tokens.contains(&token) {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }

    let upsert = headers
        .get(UPSERT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "true")
        .unwrap_or(false);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state.uploads.push(UploadRecord {
        key: key.clone(),
        content_type,
        token,
        upsert,
        size: body.len(),
        received_at: Utc::now(),
    });

    if let Some(status) = state.reject_uploads {
        return (status, "storage unavailable").into_response();
    }
    if state.objects.contains_key(&key) && !upsert {
        return (StatusCode::CONFLICT, "the resource already exists").into_response();
    }

    state.objects.insert(key.clone(), body.to_vec());
    Json(serde_json::json!({ "Key": key })).into_response()
}

async fn login(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Response {
    let mut state = state.lock().expect("poisoned");
    state.logins += 1;

    let api_key = headers
        .get(APIKEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if api_key != TEST_ANON_KEY {
        return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
    }

    let password_grant = query.get("grant_type").map(String::as_str) == Some("password");
    if state.reject_logins
        || !password_grant
        || request.email != TEST_EMAIL
        || request.password != TEST_PASSWORD
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid_grant" })),
        )
            .into_response();
    }

    if let Some(body) = state.login_body.clone() {
        return body.into_response();
    }

    let access_token = format!("token-{}", state.logins);
    state.tokens.push(access_token.clone());
    Json(AuthResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: AuthUser {
            id: "user-1".to_string(),
        },
    })
    .into_response()
}
