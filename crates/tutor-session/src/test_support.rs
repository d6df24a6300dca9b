//! In-process mock of the tutor API for pipeline and action tests.
//!
//! - one valid access token at a time (`at_valid`, then `at_refreshed_N`)
//! - refresh token `rt_valid` is accepted; anything else gets 401
//! - login accepts `student@example.com` / `secret`; `bare@example.com` /
//!   `secret` succeeds without a `user` in the response
//! - signup with `session@example.com` returns a session, anything else only
//!   the created account
//! - `/forbidden`, `/broken`, `/missing` and `/always-401` return fixed statuses

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tutor_auth::{Credential, CredentialStore};

use crate::client::{ClientConfig, SessionClient};

pub(crate) struct MockState {
    pub refresh_calls: AtomicUsize,
    pub refresh_delay_ms: AtomicU64,
    pub valid_token: Mutex<String>,
    /// (path, bearer token) for every authenticated route hit
    pub seen: Mutex<Vec<(String, String)>>,
}

impl MockState {
    pub fn valid_token(&self) -> String {
        self.valid_token.lock().unwrap().clone()
    }

    /// Bearer tokens seen on `path`, in arrival order.
    pub fn tokens_for(&self, path: &str) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Revoke the current access token in favour of `token`.
    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.to_string();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub(crate) struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

pub(crate) fn profile_json() -> Value {
    json!({
        "id": 7,
        "email": "student@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "role": "student"
    })
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Could not validate credentials"})),
    )
        .into_response()
}

/// Record the call and check the bearer token.
fn authorize(state: &MockState, path: &str, headers: &HeaderMap) -> bool {
    let token = bearer(headers);
    state
        .seen
        .lock()
        .unwrap()
        .push((path.to_string(), token.clone()));
    token == state.valid_token()
}

fn guarded(state: &MockState, path: &str, headers: &HeaderMap, body: Value) -> Response {
    if authorize(state, path, headers) {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        unauthorized()
    }
}

impl MockApi {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            refresh_calls: AtomicUsize::new(0),
            refresh_delay_ms: AtomicU64::new(0),
            valid_token: Mutex::new("at_valid".into()),
            seen: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new()
            .route(
                "/api/v1/auth/login",
                post(
                    |State(state): State<Arc<MockState>>, Json(body): Json<Value>| async move {
                        if body["password"] != "secret" {
                            return (
                                StatusCode::UNAUTHORIZED,
                                Json(json!({"detail": "Incorrect email or password"})),
                            )
                                .into_response();
                        }
                        let mut response = json!({
                            "access_token": state.valid_token(),
                            "refresh_token": "rt_valid",
                            "token_type": "bearer",
                            "expires_in": 1800,
                        });
                        if body["email"] == "student@example.com" {
                            response["user"] = profile_json();
                        }
                        (StatusCode::OK, Json(response)).into_response()
                    },
                ),
            )
            .route(
                "/api/v1/auth/signup",
                post(
                    |State(state): State<Arc<MockState>>, Json(body): Json<Value>| async move {
                        if body["email"] == "session@example.com" {
                            return (
                                StatusCode::OK,
                                Json(json!({
                                    "access_token": state.valid_token(),
                                    "refresh_token": "rt_valid",
                                    "user": profile_json(),
                                })),
                            )
                                .into_response();
                        }
                        (
                            StatusCode::CREATED,
                            Json(json!({"id": 8, "email": body["email"], "is_active": true})),
                        )
                            .into_response()
                    },
                ),
            )
            .route(
                "/api/v1/auth/me",
                get(
                    |State(state): State<Arc<MockState>>, headers: HeaderMap| async move {
                        guarded(&state, "/auth/me", &headers, profile_json())
                    },
                ),
            )
            .route(
                "/api/v1/auth/refresh",
                post(
                    |State(state): State<Arc<MockState>>, Json(body): Json<Value>| async move {
                        let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                        let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
                        if delay > 0 {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                        if body["refresh_token"] != "rt_valid" {
                            return (
                                StatusCode::UNAUTHORIZED,
                                Json(json!({"detail": "Invalid refresh token"})),
                            )
                                .into_response();
                        }
                        let token = format!("at_refreshed_{n}");
                        *state.valid_token.lock().unwrap() = token.clone();
                        (
                            StatusCode::OK,
                            Json(json!({"access_token": token, "expires_in": 1800})),
                        )
                            .into_response()
                    },
                ),
            )
            .route(
                "/api/v1/docs/",
                get(
                    |State(state): State<Arc<MockState>>, headers: HeaderMap| async move {
                        guarded(
                            &state,
                            "/docs/",
                            &headers,
                            json!([{"id": 1, "filename": "biology.pdf"}]),
                        )
                    },
                ),
            )
            .route(
                "/api/v1/docs/{id}",
                delete(
                    |State(state): State<Arc<MockState>>, headers: HeaderMap| async move {
                        if authorize(&state, "/docs/{id}", &headers) {
                            StatusCode::NO_CONTENT.into_response()
                        } else {
                            unauthorized()
                        }
                    },
                ),
            )
            .route(
                "/api/v1/progress/overview",
                get(
                    |State(state): State<Arc<MockState>>, headers: HeaderMap| async move {
                        guarded(
                            &state,
                            "/progress/overview",
                            &headers,
                            json!({"total_documents": 3, "streak_days": 4}),
                        )
                    },
                ),
            )
            .route("/api/v1/always-401", get(|| async { unauthorized() }))
            .route(
                "/api/v1/forbidden",
                get(|| async {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({"detail": "Not enough permissions"})),
                    )
                }),
            )
            .route(
                "/api/v1/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/api/v1/missing",
                get(|| async {
                    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"})))
                }),
            )
            .with_state(Arc::clone(&state));

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            state,
            _server: server,
        }
    }

    /// A client over a fresh store in `dir`, optionally seeded with a credential.
    pub async fn client(&self, dir: &tempfile::TempDir, seed: Option<Credential>) -> SessionClient {
        let store = CredentialStore::load(dir.path().join("credentials.json"), "tutor_session")
            .await
            .unwrap();
        if let Some(credential) = seed {
            store.write(credential).await.unwrap();
        }
        SessionClient::new(ClientConfig::new(self.base_url.clone()), Arc::new(store)).unwrap()
    }
}

/// Credential the mock rejects but can refresh.
pub(crate) fn stale_credential() -> Credential {
    Credential::new("at_stale", Some("rt_valid".into()))
}
