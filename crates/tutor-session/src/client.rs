//! Session client handle
//!
//! `SessionClient` is a cheap-to-clone handle over the shared session: HTTP
//! client, credential store, session state and refresh coordinator. The request
//! pipeline (`pipeline.rs`), refresh task (`refresh.rs`) and auth actions
//! (`actions.rs`) are all methods on it.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tutor_auth::{CredentialStore, Endpoints, LoginEncoding};

use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::request::ApiRequest;
use crate::session::{Session, SessionState};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default window before expiry in which a credential is refreshed up front.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Connection settings for one deployment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub timeout: Duration,
    pub login_encoding: LoginEncoding,
    pub expiry_skew: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            endpoints: Endpoints::new(base_url),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            login_encoding: LoginEncoding::default(),
            expiry_skew: DEFAULT_EXPIRY_SKEW,
        }
    }
}

/// Shared handle to the session. Clones share all state.
#[derive(Debug, Clone)]
pub struct SessionClient {
    pub(crate) inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) store: Arc<CredentialStore>,
    pub(crate) session: Session,
    pub(crate) coordinator: RefreshCoordinator,
}

impl SessionClient {
    /// Create a client over an already loaded store. The session starts
    /// `Unauthenticated`; call `restore()` to pick up a persisted credential.
    ///
    /// The timeout applies to every call, auth endpoints included.
    pub fn new(config: ClientConfig, store: Arc<CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("building HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, store, http))
    }

    pub fn with_http_client(
        config: ClientConfig,
        store: Arc<CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                store,
                session: Session::new(),
                coordinator: RefreshCoordinator::new(),
            }),
        }
    }

    pub fn current(&self) -> SessionState {
        self.inner.session.current()
    }

    /// Receive every subsequent session transition.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// GET a path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        self.send(ApiRequest::post(path).json(body)).await?.json()
    }

    /// DELETE a path, discarding the body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }
}
