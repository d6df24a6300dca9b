//! Authenticated request pipeline
//!
//! Every API call goes through `SessionClient::send`:
//! 1. Read the current credential and the store generation it belongs to
//! 2. If the credential is about to expire and can be refreshed, skip the send
//!    and go straight to the refresh coordinator
//! 3. Dispatch with `Authorization: Bearer <access_token>`
//! 4. 2xx → return unmodified; 401 → refresh coordinator; anything else →
//!    typed error, no retry, no session change
//!
//! A request is sent at most twice. The replay after a refresh is marked
//! `Attempt::Replay`; a 401 on it ends the session.

use futures_util::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{Instrument, debug, instrument, warn};
use tutor_auth::{Credential, unix_millis};

use crate::classify::{StatusClass, classify_status};
use crate::client::SessionClient;
use crate::coordinator::{PendingRequest, RefreshAction};
use crate::error::{Error, Result};
use crate::metrics;
use crate::request::{ApiRequest, ApiResponse, Attempt, RequestBody};

/// Result of putting one request on the wire.
enum Dispatch {
    Complete(ApiResponse),
    Unauthorized,
}

impl SessionClient {
    /// Send an authenticated request.
    ///
    /// Resolves exactly once: with the upstream response, or with an error.
    /// `Error::AuthExpired` means the session has ended.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let result = self.send_traced(request, request_id).await;
        metrics::record_request(outcome_label(&result));
        result
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path))]
    async fn send_traced(&self, request: ApiRequest, request_id: String) -> Result<ApiResponse> {
        let (credential, generation) = self.inner.store.snapshot().await;

        if let Some(credential) = &credential {
            if self.needs_refresh(credential) {
                debug!("credential expiring, refreshing before send");
                return self.recover(request, generation).await;
            }
        }

        match self
            .dispatch(&request, credential.as_ref(), Attempt::Original)
            .await?
        {
            Dispatch::Complete(response) => Ok(response),
            Dispatch::Unauthorized => self.recover(request, generation).await,
        }
    }

    fn needs_refresh(&self, credential: &Credential) -> bool {
        credential.has_refresh_token()
            && credential.expires_within(self.inner.config.expiry_skew, unix_millis())
    }

    /// Put one request on the wire.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
        attempt: Attempt,
    ) -> Result<Dispatch> {
        let config = &self.inner.config;
        let mut url = reqwest::Url::parse(&config.endpoints.url(&request.path))
            .map_err(|e| Error::NetworkFailure(format!("invalid request URL: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .timeout(config.timeout);

        if let Some(credential) = credential {
            builder = builder.bearer_auth(&credential.access_token);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Raw { content_type, data } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::NetworkFailure(format!(
                    "request timed out after {}s: {e}",
                    config.timeout.as_secs()
                ))
            } else {
                Error::NetworkFailure(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::NetworkFailure(format!("reading response body: {e}")))?;

        match classify_status(status.as_u16()) {
            StatusClass::Success => Ok(Dispatch::Complete(ApiResponse {
                status,
                headers,
                body,
            })),
            StatusClass::Unauthorized => {
                debug!(attempt = attempt.label(), "upstream returned 401");
                Ok(Dispatch::Unauthorized)
            }
            StatusClass::Forbidden => {
                let text = String::from_utf8_lossy(&body);
                Err(Error::AuthDenied(tutor_auth::token::detail_message(&text)))
            }
            StatusClass::ServerError => Err(Error::ServerFailure {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            StatusClass::Other => Err(Error::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }

    /// Hand an unauthorized request to the refresh coordinator and wait for
    /// its single outcome.
    async fn recover(&self, request: ApiRequest, sent_generation: u64) -> Result<ApiResponse> {
        let (pending, outcome) = PendingRequest::new(request);
        let inner = &self.inner;
        let action = inner.coordinator.auth_failed(
            pending,
            sent_generation,
            || inner.store.generation(),
            inner.session.epoch(),
        );
        self.execute(action);

        outcome
            .await
            .unwrap_or_else(|_| Err(Error::AuthExpired("refresh abandoned".into())))
    }

    /// Carry out a coordinator action. Never blocks; network work is spawned.
    pub(crate) fn execute(&self, action: RefreshAction) {
        match action {
            RefreshAction::StartRefresh { epoch } => {
                debug!(epoch, "starting token refresh");
                let client = self.clone();
                tokio::spawn(async move { client.run_refresh(epoch).await });
            }
            RefreshAction::Queued { position } => {
                debug!(queued = position, "waiting on in-flight refresh");
            }
            RefreshAction::ReplayNow(pending) => {
                debug!("credential already refreshed, replaying");
                let client = self.clone();
                tokio::spawn(async move { client.replay(pending).await });
            }
            RefreshAction::Replay(queue) => {
                debug!(queued = queue.len(), "replaying queued requests");
                let client = self.clone();
                tokio::spawn(async move { client.replay_all(queue).await });
            }
            RefreshAction::Expire(queue) => {
                for pending in queue {
                    pending.fail(Error::AuthExpired("token refresh failed".into()));
                }
            }
            RefreshAction::Abandon(queue) => {
                for pending in queue {
                    pending.fail(Error::AuthExpired("session ended".into()));
                }
            }
            RefreshAction::Restart { settled, epoch } => {
                self.execute(*settled);
                self.execute(RefreshAction::StartRefresh { epoch });
            }
            RefreshAction::None => {}
        }
    }

    /// Replay queued requests, started in queue order, each resolving
    /// independently.
    async fn replay_all(&self, queue: Vec<PendingRequest>) {
        join_all(queue.into_iter().map(|pending| self.replay(pending))).await;
    }

    async fn replay(&self, pending: PendingRequest) {
        let PendingRequest {
            request,
            settle,
            span,
        } = pending;
        let result = self.replay_once(request).instrument(span).await;
        let _ = settle.send(result);
    }

    async fn replay_once(&self, request: ApiRequest) -> Result<ApiResponse> {
        metrics::record_replay();
        let credential = self.inner.store.read().await;
        match self
            .dispatch(&request, credential.as_ref(), Attempt::Replay)
            .await?
        {
            Dispatch::Complete(response) => Ok(response),
            Dispatch::Unauthorized => {
                warn!("replayed request rejected, ending session");
                if let Err(e) = self.force_logout().await {
                    warn!(error = %e, "failed to clear credential after rejected replay");
                }
                Err(Error::AuthExpired(
                    "request rejected after token refresh".into(),
                ))
            }
        }
    }
}

fn outcome_label(result: &Result<ApiResponse>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(Error::AuthExpired(_)) => "auth_expired",
        Err(Error::AuthDenied(_)) => "auth_denied",
        Err(Error::NetworkFailure(_)) => "network_failure",
        Err(Error::ServerFailure { .. }) => "server_failure",
        Err(_) => "rejected",
    }
}
