//! Auth actions: restore, login, signup, logout
//!
//! Each action is a controlled transition of the credential store and the
//! session state, performed under the session transition lock. Login and
//! logout start a new session epoch so that work from the previous session
//! (an in-flight refresh, a restore's profile fetch) cannot touch the new one.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use tutor_auth::{
    Credential, LoginResponse, SignupRequest, SignupResponse, UserProfile, fetch_profile,
};

use crate::client::SessionClient;
use crate::coordinator::RefreshEvent;
use crate::error::{Error, Result};
use crate::session::SessionState;

/// Result of a signup.
#[derive(Debug, Clone, PartialEq)]
pub enum SignupOutcome {
    /// The server started a session; it is now active.
    Authenticated(Arc<UserProfile>),
    /// Account created without a session; the user must log in.
    LoginRequired { account: Value },
}

impl SessionClient {
    /// Pick up a persisted credential at startup.
    ///
    /// With a credential, the session is `Authenticating` while the profile is
    /// fetched through the pipeline (so an expired token is refreshed), then
    /// `Authenticated`. Any failure clears the store. Never leaves the session
    /// `Authenticating`.
    pub async fn restore(&self) -> SessionState {
        let inner = &self.inner;
        let epoch = {
            let guard = inner.session.lock().await;
            if inner.store.read().await.is_none() {
                // drops a corrupt entry, if any
                if let Err(e) = inner.store.clear().await {
                    warn!(error = %e, "failed to clear credential store");
                }
                inner.session.publish(&guard, SessionState::Unauthenticated);
                info!("no stored session");
                return inner.session.current();
            }
            inner.session.publish(&guard, SessionState::Authenticating);
            inner.session.epoch()
        };

        let result = self
            .get_json::<UserProfile>(&inner.config.endpoints.me)
            .await;

        let guard = inner.session.lock().await;
        if inner.session.epoch() != epoch {
            // logout, login or refresh failure got there first
            return inner.session.current();
        }
        match result {
            Ok(user) => {
                info!(user = %user.email, "session restored");
                inner
                    .session
                    .publish(&guard, SessionState::Authenticated(Arc::new(user)));
            }
            Err(e) => {
                warn!(error = %e, "stored session could not be restored");
                inner.session.advance_epoch(&guard);
                if let Err(e) = inner.store.clear().await {
                    warn!(error = %e, "failed to clear credential store");
                }
                inner.session.publish(&guard, SessionState::Unauthenticated);
            }
        }
        inner.session.current()
    }

    /// Log in with an identifier (email) and secret.
    ///
    /// On failure the session is left as it was.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Arc<UserProfile>> {
        let inner = &self.inner;
        let response = tutor_auth::login(
            &inner.http,
            &inner.config.endpoints,
            identifier,
            secret,
            inner.config.login_encoding,
        )
        .await?;
        self.start_session(response).await
    }

    /// Create an account. Starts a session only if the server returns one.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupOutcome> {
        let inner = &self.inner;
        match tutor_auth::signup(&inner.http, &inner.config.endpoints, request).await? {
            SignupResponse::Session(response) => {
                let user = self.start_session(response).await?;
                Ok(SignupOutcome::Authenticated(user))
            }
            SignupResponse::Created(account) => {
                info!("account created, login required");
                Ok(SignupOutcome::LoginRequired { account })
            }
        }
    }

    /// End the session: clear the store, drop the profile, release every
    /// request waiting on a refresh with `AuthExpired`.
    ///
    /// The session is `Unauthenticated` when this returns, even on error; the
    /// error only reports that the stored credential could not be removed.
    pub async fn logout(&self) -> Result<()> {
        let result = self.end_session().await;
        info!("logged out");
        result
    }

    /// Logout initiated by the pipeline after an unrecoverable 401.
    pub(crate) async fn force_logout(&self) -> Result<()> {
        let result = self.end_session().await;
        warn!("session ended by server");
        result
    }

    async fn end_session(&self) -> Result<()> {
        let inner = &self.inner;
        let guard = inner.session.lock().await;
        let epoch = inner.session.advance_epoch(&guard);
        let cleared = inner.store.clear().await;
        inner.session.publish(&guard, SessionState::Unauthenticated);
        let refresh_in_flight = inner.coordinator.is_refreshing();
        let action = inner.coordinator.apply(RefreshEvent::LoggedOut);
        drop(guard);

        info!(epoch, refresh_in_flight, "session ended");
        self.execute(action);
        cleared
            .map(|_| ())
            .map_err(|e| Error::Storage(e.to_string()))
    }

    /// Store the credential from a login or signup and go `Authenticated`.
    async fn start_session(&self, response: LoginResponse) -> Result<Arc<UserProfile>> {
        let inner = &self.inner;
        let (token, user) = response.into_parts();
        let credential = token.into_credential(None);
        let user = match user {
            Some(user) => user,
            None => {
                fetch_profile(&inner.http, &inner.config.endpoints, &credential.access_token)
                    .await?
            }
        };
        let user = Arc::new(user);
        self.commit(credential, Arc::clone(&user)).await;
        Ok(user)
    }

    async fn commit(&self, credential: Credential, user: Arc<UserProfile>) {
        let inner = &self.inner;
        let guard = inner.session.lock().await;
        let epoch = inner.session.advance_epoch(&guard);
        if let Err(e) = inner.store.write(credential).await {
            warn!(error = %e, "credential not persisted, session will not survive restart");
        }
        info!(epoch, user = %user.email, "logged in");
        inner
            .session
            .publish(&guard, SessionState::Authenticated(user));
        // a refresh from the previous session settles as superseded
        let action = inner.coordinator.apply(RefreshEvent::LoggedOut);
        drop(guard);
        self.execute(action);
    }
}
