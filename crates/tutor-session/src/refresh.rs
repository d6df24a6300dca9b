//! The single in-flight token refresh
//!
//! Runs on its own task so it settles even if the request that triggered it
//! is dropped. Settling takes the session transition lock and checks the
//! epoch: a session that ended (or was replaced by a new login) while the call
//! was in flight is left alone and the result discarded.

use std::time::Instant;

use tracing::{info, warn};
use tutor_auth::Credential;

use crate::client::SessionClient;
use crate::coordinator::{RefreshEvent, RefreshOutcome};
use crate::error::{Error, Result};
use crate::metrics;
use crate::session::SessionState;

impl SessionClient {
    /// Perform the refresh started at `epoch` and settle the coordinator.
    pub(crate) async fn run_refresh(&self, epoch: u64) {
        let started = Instant::now();
        let result = self.exchange_refresh_token().await;

        let inner = &self.inner;
        let guard = inner.session.lock().await;
        let outcome = if inner.session.epoch() != epoch {
            info!(epoch, "session changed during refresh, discarding result");
            RefreshOutcome::Superseded
        } else {
            match result {
                Ok(credential) => {
                    if let Err(e) = inner.store.write(credential).await {
                        warn!(error = %e, "refreshed credential not persisted");
                    }
                    info!(epoch, "token refresh succeeded");
                    RefreshOutcome::Succeeded
                }
                Err(e) => {
                    warn!(epoch, error = %e, "token refresh failed, ending session");
                    inner.session.advance_epoch(&guard);
                    if let Err(e) = inner.store.clear().await {
                        warn!(error = %e, "failed to clear credential after refresh failure");
                    }
                    inner.session.publish(&guard, SessionState::Unauthenticated);
                    RefreshOutcome::Failed
                }
            }
        };
        let action = inner.coordinator.apply(RefreshEvent::Settled(outcome));
        drop(guard);

        metrics::record_refresh(outcome.label(), started.elapsed().as_secs_f64());
        self.execute(action);
    }

    /// Exchange the stored refresh token for a new credential.
    ///
    /// No refresh token means the session cannot be renewed; that is a failure
    /// without a network call.
    async fn exchange_refresh_token(&self) -> Result<Credential> {
        let inner = &self.inner;
        let refresh = inner
            .store
            .read()
            .await
            .and_then(|c| c.refresh_token)
            .ok_or_else(|| Error::AuthExpired("no refresh token".into()))?;

        let token =
            tutor_auth::refresh_token(&inner.http, &inner.config.endpoints, &refresh).await?;
        Ok(token.into_credential(Some(refresh)))
    }
}
