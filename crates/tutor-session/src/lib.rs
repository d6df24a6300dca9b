//! Session and token refresh coordination for the tutor API
//!
//! Wraps every API call in an authenticated request pipeline and keeps one
//! application-visible session state. Concurrent 401s share a single refresh
//! call; every request waiting on it is replayed once with the new credential
//! or failed with `Error::AuthExpired` if the refresh fails.
//!
//! Session lifecycle:
//! 1. `restore()` at startup picks up a persisted credential and fetches the user
//! 2. `login()` / `signup()` store a credential → `Authenticated(user)`
//! 3. A 401 (or a credential about to expire) → one refresh → replay
//! 4. Refresh failure or a 401 on a replay → store cleared → `Unauthenticated`
//! 5. `logout()` clears the store and releases any request waiting on a refresh

mod actions;
pub mod classify;
mod client;
mod coordinator;
pub mod error;
pub mod metrics;
mod pipeline;
mod refresh;
pub mod request;
mod session;
#[cfg(test)]
mod test_support;

pub use actions::SignupOutcome;
pub use classify::{StatusClass, classify_status};
pub use client::{ClientConfig, DEFAULT_EXPIRY_SKEW, DEFAULT_TIMEOUT, SessionClient};
pub use error::{Error, Result};
pub use request::{ApiRequest, ApiResponse, RequestBody};
pub use session::{SessionState, SessionStatus};
