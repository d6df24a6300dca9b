//! Tutor API authentication library
//!
//! Provides the credential model and its durable store, plus the raw wire calls
//! for the auth endpoints (login, signup, refresh, current user). This crate has
//! no notion of session state or retries; the session crate builds the request
//! pipeline and refresh coordination on top of it.
//!
//! Credential flow:
//! 1. `token::login()` or `token::signup()` returns tokens (and usually the user)
//! 2. `TokenResponse::into_credential()` computes the absolute expiry
//! 3. Credential persisted via `credentials::CredentialStore::write()`
//! 4. On 401 the session layer calls `token::refresh_token()` once
//! 5. Refreshed credential replaces the old one via `CredentialStore::write()`
//! 6. Logout or refresh failure removes it via `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore, unix_millis};
pub use error::{Error, Result};
pub use token::{
    Endpoints, LoginEncoding, LoginResponse, SignupRequest, SignupResponse, TokenResponse,
    UserId, UserProfile, fetch_profile, login, refresh_token, signup,
};
