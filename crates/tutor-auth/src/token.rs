//! Auth endpoint calls: login, signup, refresh, current user
//!
//! Raw wire calls with no retry or session logic. Error statuses are mapped
//! into `Error` variants so the session layer can decide what each one means:
//! rejected credentials, server failure, or an unexpected rejection.
//!
//! The API is a FastAPI service; error bodies carry a `detail` field that is
//! either a message string or a list of validation errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::{DEFAULT_BASE_URL, LOGIN_PATH, ME_PATH, REFRESH_PATH, SIGNUP_PATH};
use crate::credentials::{Credential, unix_millis};
use crate::error::{Error, Result};
use crate::jwt;

/// Auth endpoint locations for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base_url: String,
    pub login: String,
    pub signup: String,
    pub me: String,
    pub refresh: String,
}

impl Endpoints {
    /// Default auth paths under the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login: LOGIN_PATH.into(),
            signup: SIGNUP_PATH.into(),
            me: ME_PATH.into(),
            refresh: REFRESH_PATH.into(),
        }
    }

    /// Join a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// How the login endpoint expects credentials.
///
/// `Json` posts `{"email", "password"}`; `Form` posts an OAuth2 password form
/// with `username`/`password`, which is what some deployments accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginEncoding {
    #[default]
    Json,
    Form,
}

/// User identifier; numeric in the main API, string in the lightweight one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// Profile returned by the "who am I" endpoint.
///
/// Only the fields the session layer reads are typed; everything else the
/// server sends is kept in `extra` and round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// First and last name when known, otherwise the email.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// Response from the refresh endpoint.
///
/// `expires_in` is a delta in seconds from the response time. Deployments that
/// do not rotate refresh tokens omit `refresh_token`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Build the credential to store.
    ///
    /// Expiry comes from `expires_in` when present, otherwise from the JWT
    /// `exp` claim. A missing refresh token falls back to `previous_refresh`.
    pub fn into_credential(self, previous_refresh: Option<String>) -> Credential {
        let expires_at = match self.expires_in {
            Some(secs) => Some(unix_millis().saturating_add(secs.saturating_mul(1000))),
            None => jwt::expiry_millis(&self.access_token),
        };
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or(previous_refresh);
        Credential::new(self.access_token, refresh_token).with_expiry(expires_at)
    }
}

/// Response from the login endpoint (and from signup when it starts a session).
///
/// `user` is omitted by deployments that expect a follow-up "who am I" call.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl LoginResponse {
    /// Split into the token part and the optional profile.
    pub fn into_parts(self) -> (TokenResponse, Option<UserProfile>) {
        (
            TokenResponse {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_in: self.expires_in,
            },
            self.user,
        )
    }
}

/// Response from the signup endpoint.
///
/// Deployments differ: some return a live credential, others only the created
/// account and require an explicit login afterwards.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignupResponse {
    Session(LoginResponse),
    Created(Value),
}

/// New account fields. Optional fields are omitted from the request when unset.
#[derive(Clone, Default, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_code: Option<String>,
}

impl SignupRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

/// Exchange an identifier and secret for a session.
pub async fn login(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    identifier: &str,
    secret: &str,
    encoding: LoginEncoding,
) -> Result<LoginResponse> {
    let request = client.post(endpoints.url(&endpoints.login));
    let request = match encoding {
        LoginEncoding::Json => request.json(&serde_json::json!({
            "email": identifier,
            "password": secret,
        })),
        LoginEncoding::Form => request.form(&[("username", identifier), ("password", secret)]),
    };

    let response = request
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(response, &[400, 401, 422]).await);
    }

    debug!(?encoding, "login accepted");
    response
        .json::<LoginResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid login response: {e}")))
}

/// Create an account.
pub async fn signup(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    request: &SignupRequest,
) -> Result<SignupResponse> {
    let response = client
        .post(endpoints.url(&endpoints.signup))
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Http(format!("signup request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(response, &[400, 422]).await);
    }

    response
        .json::<SignupResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid signup response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// 401/403 means the refresh token is revoked or expired.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(endpoints.url(&endpoints.refresh))
        .json(&serde_json::json!({ "refresh_token": refresh }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(response, &[401, 403]).await);
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Fetch the profile for a bearer token.
///
/// Used right after login when the login response carries no user; regular
/// profile fetches go through the session request pipeline instead.
pub async fn fetch_profile(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<UserProfile> {
    let response = client
        .get(endpoints.url(&endpoints.me))
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::Http(format!("profile request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(response, &[401, 403]).await);
    }

    response
        .json::<UserProfile>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid profile response: {e}")))
}

/// Map a non-success response into an error.
///
/// Statuses listed in `credential_statuses` mean the presented credentials were
/// rejected; 5xx is a server failure; anything else is a plain rejection.
async fn status_error(response: reqwest::Response, credential_statuses: &[u16]) -> Error {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));

    if credential_statuses.contains(&status) {
        return Error::InvalidCredentials(detail_message(&body));
    }
    if status >= 500 {
        return Error::Server { status, body };
    }
    Error::Rejected { status, body }
}

/// Extract a readable message from a FastAPI error body.
///
/// `{"detail": "..."}` yields the string; `{"detail": [{"msg": ...}]}` joins the
/// validation messages; anything else is returned verbatim.
pub fn detail_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    match value.get("detail") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                body.to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => body.to_string(),
    }
}
