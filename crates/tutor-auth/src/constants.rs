//! Tutor API auth constants
//!
//! Default endpoint paths are relative to the configured API base URL. The
//! front ends mount the API under different prefixes (`/v1`, `/api/v1`), so the
//! prefix belongs in the base URL and only the auth paths live here.

/// Password login, returns an access credential and usually the user profile
pub const LOGIN_PATH: &str = "/auth/login";

/// Account creation; some deployments start a session, others only create the user
pub const SIGNUP_PATH: &str = "/auth/signup";

/// Bearer-authenticated "who am I" endpoint
pub const ME_PATH: &str = "/auth/me";

/// Refresh-token exchange
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Base URL used by the front ends when no override is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Key under which the live session credential is persisted
pub const DEFAULT_PROFILE: &str = "tutor_session";
