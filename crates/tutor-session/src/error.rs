//! Error types for session and request pipeline operations

/// Errors surfaced to callers of the session client.
///
/// `AuthExpired` is terminal for the request and means the session is gone;
/// every other variant leaves the session untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session expired: {0}")]
    AuthExpired(String),

    #[error("access denied: {0}")]
    AuthDenied(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("server failure ({status}): {body}")]
    ServerFailure { status: u16, body: String },

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl From<tutor_auth::Error> for Error {
    fn from(err: tutor_auth::Error) -> Self {
        match err {
            tutor_auth::Error::Http(msg) => Error::NetworkFailure(msg),
            tutor_auth::Error::TokenExchange(msg) => Error::Decode(msg),
            tutor_auth::Error::InvalidCredentials(msg) => Error::InvalidCredentials(msg),
            tutor_auth::Error::Server { status, body } => Error::ServerFailure { status, body },
            tutor_auth::Error::Rejected { status, body } => Error::Rejected { status, body },
            tutor_auth::Error::CredentialParse(msg) | tutor_auth::Error::Io(msg) => {
                Error::Storage(msg)
            }
        }
    }
}

impl Error {
    /// Whether this error ended the session.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_session_errors() {
        let err: Error = tutor_auth::Error::Http("connection refused".into()).into();
        assert!(matches!(err, Error::NetworkFailure(_)));

        let err: Error = tutor_auth::Error::Server {
            status: 503,
            body: "unavailable".into(),
        }
        .into();
        assert!(matches!(err, Error::ServerFailure { status: 503, .. }));

        let err: Error = tutor_auth::Error::InvalidCredentials("bad".into()).into();
        assert!(matches!(err, Error::InvalidCredentials(_)));
        assert!(!err.is_auth_expired());

        let err: Error = tutor_auth::Error::Io("disk full".into()).into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn error_display_is_descriptive() {
        assert_eq!(
            Error::AuthExpired("refresh token rejected".into()).to_string(),
            "session expired: refresh token rejected"
        );
        assert_eq!(
            Error::ServerFailure {
                status: 500,
                body: "boom".into()
            }
            .to_string(),
            "server failure (500): boom"
        );
    }
}
