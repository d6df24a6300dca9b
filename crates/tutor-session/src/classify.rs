//! Response status classification
//!
//! Decides what the pipeline does with each upstream status. Only 401 enters
//! the refresh path; everything else is returned or surfaced as-is.

/// What a response status means to the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx, returned unmodified
    Success,
    /// 401, credential missing, expired or revoked
    Unauthorized,
    /// 403, authenticated but not allowed; never retried
    Forbidden,
    /// 5xx
    ServerError,
    /// Any other non-2xx status
    Other,
}

/// Classify an upstream HTTP status.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 => StatusClass::Unauthorized,
        403 => StatusClass::Forbidden,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success_range() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(201), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
    }

    #[test]
    fn classify_auth_statuses() {
        assert_eq!(classify_status(401), StatusClass::Unauthorized);
        assert_eq!(classify_status(403), StatusClass::Forbidden);
    }

    #[test]
    fn classify_server_errors() {
        for status in [500, 502, 503, 504] {
            assert_eq!(classify_status(status), StatusClass::ServerError);
        }
    }

    #[test]
    fn classify_other_statuses() {
        assert_eq!(classify_status(404), StatusClass::Other);
        assert_eq!(classify_status(422), StatusClass::Other);
        assert_eq!(classify_status(429), StatusClass::Other);
        assert_eq!(classify_status(304), StatusClass::Other);
    }
}
