//! Mapping from HTTP status codes to stable user-facing messages.
//!
//! The UI never sees raw transport errors; it gets a fixed message plus a
//! recoverability flag so it can decide whether to offer a retry action.

/// Stable message and recoverability for an HTTP status code.
pub fn describe_status(status: u16) -> (&'static str, bool) {
    match status {
        400 | 422 => ("The request could not be processed.", false),
        401 => ("Your session has expired. Please sign in again.", false),
        403 => ("You don't have access to this resource.", false),
        404 => ("The requested resource was not found.", false),
        408 => ("The request timed out. Please try again.", true),
        409 => ("This change conflicts with a newer update.", false),
        429 => ("Too many requests. Please try again shortly.", true),
        500..=599 => ("Something went wrong on our end. Please try again.", true),
        _ => ("An unexpected error occurred.", false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_recoverable() {
        for status in [500, 502, 503, 504] {
            let (_, recoverable) = describe_status(status);
            assert!(recoverable, "{status} should be recoverable");
        }
    }

    #[test]
    fn client_errors_are_not_recoverable() {
        for status in [400, 401, 403, 404, 409, 422] {
            let (_, recoverable) = describe_status(status);
            assert!(!recoverable, "{status} should not be recoverable");
        }
    }

    #[test]
    fn throttling_and_timeouts_invite_retry() {
        assert!(describe_status(429).1);
        assert!(describe_status(408).1);
    }

    #[test]
    fn messages_are_stable_text() {
        assert_eq!(
            describe_status(401).0,
            "Your session has expired. Please sign in again."
        );
    }
}
