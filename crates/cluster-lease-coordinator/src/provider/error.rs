//! Provider error classification
//!
//! Typed errors for cluster provider calls, classified from the HTTP status
//! and the `error_code` field of the API's error body.

use thiserror::Error;

/// Provider error categories for retry and cleanup logic
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Cluster does not exist (safe to skip in cleanup)
    #[error("Cluster not found: '{cluster_id}'")]
    NotFound { cluster_id: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Service or network temporarily unavailable (retryable)
    #[error("Provider temporarily unavailable: {message}")]
    Unavailable { message: String },

    /// Request refused for a reason retrying will not fix (quota, bad spec, auth)
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Any other API error
    #[error("Provider API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl ProviderError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled | ProviderError::Unavailable { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ProviderError::Rejected { code, .. } => suggestion_for_code(code),
            ProviderError::Api {
                code: Some(code), ..
            } => suggestion_for_code(code),
            ProviderError::Throttled => suggestion_for_code("REQUEST_LIMIT_EXCEEDED"),
            _ => None,
        }
    }
}

/// Error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &["RESOURCE_DOES_NOT_EXIST", "NOT_FOUND"];

/// Error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["REQUEST_LIMIT_EXCEEDED", "TOO_MANY_REQUESTS"];

/// Error codes for transient service failures
const UNAVAILABLE_CODES: &[&str] = &["TEMPORARILY_UNAVAILABLE", "INTERNAL_ERROR"];

/// Error codes retrying will not fix
const REJECTED_CODES: &[&str] = &[
    "INVALID_PARAMETER_VALUE",
    "INVALID_STATE",
    "PERMISSION_DENIED",
    "QUOTA_EXCEEDED",
    "RESOURCE_EXHAUSTED",
    "UNAUTHENTICATED",
    "BAD_REQUEST",
];

/// Classify an API error from its HTTP status and error body.
pub fn classify_api_error(
    status: u16,
    code: Option<&str>,
    message: Option<&str>,
    cluster_id: Option<&str>,
) -> ProviderError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound {
            cluster_id: cluster_id.unwrap_or_default().to_string(),
        },
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled,
        Some(c) if UNAVAILABLE_CODES.contains(&c) => ProviderError::Unavailable { message },
        Some(c) if REJECTED_CODES.contains(&c) => ProviderError::Rejected {
            code: c.to_string(),
            message,
        },
        _ => match status {
            404 => ProviderError::NotFound {
                cluster_id: cluster_id.unwrap_or_default().to_string(),
            },
            429 => ProviderError::Throttled,
            502..=504 => ProviderError::Unavailable { message },
            _ => ProviderError::Api {
                status,
                code: code.map(str::to_string),
                message,
            },
        },
    }
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "QUOTA_EXCEEDED",
        "The workspace cluster quota is exhausted. Release unused clusters or request a quota increase.",
    ),
    (
        "RESOURCE_EXHAUSTED",
        "The workspace cluster quota is exhausted. Release unused clusters or request a quota increase.",
    ),
    (
        "INVALID_PARAMETER_VALUE",
        "Check the spark_version and node_type_id against what the workspace offers.",
    ),
    (
        "PERMISSION_DENIED",
        "The token lacks permission to manage clusters, or the cluster policy forbids this spec.",
    ),
    (
        "UNAUTHENTICATED",
        "Check DATABRICKS_TOKEN; it may be missing or expired.",
    ),
    (
        "REQUEST_LIMIT_EXCEEDED",
        "API rate limit hit. The operation will be retried automatically.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<String> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| (*s).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_api_error(400, Some(code), Some("msg"), Some("0101-abc"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_api_error(429, Some(code), Some("msg"), None);
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, ProviderError::Throttled));
        }
    }

    #[test]
    fn unavailable_codes() {
        for code in UNAVAILABLE_CODES {
            let err = classify_api_error(500, Some(code), Some("try later"), None);
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
        }
    }

    #[test]
    fn rejected_codes_are_final() {
        for code in REJECTED_CODES {
            let err = classify_api_error(400, Some(code), Some("no"), None);
            assert!(!err.is_retryable(), "Expected final for code: {code}");
            assert!(matches!(err, ProviderError::Rejected { .. }));
        }
    }

    #[test]
    fn status_fallback() {
        let err = classify_api_error(404, None, None, Some("0101-abc"));
        match err {
            ProviderError::NotFound { cluster_id } => assert_eq!(cluster_id, "0101-abc"),
            other => panic!("expected NotFound, got {other:?}"),
        }

        assert!(matches!(
            classify_api_error(429, None, None, None),
            ProviderError::Throttled
        ));
        assert!(classify_api_error(503, None, Some("gateway"), None).is_retryable());

        let err = classify_api_error(500, Some("SOME_NEW_ERROR"), Some("details"), None);
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn suggestions() {
        let err = classify_api_error(400, Some("QUOTA_EXCEEDED"), Some("limit"), None);
        assert!(err.suggestion().unwrap().contains("quota"));

        assert!(ProviderError::Throttled.suggestion().is_some());

        let err = ProviderError::NotFound {
            cluster_id: "x".into(),
        };
        assert!(err.suggestion().is_none());
    }
}
