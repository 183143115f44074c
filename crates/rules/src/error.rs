//! Error types for rule evaluation and the metadata it depends on.

use std::time::Duration;

use thiserror::Error;

/// Failure reading from or writing to the user cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache holds no entry for the key. A miss, not a failure.
    #[error("not found in cache")]
    NotFound,

    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cached entry could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure talking to the remote user API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid API url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// `true` when the remote reports that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Failure resolving metadata through the rule context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to fetch user from cache: {0}")]
    CacheRead(#[source] CacheError),

    #[error("failed to cache user: {0}")]
    CacheWrite(#[source] CacheError),

    #[error("failed to fetch user from API: {0}")]
    Api(#[from] ApiError),
}

/// A single rule could not produce a score for this pass.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("rule '{rule}' timed out after {after:?}")]
    Timeout { rule: String, after: Duration },

    #[error("rule '{rule}' panicked: {message}")]
    Panicked { rule: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_404_counts_as_not_found() {
        let missing = ApiError::Status {
            status: 404,
            body: r#"{"message":"Unknown User","code":10013}"#.into(),
        };
        let forbidden = ApiError::Status {
            status: 403,
            body: String::new(),
        };
        assert!(missing.is_not_found());
        assert!(!forbidden.is_not_found());
        assert!(!ApiError::RateLimited { retry_after_secs: 2 }.is_not_found());
    }

    #[test]
    fn timeout_message_names_the_rule() {
        let err = RuleError::Timeout {
            rule: "Account age".into(),
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "rule 'Account age' timed out after 10s");
    }

    #[test]
    fn context_errors_wrap_their_source() {
        let err: RuleError = ContextError::CacheWrite(CacheError::NotFound).into();
        assert_eq!(err.to_string(), "failed to cache user: not found in cache");
    }
}
