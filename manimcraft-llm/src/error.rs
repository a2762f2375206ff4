//! LLM error types
//!
//! Re-exports manimcraft-error and maps provider failures onto it.

pub use manimcraft_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

impl ProviderError {
    /// Convert into the unified error, tagging the operation that failed.
    ///
    /// Kept explicit instead of a `From` impl so callers decide where the
    /// provider boundary is.
    pub fn into_error(self, operation: &'static str) -> Error {
        let kind = match &self {
            ProviderError::Network(_) => ErrorKind::NetworkFailed,
            ProviderError::Api { status, .. } if *status >= 500 => ErrorKind::ProviderUnavailable,
            ProviderError::Api { status: 413, .. } => ErrorKind::ContextTooLarge,
            ProviderError::Api { .. } => ErrorKind::InferenceFailed,
            ProviderError::Parse(_) => ErrorKind::ParseFailed,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::InvalidRequest(_) => ErrorKind::InvalidArgument,
            ProviderError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            ProviderError::Other(_) => ErrorKind::InferenceFailed,
        };

        let mut err = Error::new(kind, self.to_string()).with_operation(operation);
        if let ProviderError::Api { status, .. } = &self {
            err = err.with_context("status", status.to_string());
        }
        if let ProviderError::RateLimited { retry_after: Some(secs) } = &self {
            err = err.with_context("retry_after_secs", secs.to_string());
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err = ProviderError::RateLimited { retry_after: Some(7) }.into_error("agent::generate");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.operation(), "agent::generate");
        assert!(err.context().iter().any(|(k, v)| *k == "retry_after_secs" && v == "7"));

        let err = ProviderError::Api { status: 529, message: "overloaded".into() }
            .into_error("agent::generate");
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.is_retryable());

        let err = ProviderError::AuthenticationFailed.into_error("agent::generate");
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(!err.is_retryable());
    }
}
