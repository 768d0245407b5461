//! Wire-level failures reported by the remote service.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure codes the remote service reports.
///
/// These are the raw wire codes; pipelines never branch on them directly
/// and instead consult the engine's error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorCode {
    /// The request token is too old; the scope must be re-fetched from scratch.
    ChangeTokenExpired,
    /// The client is being rate limited.
    RequestRateLimited,
    /// The target zone is busy.
    ZoneBusy,
    /// The service is temporarily unavailable.
    ServiceUnavailable,
    /// The request exceeded the service's size limit.
    LimitExceeded,
    /// The network request failed mid-flight.
    NetworkFailure,
    /// No network connectivity.
    NetworkUnavailable,
    /// The response was lost before it arrived.
    ServerResponseLost,
    /// Internal service error.
    InternalError,
    /// The service rejected the request.
    ServerRejectedRequest,
    /// The request arguments were invalid.
    InvalidArguments,
    /// The user lacks permission for the operation.
    PermissionFailure,
    /// The user's storage quota is exhausted.
    QuotaExceeded,
    /// No authenticated user.
    NotAuthenticated,
    /// The account is restricted from using the service.
    AccountRestricted,
    /// Any code the client does not recognize.
    Other,
}

/// A failure returned by the remote service port.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("remote service failure ({code:?}): {message}")]
pub struct RemoteError {
    /// Wire-level failure code.
    pub code: RemoteErrorCode,
    /// Service-provided message, for logs.
    pub message: String,
    /// Server-suggested delay before retrying, when provided.
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    /// Creates a remote error.
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches the server's retry-after hint.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = RemoteError::new(RemoteErrorCode::ZoneBusy, "zone is busy");
        let rendered = err.to_string();
        assert!(rendered.contains("ZoneBusy"));
        assert!(rendered.contains("zone is busy"));
    }

    #[test]
    fn retry_after_hint() {
        let err = RemoteError::new(RemoteErrorCode::RequestRateLimited, "slow down")
            .with_retry_after(Duration::from_secs(30));
        assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
    }
}
