//! Error taxonomy for the sync engine.

use crate::store::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use zonesync_protocol::{RemoteError, RemoteErrorCode};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// The closed taxonomy of remote failures.
///
/// Every remote failure is mapped into exactly one kind; pipelines consult
/// the kind, never the raw wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The stored change token is too old; the scope needs a full resync.
    ChangeTokenExpired,
    /// A temporary condition; back off and retry.
    Temporary,
    /// The request was too large; shrink the batch and retry.
    RequestTooLarge,
    /// The network connection failed.
    ConnectionFailure,
    /// The user's cloud storage quota is exhausted.
    QuotaExceeded,
    /// A fatal service error; not retryable.
    Fatal,
    /// The user is not authenticated with the service.
    AuthenticationFailure,
    /// An unrecognized failure.
    Unknown,
}

impl ErrorKind {
    /// Maps a wire-level failure code into the taxonomy.
    ///
    /// This is the single decision point both pipelines rely on.
    pub fn classify(code: RemoteErrorCode) -> Self {
        match code {
            RemoteErrorCode::ChangeTokenExpired => ErrorKind::ChangeTokenExpired,
            RemoteErrorCode::RequestRateLimited
            | RemoteErrorCode::ZoneBusy
            | RemoteErrorCode::ServiceUnavailable => ErrorKind::Temporary,
            RemoteErrorCode::LimitExceeded => ErrorKind::RequestTooLarge,
            RemoteErrorCode::NetworkFailure
            | RemoteErrorCode::NetworkUnavailable
            | RemoteErrorCode::ServerResponseLost => ErrorKind::ConnectionFailure,
            RemoteErrorCode::InternalError
            | RemoteErrorCode::ServerRejectedRequest
            | RemoteErrorCode::InvalidArguments
            | RemoteErrorCode::PermissionFailure => ErrorKind::Fatal,
            RemoteErrorCode::QuotaExceeded => ErrorKind::QuotaExceeded,
            RemoteErrorCode::NotAuthenticated | RemoteErrorCode::AccountRestricted => {
                ErrorKind::AuthenticationFailure
            }
            RemoteErrorCode::Other => ErrorKind::Unknown,
        }
    }

    /// A short human-readable description, suitable for display or logging.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::ChangeTokenExpired => {
                "The local change cursor is too old and the data needs to be refetched."
            }
            ErrorKind::Temporary => "A temporary error occurred. Please try again later.",
            ErrorKind::RequestTooLarge => {
                "The request was too large; split it into smaller requests."
            }
            ErrorKind::ConnectionFailure => "There was a connection failure. Please try again later.",
            ErrorKind::QuotaExceeded => {
                "Your cloud storage is too small to save the data."
            }
            ErrorKind::Fatal => "A fatal service error occurred.",
            ErrorKind::AuthenticationFailure => {
                "Authentication failed. Make sure you are logged in with a valid account."
            }
            ErrorKind::Unknown => "An unknown error occurred. Please try again later.",
        }
    }

    /// Returns true if a caller should back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Temporary | ErrorKind::ConnectionFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors surfaced by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A classified remote service failure.
    #[error("{}", .kind.description())]
    Remote {
        /// Classified kind.
        kind: ErrorKind,
        /// The underlying wire failure.
        #[source]
        source: RemoteError,
    },

    /// The local store failed to apply or report changes.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The persisted sync state could not be read or written.
    #[error("state store error: {0}")]
    State(String),

    /// The operation was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A change scan kept reporting more pages past the configured ceiling.
    #[error("change scan did not terminate within {limit} pages")]
    PaginationCeiling {
        /// The configured page ceiling.
        limit: u32,
    },

    /// Push rounds kept finding records past the configured ceiling.
    #[error("push did not drain the hierarchy within {limit} rounds")]
    HierarchyCeiling {
        /// The configured round ceiling.
        limit: u32,
    },
}

impl SyncError {
    /// Classifies a remote failure into the taxonomy.
    pub fn remote(source: RemoteError) -> Self {
        Self::Remote {
            kind: ErrorKind::classify(source.code),
            source,
        }
    }

    /// Returns the classified kind for remote failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if a caller should back off and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), Some(kind) if kind.is_retryable())
    }

    /// The server's suggested retry delay, when it provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Remote { source, .. } => source.retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        use ErrorKind::*;
        use RemoteErrorCode as Code;

        let cases = [
            (Code::ChangeTokenExpired, ChangeTokenExpired),
            (Code::RequestRateLimited, Temporary),
            (Code::ZoneBusy, Temporary),
            (Code::ServiceUnavailable, Temporary),
            (Code::LimitExceeded, RequestTooLarge),
            (Code::NetworkFailure, ConnectionFailure),
            (Code::NetworkUnavailable, ConnectionFailure),
            (Code::ServerResponseLost, ConnectionFailure),
            (Code::InternalError, Fatal),
            (Code::ServerRejectedRequest, Fatal),
            (Code::InvalidArguments, Fatal),
            (Code::PermissionFailure, Fatal),
            (Code::QuotaExceeded, QuotaExceeded),
            (Code::NotAuthenticated, AuthenticationFailure),
            (Code::AccountRestricted, AuthenticationFailure),
            (Code::Other, Unknown),
        ];

        for (code, expected) in cases {
            assert_eq!(ErrorKind::classify(code), expected, "{code:?}");
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Temporary.is_retryable());
        assert!(ErrorKind::ConnectionFailure.is_retryable());
        assert!(!ErrorKind::ChangeTokenExpired.is_retryable());
        assert!(!ErrorKind::QuotaExceeded.is_retryable());
        assert!(!ErrorKind::Fatal.is_retryable());
    }

    #[test]
    fn remote_error_carries_kind_and_description() {
        let err = SyncError::remote(RemoteError::new(RemoteErrorCode::ZoneBusy, "zone is busy"));
        assert_eq!(err.kind(), Some(ErrorKind::Temporary));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), ErrorKind::Temporary.description());
    }

    #[test]
    fn retry_after_passes_through() {
        let err = SyncError::remote(
            RemoteError::new(RemoteErrorCode::RequestRateLimited, "slow down")
                .with_retry_after(Duration::from_secs(10)),
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(10)));
        assert_eq!(SyncError::Cancelled.retry_after(), None);
    }

    #[test]
    fn description_is_kind_derived() {
        // Two different wire codes of the same kind render identically.
        let a = SyncError::remote(RemoteError::new(RemoteErrorCode::NetworkFailure, "a"));
        let b = SyncError::remote(RemoteError::new(RemoteErrorCode::ServerResponseLost, "b"));
        assert_eq!(a.to_string(), b.to_string());
    }
}
