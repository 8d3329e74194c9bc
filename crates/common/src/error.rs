use crate::types::CallId;
use std::time::Duration;
use sync_facade_cancel::CancellationError;
use thiserror::Error;

/// Everything `SyncAdapter::operation` can fail with
///
/// `E` is the wrapped API's own error type. It is kept as-is in [`Domain`] so callers
/// can match on it directly, and it is never confused with [`Cancelled`].
///
/// [`Domain`]: OperationError::Domain
/// [`Cancelled`]: OperationError::Cancelled
#[derive(Debug, Error)]
pub enum OperationError<E> {
    /// Another operation is in flight; nothing was started
    #[error("another operation is already in flight")]
    Busy,

    /// The wrapped API reported a failure
    #[error(transparent)]
    Domain(E),

    /// A `cancel_operation` call won the race against completion
    #[error(transparent)]
    Cancelled(#[from] CancellationError),

    /// The configured wait timeout elapsed before the call resolved
    #[error("{call} timed out after {after:?}")]
    TimedOut { call: CallId, after: Duration },

    /// The adapter reached a state its invariants rule out. This is a bug.
    #[error("internal fault on {call}: {reason}")]
    Internal { call: CallId, reason: String },
}

impl<E> OperationError<E> {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// The wrapped API's error, if that is what this is
    pub fn domain(&self) -> Option<&E> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_domain(self) -> Option<E> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Error)]
    #[error("quota exceeded for {0}")]
    struct QuotaError(&'static str);

    #[test]
    fn test_domain_error_is_transparent() {
        let err: OperationError<QuotaError> = OperationError::Domain(QuotaError("alice"));

        assert_eq!(err.to_string(), "quota exceeded for alice");
        assert_eq!(err.domain(), Some(&QuotaError("alice")));
        assert!(!err.is_cancelled());
        assert_eq!(err.into_domain(), Some(QuotaError("alice")));
    }

    #[test]
    fn test_cancelled_converts_from_cancellation_error() {
        let err: OperationError<QuotaError> = CancellationError.into();

        assert!(err.is_cancelled());
        assert!(err.domain().is_none());
        assert_eq!(err.to_string(), "Operation was cancelled");
    }

    #[test]
    fn test_busy_and_internal_messages() {
        let busy: OperationError<QuotaError> = OperationError::Busy;
        assert!(busy.is_busy());
        assert_eq!(busy.to_string(), "another operation is already in flight");

        let internal: OperationError<QuotaError> = OperationError::Internal {
            call: CallId::new(4),
            reason: "woke without an outcome".to_string(),
        };
        assert!(internal.is_internal());
        assert_eq!(
            internal.to_string(),
            "internal fault on call#4: woke without an outcome"
        );
    }
}
