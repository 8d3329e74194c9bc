/// Marker error reporting that a piece of work stopped because it was cancelled
///
/// Providers return it from cooperative checks, and the adapter surfaces it to a
/// blocked caller whose in-flight operation lost the race to a cancellation request.
/// Any error type that wants to carry a cancellation can do so via `From`.
///
/// # Examples
///
/// ```rust
/// use sync_facade_cancel::CancellationError;
///
/// #[derive(Debug)]
/// enum JobError {
///     Cancelled,
///     Io(String),
/// }
///
/// impl From<CancellationError> for JobError {
///     fn from(_: CancellationError) -> Self {
///         JobError::Cancelled
///     }
/// }
///
/// let err: JobError = CancellationError.into();
/// assert!(matches!(err, JobError::Cancelled));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CancellationError;

impl std::fmt::Display for CancellationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancellationError {}
