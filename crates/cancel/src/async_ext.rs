use crate::error::CancellationError;
use log::info;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Races a fallible future against a `CancellationToken`
///
/// Implemented for every `Send` future yielding `Result<T, E>`. The wrapped future
/// resolves to the inner result (error converted with `Into`) or, if the token fires
/// first, to `CancellationError` converted into the caller's error type.
///
/// ```rust
/// use sync_facade_cancel::{CancellationError, CancellationExt, CancellationToken};
///
/// #[derive(Debug, PartialEq)]
/// enum FetchError {
///     Cancelled,
///     Upstream(String),
/// }
///
/// impl From<CancellationError> for FetchError {
///     fn from(_: CancellationError) -> Self {
///         FetchError::Cancelled
///     }
/// }
///
/// # async fn fetch(id: u32) -> Result<u32, FetchError> { Ok(id * 10) }
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let value = fetch(4)
///     .with_cancellation::<FetchError>(&token, "fetch")
///     .await;
/// assert_eq!(value, Ok(40));
/// # }
/// ```
pub trait CancellationExt<T> {
    /// Error type produced by the wrapped future
    type OriginalError;

    /// Wraps the future so that cancelling `token` resolves it early
    ///
    /// `context` is only used for the log line emitted when cancellation wins.
    fn with_cancellation<'a, E>(
        self,
        token: &'a CancellationToken,
        context: &'a str,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        CancellationError: Into<E>,
        Self::OriginalError: Into<E>,
        Self: 'a;
}

#[allow(clippy::manual_async_fn)] // Complex lifetime bounds make async fn impractical here
impl<F, T, OriginalError> CancellationExt<T> for F
where
    F: Future<Output = Result<T, OriginalError>> + Send,
{
    type OriginalError = OriginalError;

    fn with_cancellation<'a, E>(
        self,
        token: &'a CancellationToken,
        context: &'a str,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        CancellationError: Into<E>,
        OriginalError: Into<E>,
        F: 'a,
    {
        async move {
            tokio::select! {
                // Prefer the token so an already-cancelled call never reports completion
                biased;
                _ = token.cancelled() => {
                    info!("{}: cancellation signal received", context);
                    Err(CancellationError.into())
                }
                result = self => result.map_err(Into::into),
            }
        }
    }
}
