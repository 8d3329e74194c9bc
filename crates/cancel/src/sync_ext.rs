use crate::error::CancellationError;
use log::info;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Returns `Err(CancellationError)` once `token` has been cancelled
///
/// Meant for blocking code running on a provider thread: call it between units of
/// work so a cancellation request stops the loop at the next checkpoint.
///
/// * `token` - the token handed to the blocking job
/// * `context` - label included in the log line when cancellation is observed
///
/// ```rust
/// use sync_facade_cancel::{check_cancellation, CancellationError, CancellationToken};
///
/// fn sum_slowly(token: &CancellationToken, items: &[i32]) -> Result<i32, CancellationError> {
///     let mut total = 0;
///     for item in items {
///         check_cancellation(token, "sum_slowly")?;
///         total += item;
///     }
///     Ok(total)
/// }
///
/// let token = CancellationToken::new();
/// assert_eq!(sum_slowly(&token, &[1, 2, 3]), Ok(6));
/// token.cancel();
/// assert_eq!(sum_slowly(&token, &[1, 2, 3]), Err(CancellationError));
/// ```
pub fn check_cancellation(
    token: &CancellationToken,
    context: &str,
) -> Result<(), CancellationError> {
    if token.is_cancelled() {
        info!("{}: cancellation detected", context);
        Err(CancellationError)
    } else {
        Ok(())
    }
}

/// Sleeps for `total` in slices of at most `step`, checking `token` between slices
///
/// Lets a blocking provider job simulate (or genuinely wait out) a long delay while
/// still reacting to cancellation within roughly one `step`.
pub fn sleep_with_cancellation(
    token: &CancellationToken,
    total: Duration,
    step: Duration,
    context: &str,
) -> Result<(), CancellationError> {
    let step = if step.is_zero() {
        Duration::from_millis(1)
    } else {
        step
    };
    let mut remaining = total;

    while !remaining.is_zero() {
        check_cancellation(token, context)?;
        let slice = remaining.min(step);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }

    check_cancellation(token, context)
}
