//! # sync-facade cancellation helpers
//!
//! Small building blocks used by the `AsyncApi` providers that ship with
//! sync-facade. The adapter only ever talks to a provider through a cancel handle;
//! these helpers are how a provider turns that handle into actually stopping work.
//!
//! - [`CancellationExt::with_cancellation`] for futures running on a Tokio runtime
//! - [`check_cancellation`] and [`sleep_with_cancellation`] for blocking jobs on
//!   plain threads
//! - [`CancellationError`], the error both report and the adapter surfaces as
//!   `OperationError::Cancelled`
//!
//! ```rust
//! use sync_facade_cancel::{check_cancellation, CancellationError, CancellationToken};
//!
//! fn poll_until_done(token: &CancellationToken, mut steps: u32) -> Result<(), CancellationError> {
//!     while steps > 0 {
//!         check_cancellation(token, "poll_until_done")?;
//!         steps -= 1;
//!     }
//!     Ok(())
//! }
//!
//! let token = CancellationToken::new();
//! assert!(poll_until_done(&token, 3).is_ok());
//! ```

mod async_ext;
mod error;
mod sync_ext;

pub use async_ext::CancellationExt;
pub use error::CancellationError;
pub use sync_ext::{check_cancellation, sleep_with_cancellation};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
