//! # sync-facade
//!
//! Blocking, sequential access to an asynchronous, callback-based operation API.
//! One call runs at a time; overlapping callers are rejected instead of queued, and
//! any thread can cancel the call in flight.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sync_facade::prelude::*;
//!
//! #[derive(Debug, thiserror::Error)]
//! enum LookupError {
//!     #[error("lookup cancelled")]
//!     Cancelled,
//!     #[error("unknown key {0}")]
//!     Unknown(i32),
//! }
//!
//! impl From<CancellationError> for LookupError {
//!     fn from(_: CancellationError) -> Self {
//!         LookupError::Cancelled
//!     }
//! }
//!
//! // 1. Wrap the callback API (here: a blocking job on its own thread)
//! let api = ThreadApi::new("lookup", |key: i32, token: &CancellationToken| {
//!     sleep_with_cancellation(token, Duration::from_secs(2), Duration::from_millis(10), "lookup")?;
//!     if key < 0 { Err(LookupError::Unknown(key)) } else { Ok(key * 10) }
//! });
//!
//! // 2. Build the adapter
//! let adapter = Arc::new(SyncAdapter::new(api, AdapterConfig::named("lookup")));
//!
//! // 3. Call it like a plain function; cancel from anywhere
//! let worker = {
//!     let adapter = adapter.clone();
//!     std::thread::spawn(move || adapter.operation(1))
//! };
//! std::thread::sleep(Duration::from_millis(100));
//! assert!(adapter.operation(2).unwrap_err().is_busy());
//! assert!(adapter.cancel_operation());
//! assert!(worker.join().unwrap().unwrap_err().is_cancelled());
//! ```
//!
//! ## Architecture
//!
//! - **Common**: the `AsyncApi` contract, configuration, outcome and error types
//! - **Adapter**: admission gate, pending call, `SyncAdapter`, metrics, providers
//! - **Cancel**: token helpers providers use to actually stop work

/// Re-export of the API contract, configuration and error types
pub use sync_facade_common as common;

/// Re-export of the adapter and built-in providers
pub use sync_facade_adapter as adapter;

/// Re-export of the cancellation helpers
pub use sync_facade_cancel as cancel;

/// Convenient re-exports of commonly used types
pub mod prelude {
    // API contract
    pub use crate::common::{cancel_fn, AsyncApi, Callback, CancelFn, CancelHandle, NoopCancel};

    // Configuration, outcomes and errors
    pub use crate::common::{
        AdapterConfig, AdapterStats, CallId, OperationError, Outcome, OutcomeKind, TeardownMode,
    };

    // Adapter
    pub use crate::adapter::{Metrics, SyncAdapter};

    // Built-in providers
    pub use crate::adapter::providers::{ThreadApi, TokenCancel, TokioApi};

    // Cancellation helpers
    pub use crate::cancel::{
        check_cancellation, sleep_with_cancellation, CancellationError, CancellationExt,
        CancellationToken,
    };
}
