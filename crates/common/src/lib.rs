pub mod api;
pub mod config;
pub mod error;
pub mod types;

pub use api::{cancel_fn, AsyncApi, Callback, CancelFn, CancelHandle, NoopCancel};
pub use config::*;
pub use error::OperationError;
pub use types::*;
