mod adapter;
mod gate;
mod metrics;
mod pending;

pub mod providers;

pub use adapter::SyncAdapter;
pub use gate::{AdmissionGate, AdmissionGuard};
pub use metrics::Metrics;
pub use pending::{CallState, PendingCall, Teardown, WaitError};
