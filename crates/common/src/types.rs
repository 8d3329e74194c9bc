use crate::error::OperationError;
use serde::{Deserialize, Serialize};
use sync_facade_cancel::CancellationError;

/// Identifier of one admitted call, unique per adapter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(u64);

impl CallId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Terminal result of a pending call. Exactly one is produced per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Success(T),
    Failure(E),
    Cancelled,
}

/// Payload-free view of an [`Outcome`], used for logging and stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Succeeded,
            Self::Failure(_) => OutcomeKind::Failed,
            Self::Cancelled => OutcomeKind::Cancelled,
        }
    }

    /// Maps the outcome onto what the blocked caller receives
    pub fn into_result(self) -> Result<T, OperationError<E>> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(err) => Err(OperationError::Domain(err)),
            Self::Cancelled => Err(CancellationError.into()),
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Point-in-time counters for one adapter instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub name: String,
    pub admitted: u64,
    pub rejected_busy: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub internal_faults: u64,
    pub cancel_requests: u64,
    pub cancel_granted: u64,
    pub in_flight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_result() {
        let ok: Outcome<i32, std::io::Error> = Outcome::Success(10);
        assert_eq!(ok.into_result().unwrap(), 10);

        let failed: Outcome<i32, std::io::Error> =
            Outcome::Failure(std::io::Error::other("backend down"));
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.domain().map(|e| e.to_string()).as_deref(), Some("backend down"));

        let cancelled: Outcome<i32, std::io::Error> = Outcome::Cancelled;
        assert!(cancelled.into_result().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_outcome_kind() {
        assert_eq!(Outcome::<i32, ()>::Success(1).kind(), OutcomeKind::Succeeded);
        assert_eq!(Outcome::<i32, ()>::Failure(()).kind(), OutcomeKind::Failed);
        assert_eq!(Outcome::<i32, ()>::Cancelled.kind().to_string(), "cancelled");
    }

    #[test]
    fn test_stats_serialize() {
        let stats = AdapterStats {
            name: "demo".to_string(),
            admitted: 2,
            succeeded: 1,
            cancelled: 1,
            ..Default::default()
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["name"], "demo");
        assert_eq!(json["admitted"], 2);
        assert_eq!(json["in_flight"], false);
    }
}
