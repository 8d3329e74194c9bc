use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Settings for one `SyncAdapter` instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Label used in logs and as the metrics `adapter` label
    pub name: String,
    /// Upper bound on how long `operation` blocks. `None` waits for the API or a cancel.
    /// When it elapses the adapter cancels the call itself and reports `TimedOut`.
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
    /// Where the winning canceller runs the API's cancel handle
    pub teardown: TeardownMode,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            wait_timeout: None,
            teardown: TeardownMode::Background,
        }
    }
}

impl AdapterConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Controls who pays for a slow `CancelHandle::cancel`.
///
/// The blocked caller is woken with `Cancelled` before teardown starts in both modes.
///
/// | Mode | `cancel_operation` returns |
/// |------|----------------------------|
/// | `Background` | right after winning the race; teardown runs on a detached thread |
/// | `Inline` | after the handle's `cancel` has returned |
///
/// `Inline` is an opt-in departure from the usual contract that a winning cancel
/// returns immediately; only pick it when the canceller must know teardown finished.
/// It never applies to a call that timed out, whose handle always runs detached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownMode {
    #[default]
    Background,
    Inline,
}

impl FromStr for TeardownMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "inline" => Ok(Self::Inline),
            _ => Err(()),
        }
    }
}
