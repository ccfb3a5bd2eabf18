//! Device lifecycle state as reported by the lifecycle controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Device-wide manufacturing/security stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Raw,
    TestUnlocked(u8),
    TestLocked(u8),
    Dev,
    Prod,
    ProdEnd,
    Rma,
    Scrap,
    /// Encoding the controller could not map to a known state
    Invalid,
}

impl LifecycleState {
    /// States in which personalization may run.
    pub const PERSONALIZABLE: [LifecycleState; 3] =
        [LifecycleState::Dev, LifecycleState::Prod, LifecycleState::ProdEnd];

    pub fn is_personalizable(&self) -> bool {
        Self::PERSONALIZABLE.contains(self)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Raw => write!(f, "RAW"),
            LifecycleState::TestUnlocked(n) => write!(f, "TEST_UNLOCKED{}", n),
            LifecycleState::TestLocked(n) => write!(f, "TEST_LOCKED{}", n),
            LifecycleState::Dev => write!(f, "DEV"),
            LifecycleState::Prod => write!(f, "PROD"),
            LifecycleState::ProdEnd => write!(f, "PROD_END"),
            LifecycleState::Rma => write!(f, "RMA"),
            LifecycleState::Scrap => write!(f, "SCRAP"),
            LifecycleState::Invalid => write!(f, "INVALID"),
        }
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        let state = match upper.as_str() {
            "RAW" => LifecycleState::Raw,
            "DEV" => LifecycleState::Dev,
            "PROD" => LifecycleState::Prod,
            "PROD_END" => LifecycleState::ProdEnd,
            "RMA" => LifecycleState::Rma,
            "SCRAP" => LifecycleState::Scrap,
            "INVALID" => LifecycleState::Invalid,
            other => {
                let (unlocked, index) = if let Some(n) = other.strip_prefix("TEST_UNLOCKED") {
                    (true, n)
                } else if let Some(n) = other.strip_prefix("TEST_LOCKED") {
                    (false, n)
                } else {
                    return Err(format!("unknown lifecycle state '{}'", s));
                };
                let index: u8 = index
                    .parse()
                    .map_err(|_| format!("bad test state index in '{}'", s))?;
                if unlocked {
                    LifecycleState::TestUnlocked(index)
                } else {
                    LifecycleState::TestLocked(index)
                }
            }
        };
        Ok(state)
    }
}

/// Lifecycle controller failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("lifecycle state read failed: {0}")]
    ReadFailed(String),
}

/// Read access to the lifecycle controller.
pub trait LifecycleController {
    fn read_state(&self) -> Result<LifecycleState, LifecycleError>;
}
