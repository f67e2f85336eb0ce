use serde::{Deserialize, Serialize};
use std::fmt;

/// Five autonomy levels, inspired by autonomous driving:
///
/// - **L0 (Manual)**: Every tool call is held for human approval.
/// - **L1 (Assisted)**: Routine calls pass, anything the hold gate flags waits for review.
/// - **L2 (Supervised)**: The default for new agents.
/// - **L3 (Autonomous)**: Earned through a clean streak.
/// - **L4 (Full Auto)**: Only reachable when `trust.max_level` allows it.
///
/// Agents move down one level each time their circuit opens and up one level after
/// `trust.promotion_streak` clean executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AutonomyLevel {
    Manual = 0,
    Assisted = 1,
    Supervised = 2,
    Autonomous = 3,
    FullAuto = 4,
}

impl AutonomyLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Manual,
            1 => Self::Assisted,
            2 => Self::Supervised,
            3 => Self::Autonomous,
            4 => Self::FullAuto,
            _ => Self::Assisted, // safe default
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this level allows any action without a human decision.
    pub fn allows_autonomous_action(&self) -> bool {
        *self >= Self::Assisted
    }

    /// One level down, saturating at Manual.
    pub fn demoted(self) -> Self {
        Self::from_u8(self.as_u8().saturating_sub(1))
    }

    /// One level up, capped at `ceiling`.
    pub fn promoted(self, ceiling: Self) -> Self {
        if self >= ceiling {
            return self;
        }
        Self::from_u8(self.as_u8() + 1)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Manual => "Every action requires approval",
            Self::Assisted => "Routine actions pass, flagged actions need approval",
            Self::Supervised => "Acts freely under drift and hold supervision",
            Self::Autonomous => "Trusted after a sustained clean record",
            Self::FullAuto => "Fully self-directed within configured bounds",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} ({})", *self as u8, match self {
            Self::Manual => "Manual",
            Self::Assisted => "Assisted",
            Self::Supervised => "Supervised",
            Self::Autonomous => "Autonomous",
            Self::FullAuto => "Full Auto",
        })
    }
}
