//! Charger status classification
//!
//! Maps a charger's `operational`, `charging` and `assigned` flags onto the
//! status and label shown on consoles and dashboards. First match wins:
//!
//! | operational | charging | assigned | status | label |
//! |---|---|---|---|---|
//! | false | * | * | NeedsService | `needs service` |
//! | true | true | * | InUse | `{car} is charging` |
//! | true | false | true | InUse | `{car} is assigned` |
//! | true | false | false | Available | `Available` |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Charger;

/// Placeholder shown when an occupied charger carries no car id
pub const UNKNOWN_CAR: &str = "unknown car";

/// User-facing charger status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargerStatus {
    Available,
    InUse,
    NeedsService,
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerStatus::Available => write!(f, "available"),
            ChargerStatus::InUse => write!(f, "in use"),
            ChargerStatus::NeedsService => write!(f, "needs service"),
        }
    }
}

/// Status plus the label to display for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: ChargerStatus,
    pub label: String,
}

/// Classify a charger for display
pub fn classify(charger: &Charger) -> Classification {
    // Out of service hides the car id even when one is present
    if !charger.operational {
        return Classification {
            status: ChargerStatus::NeedsService,
            label: "needs service".to_string(),
        };
    }

    let car = charger.active_car_id().unwrap_or(UNKNOWN_CAR);

    if charger.charging {
        return Classification {
            status: ChargerStatus::InUse,
            label: format!("{car} is charging"),
        };
    }

    if charger.assigned {
        return Classification {
            status: ChargerStatus::InUse,
            label: format!("{car} is assigned"),
        };
    }

    Classification {
        status: ChargerStatus::Available,
        label: "Available".to_string(),
    }
}
