//! Bin status thresholds

use crate::models::BinStatus;

pub const HAZARD_GAS_LEVEL: f64 = 4.0;
pub const HAZARD_FILL_LEVEL: f64 = 95.0;
pub const FULL_FILL_LEVEL: f64 = 80.0;
pub const EMPTY_FILL_LEVEL: f64 = 20.0;

/// Derive a bin's status from its sensor readings. Hazard wins over every other status.
pub fn classify(fill_level: f64, gas_level: f64) -> BinStatus {
    if gas_level >= HAZARD_GAS_LEVEL || fill_level >= HAZARD_FILL_LEVEL {
        BinStatus::Hazard
    } else if fill_level >= FULL_FILL_LEVEL {
        BinStatus::Full
    } else if fill_level <= EMPTY_FILL_LEVEL {
        BinStatus::Empty
    } else {
        BinStatus::Normal
    }
}
