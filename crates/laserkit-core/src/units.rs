//! Unit conversions
//!
//! The wire protocol addresses the bed in mils (1/1000 inch). G-code
//! front ends work in millimetres or inches and convert on the way in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mils per millimetre
pub const MILS_PER_MM: f64 = 39.3701;

/// Mils per inch
pub const MILS_PER_INCH: f64 = 1000.0;

/// Convert millimetres to mils
pub fn mm_to_mils(mm: f64) -> f64 {
    mm * MILS_PER_MM
}

/// Convert mils to millimetres
pub fn mils_to_mm(mils: f64) -> f64 {
    mils / MILS_PER_MM
}

/// Convert inches to mils
pub fn inches_to_mils(inches: f64) -> f64 {
    inches * MILS_PER_INCH
}

/// Convert mils to inches
pub fn mils_to_inches(mils: f64) -> f64 {
    mils / MILS_PER_INCH
}

/// How g-code `F` words map to device speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedRateMode {
    /// `G94`: F is units per minute
    UnitsPerMinute,
    /// `G93`: F is an inverse-time divisor
    InverseTime,
}

impl FeedRateMode {
    /// Convert a g-code feed word to device speed
    ///
    /// `scale` is the active mils-per-unit factor. Non-positive inputs
    /// map to zero rather than dividing by zero.
    pub fn to_device_speed(&self, feed: f64, scale: f64) -> f64 {
        match self {
            FeedRateMode::UnitsPerMinute => feed / (scale * 60.0),
            FeedRateMode::InverseTime => {
                if feed <= 0.0 {
                    0.0
                } else {
                    (scale * 60.0) / feed
                }
            }
        }
    }

    /// Convert device speed back to a g-code feed word for status frames
    pub fn from_device_speed(&self, speed: f64, scale: f64) -> f64 {
        match self {
            FeedRateMode::UnitsPerMinute => speed * (scale * 60.0),
            FeedRateMode::InverseTime => {
                if speed <= 0.0 {
                    0.0
                } else {
                    (scale * 60.0) / speed
                }
            }
        }
    }
}

impl Default for FeedRateMode {
    fn default() -> Self {
        FeedRateMode::UnitsPerMinute
    }
}

impl fmt::Display for FeedRateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedRateMode::UnitsPerMinute => write!(f, "units/min"),
            FeedRateMode::InverseTime => write!(f, "inverse-time"),
        }
    }
}
