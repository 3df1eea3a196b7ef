//! `$` settings table
//!
//! In-memory session copy of the GRBL settings a sender expects to read
//! and write. Values keep their declared type: assignments parse as the
//! type the table declares for that number, and dump lines format `%d`
//! for integers, `%.3f` for floats.

use crate::error::GrblError;
use std::collections::BTreeMap;
use std::fmt;

/// One typed setting value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrblSettingValue {
    /// Integer setting, dumped as `%d`
    Int(i64),
    /// Float setting, dumped as `%.3f`
    Float(f64),
}

impl fmt::Display for GrblSettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrblSettingValue::Int(v) => write!(f, "{}", v),
            GrblSettingValue::Float(v) => write!(f, "{:.3}", v),
        }
    }
}

/// Session settings map, keyed by setting number
#[derive(Debug, Clone, PartialEq)]
pub struct GrblSettings {
    values: BTreeMap<u16, GrblSettingValue>,
}

impl Default for GrblSettings {
    fn default() -> Self {
        use GrblSettingValue::{Float, Int};
        let defaults = [
            (0, Int(10)),
            (1, Int(25)),
            (2, Int(0)),
            (3, Int(0)),
            (4, Int(0)),
            (5, Int(0)),
            (6, Int(0)),
            (10, Int(255)),
            (11, Float(0.010)),
            (12, Float(0.002)),
            (13, Int(0)),
            (20, Int(0)),
            (21, Int(0)),
            (22, Int(0)),
            (23, Int(0)),
            (24, Float(25.0)),
            (25, Float(500.0)),
            (26, Int(250)),
            (27, Float(1.0)),
            (30, Int(1000)),
            (31, Int(0)),
            (32, Int(1)),
            (100, Float(250.0)),
            (101, Float(250.0)),
            (102, Float(250.0)),
            (110, Float(500.0)),
            (111, Float(500.0)),
            (112, Float(500.0)),
            (120, Float(10.0)),
            (121, Float(10.0)),
            (122, Float(10.0)),
            (130, Float(200.0)),
            (131, Float(200.0)),
            (132, Float(200.0)),
        ];
        GrblSettings {
            values: defaults.into_iter().collect(),
        }
    }
}

impl GrblSettings {
    /// Look up a setting by number
    pub fn get(&self, number: u16) -> Option<&GrblSettingValue> {
        self.values.get(&number)
    }

    /// Assign a setting from its raw text, keeping the declared type
    ///
    /// Unknown numbers answer error 3; values that fail to parse as the
    /// declared type answer error 2. The table is never left half
    /// updated.
    pub fn set_parsed(&mut self, number: u16, raw: &str) -> Result<(), GrblError> {
        let slot = self
            .values
            .get_mut(&number)
            .ok_or(GrblError::InvalidStatement)?;
        *slot = match slot {
            GrblSettingValue::Int(_) => GrblSettingValue::Int(
                raw.trim().parse().map_err(|_| GrblError::BadNumberFormat)?,
            ),
            GrblSettingValue::Float(_) => GrblSettingValue::Float(
                raw.trim().parse().map_err(|_| GrblError::BadNumberFormat)?,
            ),
        };
        Ok(())
    }

    /// All settings in ascending numeric order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &GrblSettingValue)> + '_ {
        self.values.iter().map(|(number, value)| (*number, value))
    }

    /// Number of settings in the table
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
