//! GRBL protocol errors
//!
//! Reported in-band as `error:<code>` lines. A protocol error never
//! tears down the session; the emulator answers and keeps reading.

use laserkit_core::error::{CommandError, SpoolerError};
use thiserror::Error;

/// Errors answered on the GRBL wire
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrblError {
    /// A numeric word failed to parse or was out of range
    #[error("Bad number format")]
    BadNumberFormat,

    /// An unsupported `$` system command
    #[error("Invalid statement")]
    InvalidStatement,

    /// The pipeline refused the command
    #[error("G-code locked out")]
    LockedOut,

    /// A G or M word outside the supported dialect
    #[error("Unsupported command")]
    UnsupportedCommand,
}

impl GrblError {
    /// Numeric code used on the wire
    pub fn code(&self) -> u8 {
        match self {
            GrblError::BadNumberFormat => 2,
            GrblError::InvalidStatement => 3,
            GrblError::LockedOut => 9,
            GrblError::UnsupportedCommand => 20,
        }
    }
}

impl From<CommandError> for GrblError {
    fn from(_: CommandError) -> Self {
        GrblError::BadNumberFormat
    }
}

impl From<SpoolerError> for GrblError {
    fn from(err: SpoolerError) -> Self {
        match err {
            SpoolerError::QueueClosed => GrblError::LockedOut,
            SpoolerError::Command(_) => GrblError::BadNumberFormat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(GrblError::BadNumberFormat.code(), 2);
        assert_eq!(GrblError::InvalidStatement.code(), 3);
        assert_eq!(GrblError::LockedOut.code(), 9);
        assert_eq!(GrblError::UnsupportedCommand.code(), 20);
    }

    #[test]
    fn test_pipeline_error_mapping() {
        assert_eq!(GrblError::from(SpoolerError::QueueClosed), GrblError::LockedOut);
        let invalid = CommandError::InvalidPayload {
            kind: "SetPower",
            reason: "level 1500 outside 0..=1000".to_string(),
        };
        assert_eq!(GrblError::from(invalid), GrblError::BadNumberFormat);
    }
}
