//! Error types for LaserKit
//!
//! Error handling for every pipeline layer:
//! - Command construction and validation
//! - Device channels (USB serial, loopback)
//! - Interpreter emission and interrupted waits
//! - Spooler queue lifecycle
//! - Typed settings registry

use thiserror::Error;

/// Errors raised while constructing or validating commands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Payload failed validation at construction time
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Command kind that rejected the payload
        kind: &'static str,
        /// What was wrong with the payload
        reason: String,
    },

    /// A realtime command was pushed onto the ordered queue
    #[error("{kind} is realtime and bypasses the queue")]
    RealtimeOnly {
        /// Command kind that was misrouted
        kind: &'static str,
    },

    /// A queued command was submitted through the realtime path
    #[error("{kind} is not a realtime command")]
    NotRealtime {
        /// Command kind that was misrouted
        kind: &'static str,
    },
}

/// Errors raised by device channels
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// The channel is not open
    #[error("Channel {name} is closed")]
    Closed {
        /// Channel name
        name: String,
    },

    /// Opening the underlying device failed
    #[error("Failed to open {name}: {reason}")]
    OpenFailed {
        /// Channel name
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// The device refused a write
    #[error("Write rejected by {name}: {reason}")]
    Rejected {
        /// Channel name
        name: String,
        /// Reason for rejection
        reason: String,
    },

    /// An I/O error occurred on the wire
    #[error("I/O error on {name}: {reason}")]
    Io {
        /// Channel name
        name: String,
        /// Underlying error text
        reason: String,
    },
}

impl ChannelError {
    /// Check if this error means the channel cannot accept further writes
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed { .. })
    }
}

/// Errors raised while the interpreter emits device code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpreterError {
    /// The device channel failed underneath the interpreter
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A blocking wait was abandoned by a concurrent reset
    #[error("Wait for {condition} interrupted by reset")]
    Interrupted {
        /// What the interpreter was waiting on
        condition: &'static str,
    },
}

impl InterpreterError {
    /// Check if the underlying channel is closed
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, InterpreterError::Channel(e) if e.is_closed())
    }

    /// Check if this error is an interrupted wait rather than a failure
    pub fn is_interrupted(&self) -> bool {
        matches!(self, InterpreterError::Interrupted { .. })
    }
}

/// Errors raised by the spooler queue
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpoolerError {
    /// The queue has shut down and accepts no further work
    #[error("Spooler queue is closed")]
    QueueClosed,

    /// A command failed validation on its way into the queue
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors raised by the typed settings registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// No setting registered under this name
    #[error("Unknown setting: {name}")]
    UnknownSetting {
        /// Requested setting name
        name: String,
    },

    /// The raw value could not be parsed as the declared type
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Setting name
        name: String,
        /// What was wrong with the value
        reason: String,
    },
}

/// Top-level error type for LaserKit
#[derive(Error, Debug)]
pub enum Error {
    /// Command construction error
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Device channel error
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Interpreter error
    #[error(transparent)]
    Interpreter(#[from] InterpreterError),

    /// Spooler error
    #[error(transparent)]
    Spooler(#[from] SpoolerError),

    /// Settings registry error
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for anything else
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a command error
    pub fn is_command_error(&self) -> bool {
        matches!(self, Error::Command(_))
    }

    /// Check if this is a channel error
    pub fn is_channel_error(&self) -> bool {
        matches!(self, Error::Channel(_))
    }

    /// Check if this is an interpreter error
    pub fn is_interpreter_error(&self) -> bool {
        matches!(self, Error::Interpreter(_))
    }

    /// Check if this is a spooler error
    pub fn is_spooler_error(&self) -> bool {
        matches!(self, Error::Spooler(_))
    }
}

/// Result type alias using the LaserKit error type
pub type Result<T> = std::result::Result<T, Error>;
