//! Device command vocabulary
//!
//! The pipeline speaks a closed set of device-neutral commands:
//! - Motion (`Move`, `RapidMove`, `Home`)
//! - Laser and parameter state (`LaserOn`, `LaserOff`, `SetSpeed`, `SetPower`)
//! - Coordinate and driver modes
//! - Waits and out-of-band signals
//! - Realtime control (`Reset`, `Pause`, `Resume`)
//!
//! Commands validate their payloads at construction time, so anything that
//! reaches the interpreter is already well formed.

use crate::data::StatusSnapshot;
use crate::error::{CommandError, SpoolerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Typed payload carried by a `Signal` command and by status signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    /// Integer payload
    Int(i64),
    /// Floating point payload
    Float(f64),
    /// Text payload
    Str(String),
    /// Boolean payload
    Bool(bool),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Int(v) => write!(f, "{}", v),
            SignalValue::Float(v) => write!(f, "{}", v),
            SignalValue::Str(v) => write!(f, "{}", v),
            SignalValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Float(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Str(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::Str(v)
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<usize> for SignalValue {
    fn from(v: usize) -> Self {
        SignalValue::Int(v as i64)
    }
}

/// One device-neutral pipeline command
///
/// Coordinates are in mils (1/1000 inch). Power is a level in `0..=1000`,
/// except that values in `(0, 1]` are treated as fractions of full power
/// and rescaled by the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Move to (or by) the given coordinates in the current driver mode
    Move {
        /// Target or delta X in mils
        x: f64,
        /// Target or delta Y in mils
        y: f64,
    },
    /// Move with the laser forced off and the driver in default mode
    RapidMove {
        /// Target or delta X in mils
        x: f64,
        /// Target or delta Y in mils
        y: f64,
    },
    /// Energize the laser
    LaserOn,
    /// De-energize the laser
    LaserOff,
    /// Set the cutting speed in board speed units
    SetSpeed {
        /// Speed in board units (millimetres per second on M2-family boards)
        rate: f64,
    },
    /// Set the laser power level
    SetPower {
        /// Level in `0..=1000`, with `(0, 1]` read as a fraction
        level: f64,
    },
    /// Interpret subsequent coordinates as absolute positions
    SetAbsolute,
    /// Interpret subsequent coordinates as deltas
    SetIncremental,
    /// Ensure the driver is in default (rapid) mode
    ModeDefault,
    /// Ensure default mode and clear laser flag and direction latches
    ModeDefaultSet,
    /// Ensure the driver is in compact (program) mode
    ModeCompactSet,
    /// Home the rails and zero the tracked position
    Home,
    /// Hold dispatch for a duration
    Wait {
        /// Seconds to hold
        seconds: f64,
    },
    /// Hold dispatch until the device buffer drains to empty
    WaitBufferEmpty,
    /// Publish a named out-of-band signal to event subscribers
    Signal {
        /// Signal name
        name: String,
        /// Signal payload
        value: SignalValue,
    },
    /// Realtime: clear pending work and return the driver to a known state
    Reset,
    /// Realtime: hold dispatch and pause the device
    Pause,
    /// Realtime: resume dispatch after a pause
    Resume,
}

impl Command {
    /// Build a validated `Move`
    pub fn move_to(x: f64, y: f64) -> Result<Self, CommandError> {
        check_finite("Move", "x", x)?;
        check_finite("Move", "y", y)?;
        Ok(Command::Move { x, y })
    }

    /// Build a validated `RapidMove`
    pub fn rapid_move(x: f64, y: f64) -> Result<Self, CommandError> {
        check_finite("RapidMove", "x", x)?;
        check_finite("RapidMove", "y", y)?;
        Ok(Command::RapidMove { x, y })
    }

    /// Build a validated `SetSpeed`
    pub fn set_speed(rate: f64) -> Result<Self, CommandError> {
        check_finite("SetSpeed", "rate", rate)?;
        if rate < 0.0 {
            return Err(CommandError::InvalidPayload {
                kind: "SetSpeed",
                reason: format!("rate {} is negative", rate),
            });
        }
        Ok(Command::SetSpeed { rate })
    }

    /// Build a validated `SetPower`
    pub fn set_power(level: f64) -> Result<Self, CommandError> {
        check_finite("SetPower", "level", level)?;
        if !(0.0..=1000.0).contains(&level) {
            return Err(CommandError::InvalidPayload {
                kind: "SetPower",
                reason: format!("level {} outside 0..=1000", level),
            });
        }
        Ok(Command::SetPower { level })
    }

    /// Build a validated `Wait`
    pub fn wait(seconds: f64) -> Result<Self, CommandError> {
        check_finite("Wait", "seconds", seconds)?;
        if seconds < 0.0 {
            return Err(CommandError::InvalidPayload {
                kind: "Wait",
                reason: format!("duration {} is negative", seconds),
            });
        }
        Ok(Command::Wait { seconds })
    }

    /// Build a validated `Signal`
    pub fn signal(
        name: impl Into<String>,
        value: impl Into<SignalValue>,
    ) -> Result<Self, CommandError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CommandError::InvalidPayload {
                kind: "Signal",
                reason: "signal name is empty".to_string(),
            });
        }
        Ok(Command::Signal {
            name,
            value: value.into(),
        })
    }

    /// Short name for logs, events, and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move { .. } => "Move",
            Command::RapidMove { .. } => "RapidMove",
            Command::LaserOn => "LaserOn",
            Command::LaserOff => "LaserOff",
            Command::SetSpeed { .. } => "SetSpeed",
            Command::SetPower { .. } => "SetPower",
            Command::SetAbsolute => "SetAbsolute",
            Command::SetIncremental => "SetIncremental",
            Command::ModeDefault => "ModeDefault",
            Command::ModeDefaultSet => "ModeDefaultSet",
            Command::ModeCompactSet => "ModeCompactSet",
            Command::Home => "Home",
            Command::Wait { .. } => "Wait",
            Command::WaitBufferEmpty => "WaitBufferEmpty",
            Command::Signal { .. } => "Signal",
            Command::Reset => "Reset",
            Command::Pause => "Pause",
            Command::Resume => "Resume",
        }
    }

    /// Whether this command bypasses the ordered queue
    pub fn is_realtime(&self) -> bool {
        matches!(self, Command::Reset | Command::Pause | Command::Resume)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move { x, y } => write!(f, "Move({}, {})", x, y),
            Command::RapidMove { x, y } => write!(f, "RapidMove({}, {})", x, y),
            Command::SetSpeed { rate } => write!(f, "SetSpeed({})", rate),
            Command::SetPower { level } => write!(f, "SetPower({})", level),
            Command::Wait { seconds } => write!(f, "Wait({}s)", seconds),
            Command::Signal { name, value } => write!(f, "Signal({}={})", name, value),
            other => write!(f, "{}", other.kind()),
        }
    }
}

fn check_finite(kind: &'static str, field: &str, value: f64) -> Result<(), CommandError> {
    if value.is_finite() {
        return Ok(());
    }
    Err(CommandError::InvalidPayload {
        kind,
        reason: format!("{} must be finite, got {}", field, value),
    })
}

/// Unique identifier for a spooled program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered batch of queued commands submitted as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    id: JobId,
    label: String,
    commands: Vec<Command>,
}

impl Program {
    /// Create an empty program with a human-readable label
    pub fn new(label: impl Into<String>) -> Self {
        Program {
            id: JobId::new(),
            label: label.into(),
            commands: Vec::new(),
        }
    }

    /// Create a program from a prepared command list
    ///
    /// Fails if any command is realtime; realtime commands never queue.
    pub fn with_commands(
        label: impl Into<String>,
        commands: Vec<Command>,
    ) -> Result<Self, CommandError> {
        let mut program = Program::new(label);
        for command in commands {
            program.push(command)?;
        }
        Ok(program)
    }

    /// Append one command, rejecting realtime kinds
    pub fn push(&mut self, command: Command) -> Result<(), CommandError> {
        if command.is_realtime() {
            return Err(CommandError::RealtimeOnly {
                kind: command.kind(),
            });
        }
        self.commands.push(command);
        Ok(())
    }

    /// Program identifier
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Human-readable label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The queued commands in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the program holds no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// One entry in the spooler queue
#[derive(Debug, Clone, PartialEq)]
pub enum SpoolEntry {
    /// A single queued command
    Single(Command),
    /// A program dispatched one command at a time
    Program(Program),
}

impl SpoolEntry {
    /// Total commands this entry will dispatch
    pub fn command_count(&self) -> usize {
        match self {
            SpoolEntry::Single(_) => 1,
            SpoolEntry::Program(p) => p.len(),
        }
    }

    /// Job identifier, when the entry is a program
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SpoolEntry::Single(_) => None,
            SpoolEntry::Program(p) => Some(p.id()),
        }
    }
}

/// Producer-side surface of the command pipeline
///
/// Front ends (the GRBL emulator, the CLI) hand work to the pipeline
/// through this trait, so they never depend on the spooler directly.
pub trait CommandSink: Send + Sync {
    /// Enqueue one command in FIFO order
    fn submit(&self, command: Command) -> Result<(), SpoolerError>;

    /// Enqueue a program as one unit, returning its job id
    fn submit_program(&self, program: Program) -> Result<JobId, SpoolerError>;

    /// Deliver a realtime command out of band
    fn submit_realtime(&self, command: Command) -> Result<(), SpoolerError>;

    /// Snapshot of live interpreter state
    fn status(&self) -> StatusSnapshot;
}
