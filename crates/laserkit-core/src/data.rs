//! Shared pipeline data types
//!
//! Positions, driver and coordinate modes, the pipeline state machine,
//! and the live status snapshot handed to front ends.

use crate::units::MILS_PER_MM;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position on the bed in mils (1/1000 inch)
///
/// The origin is the machine home corner; positive X runs right and
/// positive Y runs toward the far rail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate in mils
    pub x: f64,
    /// Y coordinate in mils
    pub y: f64,
}

impl Position {
    /// Create a position from mil coordinates
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    /// The machine origin
    pub fn origin() -> Self {
        Position { x: 0.0, y: 0.0 }
    }

    /// This position shifted by a delta
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::origin()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.0}, {:.0})", self.x, self.y)
    }
}

/// Motion group selected by the g-code front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    /// Rapid positioning, laser off
    Rapid,
    /// Linear cut
    Linear,
    /// Clockwise arc, degraded to a linear cut
    ArcCw,
    /// Counter-clockwise arc, degraded to a linear cut
    ArcCcw,
}

impl Default for MoveMode {
    fn default() -> Self {
        MoveMode::Rapid
    }
}

impl fmt::Display for MoveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveMode::Rapid => write!(f, "rapid"),
            MoveMode::Linear => write!(f, "linear"),
            MoveMode::ArcCw => write!(f, "arc-cw"),
            MoveMode::ArcCcw => write!(f, "arc-ccw"),
        }
    }
}

/// How incoming coordinates are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateMode {
    /// Coordinates are absolute bed positions
    Absolute,
    /// Coordinates are deltas from the last emitted position
    Incremental,
}

impl Default for CoordinateMode {
    fn default() -> Self {
        CoordinateMode::Absolute
    }
}

impl fmt::Display for CoordinateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateMode::Absolute => write!(f, "absolute"),
            CoordinateMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Board-level driver mode
///
/// Default mode wraps each motion in its own packet; compact mode keeps
/// the board in a running program where bytes stream continuously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverMode {
    /// One packet per motion, rails released between moves
    Default,
    /// Streaming program mode for cuts
    Compact,
}

impl Default for DriverMode {
    fn default() -> Self {
        DriverMode::Default
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverMode::Default => write!(f, "default"),
            DriverMode::Compact => write!(f, "compact"),
        }
    }
}

/// Lifecycle state of the spooler pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Queue drained or waiting for the buffer gate
    Idle,
    /// One command is in flight to the interpreter
    Dispatching,
    /// Dispatch held by a realtime pause
    Paused,
    /// Terminal; the queue accepts no further work
    Closed,
}

impl PipelineState {
    /// Check whether a transition to `target` is legal
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        match (self, target) {
            // Closed is terminal
            (PipelineState::Closed, _) => false,
            // Any live state may close
            (_, PipelineState::Closed) => true,
            // Idle picks up work or gets paused
            (PipelineState::Idle, PipelineState::Dispatching) => true,
            (PipelineState::Idle, PipelineState::Paused) => true,
            // Dispatch completes back to idle or is paused mid-stream
            (PipelineState::Dispatching, PipelineState::Idle) => true,
            (PipelineState::Dispatching, PipelineState::Paused) => true,
            // Resume always lands in idle before the next fetch
            (PipelineState::Paused, PipelineState::Idle) => true,
            _ => false,
        }
    }

    /// Whether the pipeline has shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, PipelineState::Closed)
    }

    /// Whether dispatch is held
    pub fn is_paused(&self) -> bool {
        matches!(self, PipelineState::Paused)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Dispatching => write!(f, "Dispatching"),
            PipelineState::Paused => write!(f, "Paused"),
            PipelineState::Closed => write!(f, "Closed"),
        }
    }
}

/// Point-in-time copy of live interpreter state
///
/// Front ends read this for status reports; it never aliases the
/// interpreter's own state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Last emitted position in mils
    pub position: Position,
    /// Current speed in board units
    pub speed: f64,
    /// Current power level in `0..=1000`
    pub power: f64,
    /// Motion group last selected by the front end
    pub move_mode: MoveMode,
    /// Absolute or incremental coordinates
    pub coordinate_mode: CoordinateMode,
    /// Board driver mode
    pub driver_mode: DriverMode,
    /// Whether the laser flag is set
    pub laser: bool,
    /// Whether a realtime pause is in effect
    pub paused: bool,
}

impl StatusSnapshot {
    /// Snapshot of a freshly reset driver
    pub fn new() -> Self {
        StatusSnapshot {
            position: Position::origin(),
            speed: 0.0,
            power: 1000.0,
            move_mode: MoveMode::default(),
            coordinate_mode: CoordinateMode::default(),
            driver_mode: DriverMode::default(),
            laser: false,
            paused: false,
        }
    }

    /// Set the position
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set the speed
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the power level
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    /// Set the driver mode
    pub fn with_driver_mode(mut self, mode: DriverMode) -> Self {
        self.driver_mode = mode;
        self
    }

    /// Busy when the board is held in a streaming program
    pub fn is_busy(&self) -> bool {
        self.driver_mode != DriverMode::Default
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical bed dimensions in mils
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BedSize {
    /// Width (X travel) in mils
    pub width: f64,
    /// Height (Y travel) in mils
    pub height: f64,
}

impl BedSize {
    /// Build from millimetre dimensions
    pub fn from_mm(width_mm: f64, height_mm: f64) -> Self {
        BedSize {
            width: width_mm * MILS_PER_MM,
            height: height_mm * MILS_PER_MM,
        }
    }

    /// Width in millimetres
    pub fn width_mm(&self) -> f64 {
        self.width / MILS_PER_MM
    }

    /// Height in millimetres
    pub fn height_mm(&self) -> f64 {
        self.height / MILS_PER_MM
    }
}
