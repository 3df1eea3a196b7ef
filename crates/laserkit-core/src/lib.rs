//! LaserKit core
//!
//! Device-neutral foundation shared by every pipeline layer:
//! - The closed command vocabulary and spooled program types
//! - Pipeline data types (positions, modes, state machine, snapshots)
//! - The layered error taxonomy
//! - Broadcast event fan-out
//! - The typed settings registry
//! - Unit conversions between mils, millimetres, and inches

pub mod command;
pub mod data;
pub mod error;
pub mod event;
pub mod settings;
pub mod units;

pub use command::{Command, CommandSink, JobId, Program, SignalValue, SpoolEntry};
pub use data::{
    BedSize, CoordinateMode, DriverMode, MoveMode, PipelineState, Position, StatusSnapshot,
};
pub use error::{
    ChannelError, CommandError, Error, InterpreterError, Result, SettingsError, SpoolerError,
};
pub use event::{EventBus, PipelineEvent};
pub use settings::{SettingKind, SettingsRegistry};
pub use units::{FeedRateMode, MILS_PER_INCH, MILS_PER_MM};
