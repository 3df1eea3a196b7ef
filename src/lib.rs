//! # LaserKit
//!
//! Device command pipeline for K40-class laser cutters speaking the
//! LHYMICRO-GL board dialect, with a GRBL-compatible text surface so
//! stock CNC senders can drive the machine.
//!
//! ## Architecture
//!
//! LaserKit is organized as a workspace with multiple crates:
//!
//! 1. **laserkit-core** - Command vocabulary, data types, errors, events,
//!    settings registry, unit conversions
//! 2. **laserkit-device** - Device channels (serial, loopback), the
//!    LHYMICRO-GL encoder, the interpreter, and the spooler
//! 3. **laserkit-grbl** - GRBL line parser, `$` settings table, and the
//!    per-connection emulator session
//! 4. **laserkit** - Binary that wires config, logging, and the TCP
//!    GRBL server around the pipeline
//!
//! ## Data flow
//!
//! Producers push vocabulary commands into the spooler; its drain thread
//! hands them one at a time to the interpreter, which emits wire bytes
//! through the device channel. The GRBL server is one producer among
//! many: each TCP connection owns an emulator session that translates
//! G-code lines into the same commands.

pub mod config;
pub mod server;

pub use config::{build_registry, LaserkitConfig};
pub use server::GrblServer;

pub use laserkit_core::{
    BedSize, ChannelError, Command, CommandError, CommandSink, CoordinateMode, DriverMode, Error,
    EventBus, InterpreterError, JobId, MoveMode, PipelineEvent, PipelineState, Position, Program,
    Result, SettingKind, SettingsError, SettingsRegistry, SignalValue, SpoolerError,
    StatusSnapshot,
};

pub use laserkit_device::{
    DeviceChannel, Interpreter, InterpreterConfig, LoopbackChannel, LoopbackProbe, SerialChannel,
    SerialConfig, Spooler, SpoolerConfig,
};

pub use laserkit_grbl::{GrblConfig, GrblEmulator, GrblError, GrblResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
