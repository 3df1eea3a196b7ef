//! Device channels
//!
//! A channel is the byte transport between the interpreter and a board:
//! - `SerialChannel` drives a USB serial adapter
//! - `LoopbackChannel` records traffic for offline runs and tests
//!
//! Channels are synchronous. Once the pipeline is running, the spooler's
//! drain thread is the only writer.

pub mod loopback;
pub mod serial;

pub use loopback::{LoopbackChannel, LoopbackProbe};
pub use serial::{SerialChannel, SerialConfig};

use laserkit_core::error::ChannelError;

/// Result alias for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Byte transport between the interpreter and a board
pub trait DeviceChannel: Send {
    /// Stable name for logs and error messages
    fn name(&self) -> &str;

    /// Open the underlying device; idempotent
    fn open(&mut self) -> ChannelResult<()>;

    /// Close the underlying device; idempotent
    fn close(&mut self) -> ChannelResult<()>;

    /// Whether the channel currently accepts writes
    fn is_open(&self) -> bool;

    /// Queue bytes for transmission
    fn write(&mut self, data: &[u8]) -> ChannelResult<()>;

    /// Bytes accepted but not yet transmitted by the device
    fn outstanding_length(&self) -> usize;
}
