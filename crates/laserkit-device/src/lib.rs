//! LaserKit device layer
//!
//! Everything between the command vocabulary and the wire:
//! - `channel`: byte transports (USB serial, loopback)
//! - `encoder`: LHYMICRO-GL byte primitives
//! - `interpreter`: commands to wire bytes plus tracked board state
//! - `spooler`: the FIFO queue and its drain thread

pub mod channel;
pub mod encoder;
pub mod interpreter;
pub mod spooler;

pub use channel::{DeviceChannel, LoopbackChannel, LoopbackProbe, SerialChannel, SerialConfig};
pub use interpreter::{Interpreter, InterpreterConfig, InterpreterState, StateHandle};
pub use spooler::{Spooler, SpoolerConfig};
