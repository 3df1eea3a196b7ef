//! GRBL-compatible emulator front end
//!
//! Presents the GRBL 1.1 serial surface (g-code blocks, `$` commands,
//! realtime control bytes) over any `CommandSink`, so stock g-code
//! senders can drive an LHYMICRO-GL board without knowing it.
//!
//! The emulator is byte-oriented: feed it raw input with
//! [`GrblEmulator::write`] and it hands back the responses the sender
//! expects, in protocol order.

pub mod emulator;
pub mod error;
pub mod parser;
pub mod settings;

pub use emulator::{GrblConfig, GrblEmulator, GrblResponse};
pub use error::GrblError;
pub use parser::{code_key, strip_comments, CodeLine};
pub use settings::{GrblSettingValue, GrblSettings};
