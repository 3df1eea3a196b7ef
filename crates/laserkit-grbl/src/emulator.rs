//! GRBL session state machine
//!
//! One emulator instance per connection. Bytes go in through `write`,
//! responses come back in protocol order: realtime bytes are handled
//! mid-stream, completed lines answer `ok` or `error:<code>`, dump and
//! status lines land before the acknowledgment that closes them out.
//!
//! The emulator never touches the device; everything it wants done goes
//! through the `CommandSink` as vocabulary commands.

use crate::error::GrblError;
use crate::parser::{code_key, strip_comments, CodeLine};
use crate::settings::{GrblSettingValue, GrblSettings};
use laserkit_core::command::{Command, CommandSink};
use laserkit_core::data::MoveMode;
use laserkit_core::units::{FeedRateMode, MILS_PER_INCH, MILS_PER_MM};
use std::fmt;
use std::sync::Arc;

/// One response unit on the GRBL wire
#[derive(Debug, Clone, PartialEq)]
pub enum GrblResponse {
    /// Greeting banner sent when a session opens
    Welcome,
    /// Line accepted
    Ok,
    /// Line refused with a numeric code
    Error(GrblError),
    /// `?` status frame
    Status(String),
    /// One `$$` dump line
    Setting {
        /// Setting number
        number: u16,
        /// Typed value, formatted per its declared type
        value: GrblSettingValue,
    },
    /// `$` help line
    Help,
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrblResponse::Welcome => write!(f, "Grbl 1.1e ['$' for help]"),
            GrblResponse::Ok => write!(f, "ok"),
            GrblResponse::Error(err) => write!(f, "error:{}", err.code()),
            GrblResponse::Status(frame) => write!(f, "{}", frame),
            GrblResponse::Setting { number, value } => write!(f, "${}={}", number, value),
            GrblResponse::Help => write!(
                f,
                "[HLP:$$ $# $G $I $N $x=val $Nx=line $J=line $SLP $C $X $H ~ ! ? ctrl-x]"
            ),
        }
    }
}

impl GrblResponse {
    /// Wire form with the CRLF terminator senders expect
    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

/// Per-session emulator configuration
#[derive(Debug, Clone)]
pub struct GrblConfig {
    /// X sign applied to incoming coordinates, `1.0` or `-1.0`
    pub flip_x: f64,
    /// Y sign applied to incoming coordinates, `1.0` or `-1.0`
    pub flip_y: f64,
    /// Rapid issued after every homing cycle, in mils
    pub home_adjust: Option<(f64, f64)>,
}

impl Default for GrblConfig {
    fn default() -> Self {
        GrblConfig {
            flip_x: 1.0,
            flip_y: 1.0,
            home_adjust: None,
        }
    }
}

/// GRBL line-protocol state machine over a command sink
pub struct GrblEmulator {
    sink: Arc<dyn CommandSink>,
    settings: GrblSettings,
    config: GrblConfig,
    buffer: String,
    scale: f64,
    feed_mode: FeedRateMode,
    move_mode: MoveMode,
    on_mode: bool,
    home: Option<(f64, f64)>,
    home2: Option<(f64, f64)>,
}

impl GrblEmulator {
    /// Create a session speaking millimetres, absolute moves, rapid mode
    pub fn new(sink: Arc<dyn CommandSink>, config: GrblConfig) -> Self {
        GrblEmulator {
            sink,
            settings: GrblSettings::default(),
            config,
            buffer: String::new(),
            scale: MILS_PER_MM,
            feed_mode: FeedRateMode::default(),
            move_mode: MoveMode::Rapid,
            on_mode: true,
            home: None,
            home2: None,
        }
    }

    /// Feed raw bytes in, collecting responses in protocol order
    ///
    /// Realtime control bytes (`?`, `~`, `!`, `0x18`) act immediately
    /// wherever they appear and never join the line buffer. Backspace
    /// erases the previous buffered character.
    pub fn write(&mut self, data: &[u8]) -> Vec<GrblResponse> {
        let mut responses = Vec::new();
        for &byte in data {
            match byte {
                b'?' => responses.push(GrblResponse::Status(self.status_frame())),
                b'~' => self.submit_realtime(Command::Resume),
                b'!' => self.submit_realtime(Command::Pause),
                0x18 => self.submit_realtime(Command::Reset),
                0x08 => {
                    self.buffer.pop();
                }
                b'\n' => {
                    let mut line = std::mem::take(&mut self.buffer);
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    self.handle_line(&line, &mut responses);
                }
                _ => self.buffer.push(byte as char),
            }
        }
        responses
    }

    fn submit_realtime(&self, command: Command) {
        if let Err(err) = self.sink.submit_realtime(command) {
            tracing::warn!(error = %err, "realtime control byte dropped");
        }
    }

    fn handle_line(&mut self, line: &str, responses: &mut Vec<GrblResponse>) {
        let line = strip_comments(line);
        let result = if let Some(rest) = line.strip_prefix('$') {
            self.handle_dollar(rest, responses)
        } else {
            self.execute_block(&mut CodeLine::parse(&line))
        };
        match result {
            Ok(()) => responses.push(GrblResponse::Ok),
            Err(err) => {
                tracing::debug!(line, code = err.code(), "line refused");
                responses.push(GrblResponse::Error(err));
            }
        }
    }

    fn handle_dollar(
        &mut self,
        rest: &str,
        responses: &mut Vec<GrblResponse>,
    ) -> Result<(), GrblError> {
        match rest {
            "" => {
                responses.push(GrblResponse::Help);
                Ok(())
            }
            "$" => {
                for (number, value) in self.settings.iter() {
                    responses.push(GrblResponse::Setting {
                        number,
                        value: *value,
                    });
                }
                Ok(())
            }
            "H" => {
                self.sink.submit(Command::Home)?;
                self.submit_home_adjust()
            }
            assignment if assignment.contains('=') => {
                let (number, raw) = assignment
                    .split_once('=')
                    .ok_or(GrblError::InvalidStatement)?;
                let number: u16 = number.parse().map_err(|_| GrblError::InvalidStatement)?;
                self.settings.set_parsed(number, raw)
            }
            _ => Err(GrblError::InvalidStatement),
        }
    }

    /// Run one tokenized block in GRBL's fixed word order
    ///
    /// M words first, then G words, then `F`, then `S`, and X/Y motion
    /// last, so speed and power queue ahead of the motion that uses
    /// them.
    fn execute_block(&mut self, line: &mut CodeLine) -> Result<(), GrblError> {
        while let Some(value) = line.take('m') {
            let Some(value) = value else {
                return Err(GrblError::UnsupportedCommand);
            };
            match code_key(value) {
                // M0/M1: program pause, drain the device first
                0 | 10 => {
                    self.sink.submit(Command::ModeDefaultSet)?;
                    self.sink.submit(Command::WaitBufferEmpty)?;
                }
                // M2/M30: end of program, stop processing the line
                20 | 300 => return Ok(()),
                // M3/M4: laser master on, armed for the next cut move
                30 | 40 => self.on_mode = true,
                // M5: laser master off
                50 => {
                    self.on_mode = false;
                    self.sink.submit(Command::LaserOff)?;
                }
                70 => {}
                80 => self.sink.submit(Command::signal("coolant", true)?)?,
                90 => self.sink.submit(Command::signal("coolant", false)?)?,
                560 | 9110 | 9120 => {}
                _ => return Err(GrblError::UnsupportedCommand),
            }
        }
        while let Some(value) = line.take('g') {
            let Some(value) = value else {
                return Err(GrblError::BadNumberFormat);
            };
            self.execute_gcode(code_key(value), line)?;
        }
        while let Some(value) = line.take('f') {
            let Some(feed) = value else {
                return Err(GrblError::BadNumberFormat);
            };
            let rate = self.feed_mode.to_device_speed(feed, self.scale);
            self.sink.submit(Command::set_speed(rate)?)?;
        }
        while let Some(value) = line.take('s') {
            let Some(power) = value else {
                return Err(GrblError::BadNumberFormat);
            };
            // Raw value; the interpreter rescales (0, 1] fractions.
            self.sink.submit(Command::set_power(power)?)?;
        }
        self.execute_motion(line)
    }

    fn execute_gcode(&mut self, key: i32, line: &mut CodeLine) -> Result<(), GrblError> {
        match key {
            0 => self.move_mode = MoveMode::Rapid,
            10 => self.move_mode = MoveMode::Linear,
            20 => self.move_mode = MoveMode::ArcCw,
            30 => self.move_mode = MoveMode::ArcCcw,
            // G4 dwell: P is milliseconds, S is seconds
            40 => {
                let mut seconds = match line.take('p') {
                    Some(Some(ms)) => ms / 1000.0,
                    _ => 0.0,
                };
                if let Some(Some(s)) = line.take('s') {
                    seconds = s;
                }
                self.sink.submit(Command::ModeDefaultSet)?;
                self.sink.submit(Command::wait(seconds)?)?;
            }
            // G10: coordinate system data, recognized and dropped
            100 => {
                line.take('l');
            }
            170 => {}
            // Only the XY plane exists on a flat bed
            180 | 190 => return Err(GrblError::BadNumberFormat),
            200 | 700 => self.scale = MILS_PER_INCH,
            210 | 710 => self.scale = MILS_PER_MM,
            // G28: home, then return to stored position 1
            280 => {
                self.sink.submit(Command::ModeDefaultSet)?;
                self.sink.submit(Command::Home)?;
                self.submit_home_adjust()?;
                if let Some((x, y)) = self.home {
                    self.sink.submit(Command::rapid_move(x, y)?)?;
                }
            }
            281 => self.home = take_position(line).or(self.home),
            282 => {
                self.sink.submit(Command::ModeDefault)?;
                self.sink.submit(Command::Home)?;
                self.submit_home_adjust()?;
            }
            // G28.3: home, then restore the given axes one at a time
            283 => {
                self.sink.submit(Command::ModeDefault)?;
                self.sink.submit(Command::Home)?;
                self.submit_home_adjust()?;
                if let Some(x) = line.take('x') {
                    self.sink
                        .submit(Command::rapid_move(x.unwrap_or(0.0), 0.0)?)?;
                }
                if let Some(y) = line.take('y') {
                    self.sink
                        .submit(Command::rapid_move(0.0, y.unwrap_or(0.0))?)?;
                }
            }
            // G30: home, then return to stored position 2
            300 => {
                line.take('p');
                self.sink.submit(Command::ModeDefault)?;
                self.sink.submit(Command::Home)?;
                self.submit_home_adjust()?;
                if let Some((x, y)) = self.home2 {
                    self.sink.submit(Command::rapid_move(x, y)?)?;
                }
            }
            301 => self.home2 = take_position(line).or(self.home2),
            381..=385 | 400 | 431 | 490 | 530 | 540..=590 | 610 | 800 | 911 | 920 | 921 => {}
            900 => self.sink.submit(Command::SetAbsolute)?,
            910 => self.sink.submit(Command::SetIncremental)?,
            930 => self.feed_mode = FeedRateMode::InverseTime,
            940 => self.feed_mode = FeedRateMode::UnitsPerMinute,
            _ => return Err(GrblError::UnsupportedCommand),
        }
        Ok(())
    }

    fn execute_motion(&mut self, line: &mut CodeLine) -> Result<(), GrblError> {
        if !line.has('x') && !line.has('y') {
            return Ok(());
        }
        match self.move_mode {
            MoveMode::Rapid => {
                self.sink.submit(Command::LaserOff)?;
                self.sink.submit(Command::ModeDefault)?;
            }
            MoveMode::Linear | MoveMode::ArcCw | MoveMode::ArcCcw => {
                self.sink.submit(Command::ModeCompactSet)?;
            }
        }
        let x = line.take('x').flatten().unwrap_or(0.0) * self.scale * self.config.flip_x;
        let y = line.take('y').flatten().unwrap_or(0.0) * self.scale * self.config.flip_y;
        match self.move_mode {
            MoveMode::Rapid => {
                self.sink.submit(Command::LaserOff)?;
                self.sink.submit(Command::move_to(x, y)?)?;
            }
            MoveMode::Linear => {
                if self.on_mode {
                    self.sink.submit(Command::LaserOn)?;
                }
                self.sink.submit(Command::move_to(x, y)?)?;
            }
            // Arcs degrade to straight moves on this hardware
            MoveMode::ArcCw | MoveMode::ArcCcw => {
                self.sink.submit(Command::move_to(x, y)?)?;
            }
        }
        Ok(())
    }

    fn submit_home_adjust(&self) -> Result<(), GrblError> {
        if let Some((x, y)) = self.config.home_adjust {
            self.sink.submit(Command::rapid_move(x, y)?)?;
        }
        Ok(())
    }

    fn status_frame(&self) -> String {
        let snapshot = self.sink.status();
        let state = if snapshot.is_busy() { "Busy" } else { "Idle" };
        let x = snapshot.position.x / self.scale;
        let y = snapshot.position.y / self.scale;
        let feed = self.feed_mode.from_device_speed(snapshot.speed, self.scale);
        format!(
            "<{}|MPos:{:.6},{:.6},{:.6}|FS:{:.6},{}>",
            state,
            x,
            y,
            0.0,
            feed,
            snapshot.power as i64
        )
    }
}

/// Pop a stored-home pair; requires both axes on the line
fn take_position(line: &mut CodeLine) -> Option<(f64, f64)> {
    if !(line.has('x') && line.has('y')) {
        return None;
    }
    let x = line.take('x').flatten().unwrap_or(0.0);
    let y = line.take('y').flatten().unwrap_or(0.0);
    Some((x, y))
}
