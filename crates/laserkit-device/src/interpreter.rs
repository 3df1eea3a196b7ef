//! LHYMICRO-GL interpreter
//!
//! Turns pipeline commands into wire bytes while tracking the board state
//! those bytes imply: position, speed, power, laser flag, driver mode,
//! and the direction latches the protocol depends on.
//!
//! The spooler's drain thread is the single writer. Everyone else reads
//! state through a `StateHandle` snapshot.

use crate::channel::DeviceChannel;
use crate::encoder::{
    encode_distance, speed_code, CODE_ANGLE, CODE_BOTTOM, CODE_LASER_OFF, CODE_LASER_ON,
    CODE_LEFT, CODE_RIGHT, CODE_TOP, SEQ_COMPACT_EXIT, SEQ_HOME, SEQ_RAIL_UNLOCK,
    SEQ_REALTIME_PAUSE, SEQ_REALTIME_RESET, SEQ_REALTIME_RESUME,
};
use laserkit_core::command::Command;
use laserkit_core::data::{CoordinateMode, DriverMode, MoveMode, Position, StatusSnapshot};
use laserkit_core::error::InterpreterError;
use laserkit_core::event::{EventBus, PipelineEvent};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Interpreter tuning
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Keep the rails locked after default-mode moves
    pub autolock: bool,
    /// Poll interval for waits and buffer drains
    pub poll_interval: Duration,
    /// Scale applied to incoming coordinates
    pub unit_scale: f64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            autolock: true,
            poll_interval: Duration::from_millis(10),
            unit_scale: 1.0,
        }
    }
}

/// Board state tracked alongside the byte stream
///
/// Positions are whole mils; motion deltas are rounded before emission
/// so the tracked position never drifts from the board's counters.
#[derive(Debug, Clone)]
pub struct InterpreterState {
    /// Last emitted position
    pub position: Position,
    /// Speed in board units, stamped into the next compact entry
    pub speed: f64,
    /// Power level in `0..=1000`
    pub power: f64,
    /// Last motion group
    pub move_mode: MoveMode,
    /// Absolute or incremental coordinates
    pub coordinate_mode: CoordinateMode,
    /// Default or compact driver mode
    pub driver_mode: DriverMode,
    /// Laser flag implied by emitted `D`/`U` codes
    pub laser: bool,
    /// Realtime pause in effect
    pub paused: bool,
    /// Horizontal latch; true after a `T` (leftward) code
    pub x_going_left: bool,
    /// Vertical latch; true after an `L` (topward) code
    pub y_going_top: bool,
}

impl InterpreterState {
    fn new() -> Self {
        InterpreterState {
            position: Position::origin(),
            speed: 0.0,
            power: 1000.0,
            move_mode: MoveMode::Rapid,
            coordinate_mode: CoordinateMode::Absolute,
            driver_mode: DriverMode::Default,
            laser: false,
            paused: false,
            x_going_left: false,
            y_going_top: false,
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            position: self.position,
            speed: self.speed,
            power: self.power,
            move_mode: self.move_mode,
            coordinate_mode: self.coordinate_mode,
            driver_mode: self.driver_mode,
            laser: self.laser,
            paused: self.paused,
        }
    }
}

/// Shared read access to live interpreter state
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<RwLock<InterpreterState>>,
}

impl StateHandle {
    /// Point-in-time copy of the state
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().snapshot()
    }
}

/// Command-to-bytes interpreter for LHYMICRO-GL boards
pub struct Interpreter {
    channel: Box<dyn DeviceChannel>,
    state: Arc<RwLock<InterpreterState>>,
    config: InterpreterConfig,
    interrupt: Arc<AtomicBool>,
    events: EventBus,
}

impl Interpreter {
    /// Create an interpreter over an already-configured channel
    pub fn new(channel: Box<dyn DeviceChannel>, config: InterpreterConfig, events: EventBus) -> Self {
        Interpreter {
            channel,
            state: Arc::new(RwLock::new(InterpreterState::new())),
            config,
            interrupt: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Handle for reading state snapshots from other threads
    pub fn state_handle(&self) -> StateHandle {
        StateHandle {
            inner: self.state.clone(),
        }
    }

    /// Flag that aborts in-progress waits when set
    ///
    /// The spooler raises it when a realtime reset arrives; `reset`
    /// clears it again.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Name of the underlying channel
    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Open the underlying channel
    pub fn open_channel(&mut self) -> Result<(), InterpreterError> {
        Ok(self.channel.open()?)
    }

    /// Close the underlying channel
    pub fn close_channel(&mut self) -> Result<(), InterpreterError> {
        Ok(self.channel.close()?)
    }

    /// Bytes outstanding in the device buffer
    pub fn outstanding(&self) -> usize {
        self.channel.outstanding_length()
    }

    /// Execute one command, emitting its wire bytes
    pub fn execute(&mut self, command: &Command) -> Result<(), InterpreterError> {
        tracing::trace!(command = %command, "execute");
        match command {
            Command::Move { x, y } => self.motion(*x, *y, false),
            Command::RapidMove { x, y } => self.motion(*x, *y, true),
            Command::LaserOn => self.laser_on().map(|_| ()),
            Command::LaserOff => self.laser_off().map(|_| ()),
            Command::SetSpeed { rate } => self.set_speed(*rate),
            Command::SetPower { level } => {
                self.set_power(*level);
                Ok(())
            }
            Command::SetAbsolute => {
                self.state.write().coordinate_mode = CoordinateMode::Absolute;
                Ok(())
            }
            Command::SetIncremental => {
                self.state.write().coordinate_mode = CoordinateMode::Incremental;
                Ok(())
            }
            Command::ModeDefault => self.ensure_default(),
            Command::ModeDefaultSet => self.mode_default_set(),
            Command::ModeCompactSet => self.ensure_compact(),
            Command::Home => self.home(),
            Command::Wait { seconds } => self.wait(*seconds),
            Command::WaitBufferEmpty => self.wait_buffer_empty(),
            Command::Signal { name, value } => {
                self.events.publish(PipelineEvent::Signal {
                    name: name.clone(),
                    value: value.clone(),
                });
                Ok(())
            }
            Command::Reset => self.reset(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
        }
    }

    /// Realtime pause: hold the board mid-program
    pub fn pause(&mut self) -> Result<(), InterpreterError> {
        self.write(SEQ_REALTIME_PAUSE)?;
        self.state.write().paused = true;
        Ok(())
    }

    /// Realtime resume after a pause
    pub fn resume(&mut self) -> Result<(), InterpreterError> {
        self.write(SEQ_REALTIME_RESUME)?;
        self.state.write().paused = false;
        Ok(())
    }

    /// Realtime reset: abort the board and return tracked state to a
    /// known default
    ///
    /// The tracked position survives; only a `Home` re-zeros it.
    pub fn reset(&mut self) -> Result<(), InterpreterError> {
        self.write(SEQ_REALTIME_RESET)?;
        {
            let mut state = self.state.write();
            state.laser = false;
            state.driver_mode = DriverMode::Default;
            state.x_going_left = false;
            state.y_going_top = false;
            state.paused = false;
            state.move_mode = MoveMode::Rapid;
        }
        self.interrupt.store(false, Ordering::SeqCst);
        self.events.publish(PipelineEvent::DriverMode(DriverMode::Default));
        self.events.publish(PipelineEvent::BufferLevel(0));
        Ok(())
    }

    fn motion(&mut self, x: f64, y: f64, rapid: bool) -> Result<(), InterpreterError> {
        if rapid {
            self.ensure_default()?;
        }
        let (dx, dy, from) = {
            let state = self.state.read();
            let scale = self.config.unit_scale;
            let target = match state.coordinate_mode {
                CoordinateMode::Absolute => {
                    Position::new((x * scale).round(), (y * scale).round())
                }
                CoordinateMode::Incremental => Position::new(
                    (state.position.x + x * scale).round(),
                    (state.position.y + y * scale).round(),
                ),
            };
            (
                (target.x - state.position.x) as i64,
                (target.y - state.position.y) as i64,
                state.position,
            )
        };
        if dx == 0 && dy == 0 {
            return Ok(());
        }

        let mode = self.state.read().driver_mode;
        match mode {
            DriverMode::Default => self.move_default(dx, dy)?,
            DriverMode::Compact => self.plot_delta(dx, dy, false)?,
        }

        let to = {
            let mut state = self.state.write();
            state.position = Position::new(from.x + dx as f64, from.y + dy as f64);
            state.move_mode = if mode == DriverMode::Default {
                MoveMode::Rapid
            } else {
                MoveMode::Linear
            };
            state.position
        };
        self.events
            .publish(PipelineEvent::PositionChanged { from, to });
        Ok(())
    }

    fn move_default(&mut self, dx: i64, dy: i64) -> Result<(), InterpreterError> {
        self.write(b"I")?;
        self.plot_delta(dx, dy, true)?;
        self.write(b"S1P\n")?;
        if !self.config.autolock {
            self.write(SEQ_RAIL_UNLOCK)?;
        }
        Ok(())
    }

    fn plot_delta(&mut self, dx: i64, dy: i64, force_dir: bool) -> Result<(), InterpreterError> {
        if dx != 0 && dy != 0 && dx.abs() == dy.abs() {
            self.plot_angle(dx, dy, force_dir)
        } else {
            if dx != 0 {
                self.plot_x(dx, force_dir)?;
            }
            if dy != 0 {
                self.plot_y(dy, force_dir)?;
            }
            Ok(())
        }
    }

    fn plot_x(&mut self, dx: i64, force_dir: bool) -> Result<(), InterpreterError> {
        self.set_x_direction(dx < 0, force_dir)?;
        let distance = encode_distance(dx.unsigned_abs());
        self.write(&distance)
    }

    fn plot_y(&mut self, dy: i64, force_dir: bool) -> Result<(), InterpreterError> {
        self.set_y_direction(dy < 0, force_dir)?;
        let distance = encode_distance(dy.unsigned_abs());
        self.write(&distance)
    }

    // Exact diagonals step both latched axes off a single distance.
    fn plot_angle(&mut self, dx: i64, dy: i64, force_dir: bool) -> Result<(), InterpreterError> {
        self.set_x_direction(dx < 0, force_dir)?;
        self.set_y_direction(dy < 0, force_dir)?;
        self.write(&[CODE_ANGLE])?;
        self.write(&encode_distance(dx.unsigned_abs()))
    }

    fn set_x_direction(&mut self, left: bool, force: bool) -> Result<(), InterpreterError> {
        let changed = self.state.read().x_going_left != left;
        if changed || force {
            self.write(&[if left { CODE_LEFT } else { CODE_RIGHT }])?;
            self.state.write().x_going_left = left;
        }
        Ok(())
    }

    fn set_y_direction(&mut self, top: bool, force: bool) -> Result<(), InterpreterError> {
        let changed = self.state.read().y_going_top != top;
        if changed || force {
            self.write(&[if top { CODE_TOP } else { CODE_BOTTOM }])?;
            self.state.write().y_going_top = top;
        }
        Ok(())
    }

    fn laser_on(&mut self) -> Result<bool, InterpreterError> {
        let mode = {
            let state = self.state.read();
            if state.laser {
                return Ok(false);
            }
            state.driver_mode
        };
        match mode {
            DriverMode::Default => {
                self.write(b"I")?;
                self.write(&[CODE_LASER_ON])?;
                self.write(b"S1P\n")?;
                if !self.config.autolock {
                    self.write(SEQ_RAIL_UNLOCK)?;
                }
            }
            DriverMode::Compact => self.write(&[CODE_LASER_ON])?,
        }
        self.state.write().laser = true;
        Ok(true)
    }

    fn laser_off(&mut self) -> Result<bool, InterpreterError> {
        let mode = {
            let state = self.state.read();
            if !state.laser {
                return Ok(false);
            }
            state.driver_mode
        };
        match mode {
            DriverMode::Default => {
                self.write(b"I")?;
                self.write(&[CODE_LASER_OFF])?;
                self.write(b"S1P\n")?;
                if !self.config.autolock {
                    self.write(SEQ_RAIL_UNLOCK)?;
                }
            }
            DriverMode::Compact => self.write(&[CODE_LASER_OFF])?,
        }
        self.state.write().laser = false;
        Ok(true)
    }

    fn ensure_default(&mut self) -> Result<(), InterpreterError> {
        if self.state.read().driver_mode == DriverMode::Compact {
            self.write(SEQ_COMPACT_EXIT)?;
            {
                let mut state = self.state.write();
                state.driver_mode = DriverMode::Default;
                state.laser = false;
            }
            self.events
                .publish(PipelineEvent::DriverMode(DriverMode::Default));
        }
        Ok(())
    }

    fn mode_default_set(&mut self) -> Result<(), InterpreterError> {
        self.ensure_default()?;
        let mut state = self.state.write();
        state.laser = false;
        state.x_going_left = false;
        state.y_going_top = false;
        Ok(())
    }

    fn ensure_compact(&mut self) -> Result<(), InterpreterError> {
        let (speed, declare) = {
            let state = self.state.read();
            if state.driver_mode == DriverMode::Compact {
                return Ok(());
            }
            let horizontal = if state.x_going_left { CODE_LEFT } else { CODE_RIGHT };
            let vertical = if state.y_going_top { CODE_TOP } else { CODE_BOTTOM };
            (state.speed, [horizontal, vertical])
        };
        self.write(b"I")?;
        self.write(&speed_code(speed))?;
        self.write(b"N")?;
        self.write(&declare)?;
        self.write(b"S1E")?;
        self.state.write().driver_mode = DriverMode::Compact;
        self.events
            .publish(PipelineEvent::DriverMode(DriverMode::Compact));
        Ok(())
    }

    fn home(&mut self) -> Result<(), InterpreterError> {
        self.ensure_default()?;
        self.write(SEQ_HOME)?;
        let from = {
            let mut state = self.state.write();
            let from = state.position;
            state.position = Position::origin();
            state.x_going_left = false;
            state.y_going_top = false;
            state.laser = false;
            state.move_mode = MoveMode::Rapid;
            from
        };
        self.events.publish(PipelineEvent::PositionChanged {
            from,
            to: Position::origin(),
        });
        Ok(())
    }

    fn set_speed(&mut self, rate: f64) -> Result<(), InterpreterError> {
        let (current, mode) = {
            let state = self.state.read();
            (state.speed, state.driver_mode)
        };
        if current == rate {
            return Ok(());
        }
        // A running compact program keeps its entry speed; drop to
        // default so the next compact entry stamps the new code.
        if mode == DriverMode::Compact {
            self.ensure_default()?;
        }
        self.state.write().speed = rate;
        Ok(())
    }

    fn set_power(&mut self, level: f64) {
        // Levels in (0, 1] are fractions of full power.
        let level = if level > 0.0 && level <= 1.0 {
            level * 1000.0
        } else {
            level
        };
        self.state.write().power = level;
    }

    fn wait(&mut self, seconds: f64) -> Result<(), InterpreterError> {
        let deadline = Instant::now() + Duration::from_secs_f64(seconds);
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(InterpreterError::Interrupted { condition: "wait" });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            std::thread::sleep(remaining.min(self.config.poll_interval));
        }
    }

    fn wait_buffer_empty(&mut self) -> Result<(), InterpreterError> {
        let mut last = usize::MAX;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Err(InterpreterError::Interrupted {
                    condition: "buffer drain",
                });
            }
            let outstanding = self.channel.outstanding_length();
            if outstanding != last {
                self.events.publish(PipelineEvent::BufferLevel(outstanding));
                last = outstanding;
            }
            if outstanding == 0 {
                return Ok(());
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), InterpreterError> {
        Ok(self.channel.write(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LoopbackChannel;

    fn open_interpreter() -> (Interpreter, crate::channel::LoopbackProbe) {
        let mut channel = LoopbackChannel::new();
        let probe = channel.probe();
        channel.open().unwrap();
        let interpreter = Interpreter::new(
            Box::new(channel),
            InterpreterConfig::default(),
            EventBus::default(),
        );
        (interpreter, probe)
    }

    #[test]
    fn test_power_fraction_rescale() {
        let (mut interpreter, _probe) = open_interpreter();
        let handle = interpreter.state_handle();

        interpreter.set_power(0.5);
        assert_eq!(handle.snapshot().power, 500.0);

        interpreter.set_power(500.0);
        assert_eq!(handle.snapshot().power, 500.0);

        interpreter.set_power(0.0);
        assert_eq!(handle.snapshot().power, 0.0);

        interpreter.set_power(1.0);
        assert_eq!(handle.snapshot().power, 1000.0);
    }

    #[test]
    fn test_laser_toggle_is_idempotent() {
        let (mut interpreter, probe) = open_interpreter();

        assert!(interpreter.laser_on().unwrap());
        assert!(!interpreter.laser_on().unwrap());
        assert_eq!(probe.take_written(), b"IDS1P\n");

        assert!(interpreter.laser_off().unwrap());
        assert!(!interpreter.laser_off().unwrap());
        assert_eq!(probe.take_written(), b"IUS1P\n");
    }

    #[test]
    fn test_interrupted_wait() {
        let (mut interpreter, _probe) = open_interpreter();
        interpreter.interrupt_handle().store(true, Ordering::SeqCst);

        let err = interpreter.wait(10.0).unwrap_err();
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_state_defaults() {
        let (interpreter, _probe) = open_interpreter();
        let snapshot = interpreter.state_handle().snapshot();
        assert_eq!(snapshot.position, Position::origin());
        assert_eq!(snapshot.driver_mode, DriverMode::Default);
        assert_eq!(snapshot.power, 1000.0);
        assert!(!snapshot.laser);
        assert!(!snapshot.paused);
    }
}
