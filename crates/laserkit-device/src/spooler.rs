//! Command spooler
//!
//! FIFO queue of commands and programs drained by a dedicated thread.
//! Realtime commands travel an out-of-band lane the drain thread checks
//! before every dispatch, so Reset, Pause, and Resume act even while the
//! queue is deep or a wait is in progress.
//!
//! Dispatch invariants:
//! - Exactly one command is in flight at a time
//! - Entries dispatch in submission order
//! - The buffer gate holds dispatch while the device buffer exceeds the
//!   configured ceiling
//! - Repeated dispatch failures close the pipeline terminally

use crate::interpreter::{Interpreter, StateHandle};
use laserkit_core::command::{Command, CommandSink, JobId, Program, SpoolEntry};
use laserkit_core::data::{PipelineState, StatusSnapshot};
use laserkit_core::error::{CommandError, SpoolerError};
use laserkit_core::event::{EventBus, PipelineEvent};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Spooler tuning
#[derive(Debug, Clone)]
pub struct SpoolerConfig {
    /// Outstanding-byte ceiling for the buffer gate; `None` disables it
    pub buffer_max: Option<usize>,
    /// Total rejections that close the pipeline
    pub max_rejections: u64,
    /// Park interval for the drain thread when idle, paused, or gated
    pub idle_delay: Duration,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        SpoolerConfig {
            buffer_max: None,
            max_rejections: 8,
            idle_delay: Duration::from_millis(10),
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<SpoolEntry>>,
    realtime: Mutex<VecDeque<Command>>,
    state: RwLock<PipelineState>,
    wake: Condvar,
    rejected: AtomicU64,
    cursor_active: AtomicBool,
}

/// Producer handle to the command pipeline
///
/// Clones share one queue and one drain thread. Call `shutdown` to close
/// the queue and join the drain thread; dropping handles alone leaves the
/// thread running.
#[derive(Clone)]
pub struct Spooler {
    shared: Arc<Shared>,
    events: EventBus,
    state_handle: StateHandle,
    interrupt: Arc<AtomicBool>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Spooler {
    /// Spawn the drain thread over an interpreter
    pub fn spawn(interpreter: Interpreter, config: SpoolerConfig, events: EventBus) -> Spooler {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            realtime: Mutex::new(VecDeque::new()),
            state: RwLock::new(PipelineState::Idle),
            wake: Condvar::new(),
            rejected: AtomicU64::new(0),
            cursor_active: AtomicBool::new(false),
        });
        let state_handle = interpreter.state_handle();
        let interrupt = interpreter.interrupt_handle();

        let worker = {
            let shared = shared.clone();
            let events = events.clone();
            std::thread::spawn(move || drain_loop(interpreter, shared, config, events))
        };

        Spooler {
            shared,
            events,
            state_handle,
            interrupt,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Enqueue one command in FIFO order
    pub fn push(&self, command: Command) -> Result<(), SpoolerError> {
        if command.is_realtime() {
            return Err(CommandError::RealtimeOnly {
                kind: command.kind(),
            }
            .into());
        }
        self.enqueue(SpoolEntry::Single(command))
    }

    /// Enqueue a program as one unit, returning its job id
    pub fn push_program(&self, program: Program) -> Result<JobId, SpoolerError> {
        let id = program.id();
        self.enqueue(SpoolEntry::Program(program))?;
        Ok(id)
    }

    /// Deliver a realtime command out of band
    ///
    /// A Reset also raises the interrupt flag so an in-progress wait
    /// aborts before the reset itself is applied.
    pub fn realtime(&self, command: Command) -> Result<(), SpoolerError> {
        if !command.is_realtime() {
            return Err(CommandError::NotRealtime {
                kind: command.kind(),
            }
            .into());
        }
        if self.state().is_closed() {
            return Err(SpoolerError::QueueClosed);
        }
        if command == Command::Reset {
            self.interrupt.store(true, Ordering::SeqCst);
        }
        self.shared.realtime.lock().push_back(command);
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Drop all pending queue entries, returning how many were dropped
    ///
    /// A command or program already mid-flight keeps running; only a
    /// Reset abandons in-flight work.
    pub fn clear_queue(&self) -> usize {
        let dropped = {
            let mut queue = self.shared.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            self.events.publish(PipelineEvent::QueueLength(0));
        }
        dropped
    }

    /// Remove a pending program from the queue
    ///
    /// Returns false when the job is unknown or already dispatching.
    pub fn cancel(&self, job: JobId) -> bool {
        let removed = {
            let mut queue = self.shared.queue.lock();
            let before = queue.len();
            queue.retain(|entry| entry.job_id() != Some(job));
            before != queue.len()
        };
        if removed {
            self.events
                .publish(PipelineEvent::QueueLength(self.queue_len()));
        }
        removed
    }

    /// Entries currently waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Current pipeline lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.shared.state.read()
    }

    /// Total dispatch rejections since startup
    pub fn rejected(&self) -> u64 {
        self.shared.rejected.load(Ordering::SeqCst)
    }

    /// Snapshot of live interpreter state
    pub fn snapshot(&self) -> StatusSnapshot {
        self.state_handle.snapshot()
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Block until the queue is drained and nothing is in flight
    ///
    /// Returns false on timeout or when the pipeline closed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // The drain thread marks Dispatching before it pops, so the
            // state must be read after the queue: an Idle observed here
            // is an Idle set after the pop that emptied the queue.
            let drained =
                self.queue_len() == 0 && !self.shared.cursor_active.load(Ordering::SeqCst);
            let state = self.state();
            if state.is_closed() {
                return false;
            }
            if drained && state == PipelineState::Idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Close the queue, stop the drain thread, and join it
    pub fn shutdown(&self) {
        set_state(&self.shared, &self.events, PipelineState::Closed);
        self.interrupt.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("drain thread panicked");
            }
        }
        self.clear_queue();
    }

    fn enqueue(&self, entry: SpoolEntry) -> Result<(), SpoolerError> {
        if self.state().is_closed() {
            return Err(SpoolerError::QueueClosed);
        }
        let len = {
            let mut queue = self.shared.queue.lock();
            queue.push_back(entry);
            queue.len()
        };
        self.shared.wake.notify_all();
        self.events.publish(PipelineEvent::QueueLength(len));
        Ok(())
    }
}

impl CommandSink for Spooler {
    fn submit(&self, command: Command) -> Result<(), SpoolerError> {
        self.push(command)
    }

    fn submit_program(&self, program: Program) -> Result<JobId, SpoolerError> {
        self.push_program(program)
    }

    fn submit_realtime(&self, command: Command) -> Result<(), SpoolerError> {
        self.realtime(command)
    }

    fn status(&self) -> StatusSnapshot {
        self.snapshot()
    }
}

struct ProgramCursor {
    program: Program,
    index: usize,
}

fn drain_loop(
    mut interpreter: Interpreter,
    shared: Arc<Shared>,
    config: SpoolerConfig,
    events: EventBus,
) {
    tracing::debug!(channel = interpreter.channel_name(), "drain thread started");
    let mut cursor: Option<ProgramCursor> = None;

    loop {
        // 1. REALTIME PHASE: apply out-of-band commands first
        apply_realtime(&mut interpreter, &shared, &config, &events, &mut cursor);

        // 2. LIFECYCLE PHASE: stop when closed, hold while paused
        let state = *shared.state.read();
        if state.is_closed() {
            break;
        }
        if state.is_paused() {
            park(&shared, config.idle_delay);
            continue;
        }

        // 3. IDLE PHASE: park until work arrives
        if cursor.is_none() && shared.queue.lock().is_empty() {
            park(&shared, config.idle_delay);
            continue;
        }

        // 4. GATE PHASE: hold while the device buffer is over the ceiling
        if let Some(max) = config.buffer_max {
            let outstanding = interpreter.outstanding();
            if outstanding > max {
                events.publish(PipelineEvent::BufferLevel(outstanding));
                park(&shared, config.idle_delay);
                continue;
            }
        }

        // 5. DISPATCH PHASE: exactly one command in flight
        set_state(&shared, &events, PipelineState::Dispatching);
        let Some(command) = next_command(&shared, &mut cursor, &events) else {
            set_state(&shared, &events, PipelineState::Idle);
            continue;
        };
        events.publish(PipelineEvent::Dispatched {
            kind: command.kind(),
        });
        match interpreter.execute(&command) {
            Ok(()) => {}
            Err(err) if err.is_interrupted() => {
                tracing::debug!(command = %command, "dispatch interrupted by reset");
            }
            Err(err) => {
                let total = shared.rejected.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(command = %command, error = %err, total, "dispatch rejected");
                events.publish(PipelineEvent::Rejected {
                    kind: command.kind(),
                    reason: err.to_string(),
                    total,
                });
                if err.is_channel_closed() || total >= config.max_rejections {
                    tracing::error!(total, "closing pipeline after repeated rejections");
                    set_state(&shared, &events, PipelineState::Closed);
                }
            }
        }
        set_state(&shared, &events, PipelineState::Idle);
    }

    if let Err(err) = interpreter.close_channel() {
        tracing::warn!(error = %err, "channel close failed");
    }
    tracing::debug!("drain thread stopped");
}

fn apply_realtime(
    interpreter: &mut Interpreter,
    shared: &Shared,
    config: &SpoolerConfig,
    events: &EventBus,
    cursor: &mut Option<ProgramCursor>,
) {
    loop {
        let Some(command) = shared.realtime.lock().pop_front() else {
            return;
        };
        tracing::debug!(command = %command, "realtime");
        let result = match command {
            Command::Pause => {
                let result = interpreter.pause();
                if result.is_ok() {
                    set_state(shared, events, PipelineState::Paused);
                }
                result
            }
            Command::Resume => {
                let result = interpreter.resume();
                if result.is_ok() {
                    set_state(shared, events, PipelineState::Idle);
                }
                result
            }
            Command::Reset => {
                let dropped = {
                    let mut queue = shared.queue.lock();
                    let n = queue.len();
                    queue.clear();
                    n
                };
                let had_cursor = cursor.take().is_some();
                shared.cursor_active.store(false, Ordering::SeqCst);
                if dropped > 0 || had_cursor {
                    events.publish(PipelineEvent::QueueLength(0));
                }
                let result = interpreter.reset();
                set_state(shared, events, PipelineState::Idle);
                result
            }
            other => {
                tracing::warn!(command = %other, "non-realtime command in realtime lane");
                Ok(())
            }
        };
        if let Err(err) = result {
            let total = shared.rejected.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(error = %err, total, "realtime rejected");
            events.publish(PipelineEvent::Rejected {
                kind: "realtime",
                reason: err.to_string(),
                total,
            });
            if err.is_channel_closed() || total >= config.max_rejections {
                set_state(shared, events, PipelineState::Closed);
            }
        }
    }
}

fn next_command(
    shared: &Shared,
    cursor: &mut Option<ProgramCursor>,
    events: &EventBus,
) -> Option<Command> {
    loop {
        if let Some(active) = cursor.as_mut() {
            if let Some(command) = active.program.commands().get(active.index) {
                active.index += 1;
                return Some(command.clone());
            }
            let finished = active.program.id();
            *cursor = None;
            shared.cursor_active.store(false, Ordering::SeqCst);
            events.publish(PipelineEvent::JobFinished(finished));
            continue;
        }

        let (entry, len) = {
            let mut queue = shared.queue.lock();
            let entry = queue.pop_front()?;
            (entry, queue.len())
        };
        events.publish(PipelineEvent::QueueLength(len));

        match entry {
            SpoolEntry::Single(command) => return Some(command),
            SpoolEntry::Program(program) => {
                if program.is_empty() {
                    events.publish(PipelineEvent::JobFinished(program.id()));
                    continue;
                }
                tracing::info!(
                    job = %program.id(),
                    label = program.label(),
                    commands = program.len(),
                    "program started"
                );
                *cursor = Some(ProgramCursor { program, index: 0 });
                shared.cursor_active.store(true, Ordering::SeqCst);
            }
        }
    }
}

fn set_state(shared: &Shared, events: &EventBus, target: PipelineState) -> bool {
    {
        let mut state = shared.state.write();
        if !state.can_transition_to(target) {
            return false;
        }
        *state = target;
    }
    events.publish(PipelineEvent::StateChanged(target));
    true
}

fn park(shared: &Shared, timeout: Duration) {
    let mut queue = shared.queue.lock();
    if queue.is_empty() {
        let _ = shared.wake.wait_for(&mut queue, timeout);
    } else {
        drop(queue);
        std::thread::sleep(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SpoolerConfig::default();
        assert_eq!(config.buffer_max, None);
        assert_eq!(config.max_rejections, 8);
        assert_eq!(config.idle_delay, Duration::from_millis(10));
    }
}
