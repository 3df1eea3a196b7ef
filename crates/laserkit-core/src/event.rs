//! Pipeline event fan-out
//!
//! The spooler and interpreter publish progress through a broadcast bus.
//! Subscribers (the TCP server, the CLI, tests) receive every event
//! published after they subscribe; slow subscribers miss old events
//! rather than blocking the pipeline.

use crate::command::{JobId, SignalValue};
use crate::data::{DriverMode, PipelineState, Position};
use std::fmt;
use tokio::sync::broadcast;

/// Events published by the command pipeline
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Entries waiting in the spooler queue
    QueueLength(usize),
    /// Bytes outstanding in the device buffer
    BufferLevel(usize),
    /// The driver switched modes
    DriverMode(DriverMode),
    /// The pipeline changed lifecycle state
    StateChanged(PipelineState),
    /// A motion command moved the tracked position
    PositionChanged {
        /// Position before the motion
        from: Position,
        /// Position after the motion
        to: Position,
    },
    /// A command was handed to the interpreter
    Dispatched {
        /// Command kind
        kind: &'static str,
    },
    /// A dispatch failed and was counted against the rejection threshold
    Rejected {
        /// Command kind
        kind: &'static str,
        /// Failure text
        reason: String,
        /// Rejections seen since startup
        total: u64,
    },
    /// An out-of-band signal from a `Signal` command
    Signal {
        /// Signal name
        name: String,
        /// Signal payload
        value: SignalValue,
    },
    /// A program dispatched its last command
    JobFinished(JobId),
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::QueueLength(n) => write!(f, "queue length {}", n),
            PipelineEvent::BufferLevel(n) => write!(f, "buffer level {}", n),
            PipelineEvent::DriverMode(mode) => write!(f, "driver mode {}", mode),
            PipelineEvent::StateChanged(state) => write!(f, "pipeline {}", state),
            PipelineEvent::PositionChanged { from, to } => {
                write!(f, "position {} -> {}", from, to)
            }
            PipelineEvent::Dispatched { kind } => write!(f, "dispatched {}", kind),
            PipelineEvent::Rejected {
                kind,
                reason,
                total,
            } => write!(f, "rejected {} ({}): {}", kind, total, reason),
            PipelineEvent::Signal { name, value } => write!(f, "signal {}={}", name, value),
            PipelineEvent::JobFinished(id) => write!(f, "job {} finished", id),
        }
    }
}

/// Broadcast bus for pipeline events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        let receiver = self.sender.subscribe();
        tracing::debug!(
            subscribers = self.sender.receiver_count(),
            "event subscriber added"
        );
        receiver
    }

    /// Publish an event, returning the number of subscribers that saw it
    pub fn publish(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        // 256 events of slack covers a busy queue without unbounded growth
        Self::new(256)
    }
}
