//! Loopback channel
//!
//! Records every write instead of talking to hardware. A `LoopbackProbe`
//! taken before the channel moves into the pipeline lets tests inspect
//! traffic, script buffer backlog readings, and inject write failures.

use super::{ChannelResult, DeviceChannel};
use laserkit_core::error::ChannelError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct LoopbackShared {
    written: Mutex<Vec<u8>>,
    backlog: Mutex<VecDeque<usize>>,
    fail_writes: Mutex<u32>,
    polls: AtomicUsize,
}

/// Channel that records writes in memory
#[derive(Debug)]
pub struct LoopbackChannel {
    name: String,
    open: bool,
    shared: Arc<LoopbackShared>,
}

impl LoopbackChannel {
    /// Create a closed loopback channel named `loopback`
    pub fn new() -> Self {
        Self::named("loopback")
    }

    /// Create a closed loopback channel with a custom name
    pub fn named(name: impl Into<String>) -> Self {
        LoopbackChannel {
            name: name.into(),
            open: false,
            shared: Arc::new(LoopbackShared::default()),
        }
    }

    /// Inspection handle that stays valid after the channel is moved
    /// into the pipeline
    pub fn probe(&self) -> LoopbackProbe {
        LoopbackProbe {
            shared: self.shared.clone(),
        }
    }
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceChannel for LoopbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> ChannelResult<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> ChannelResult<()> {
        if !self.open {
            return Err(ChannelError::Closed {
                name: self.name.clone(),
            });
        }
        {
            let mut fail = self.shared.fail_writes.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(ChannelError::Rejected {
                    name: self.name.clone(),
                    reason: "scripted write failure".to_string(),
                });
            }
        }
        self.shared.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn outstanding_length(&self) -> usize {
        self.shared.polls.fetch_add(1, Ordering::Relaxed);
        self.shared.backlog.lock().pop_front().unwrap_or(0)
    }
}

/// Inspection handle for a `LoopbackChannel`
#[derive(Debug, Clone)]
pub struct LoopbackProbe {
    shared: Arc<LoopbackShared>,
}

impl LoopbackProbe {
    /// Copy of all bytes written so far
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// Written bytes decoded as text
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.shared.written.lock()).into_owned()
    }

    /// Drain and return all bytes written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.written.lock())
    }

    /// Script the next `outstanding_length` readings; once the script
    /// drains, readings return zero
    pub fn script_backlog(&self, readings: impl IntoIterator<Item = usize>) {
        self.shared.backlog.lock().extend(readings);
    }

    /// Make the next `count` writes fail with a rejection
    pub fn fail_next_writes(&self, count: u32) {
        *self.shared.fail_writes.lock() += count;
    }

    /// How many times `outstanding_length` has been read
    pub fn poll_count(&self) -> usize {
        self.shared.polls.load(Ordering::Relaxed)
    }
}
