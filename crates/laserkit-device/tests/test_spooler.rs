//! Spooler pipeline tests
//!
//! These spawn the real drain thread over a loopback channel and check
//! ordering, realtime behavior, the buffer gate, and failure policy.

use laserkit_core::command::{Command, Program};
use laserkit_core::data::PipelineState;
use laserkit_core::error::SpoolerError;
use laserkit_core::event::{EventBus, PipelineEvent};
use laserkit_device::channel::{DeviceChannel, LoopbackChannel, LoopbackProbe};
use laserkit_device::interpreter::{Interpreter, InterpreterConfig};
use laserkit_device::spooler::{Spooler, SpoolerConfig};
use proptest::prelude::*;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn spawn_pipeline(config: SpoolerConfig) -> (Spooler, LoopbackProbe) {
    let mut channel = LoopbackChannel::new();
    let probe = channel.probe();
    channel.open().unwrap();
    let events = EventBus::default();
    let interpreter = Interpreter::new(
        Box::new(channel),
        InterpreterConfig::default(),
        events.clone(),
    );
    let spooler = Spooler::spawn(interpreter, config, events);
    (spooler, probe)
}

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn test_fifo_dispatch_order() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());

    spooler.push(Command::LaserOn).unwrap();
    spooler.push(Command::move_to(10.0, 0.0).unwrap()).unwrap();
    spooler.push(Command::LaserOff).unwrap();

    assert!(spooler.wait_idle(WAIT));
    assert_eq!(probe.written_string(), "IDS1P\nIBjS1P\nIUS1P\n");
    spooler.shutdown();
}

#[test]
fn test_program_dispatches_as_unit() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());
    let mut rx = spooler.subscribe();

    let program = Program::with_commands(
        "square edge",
        vec![
            Command::LaserOn,
            Command::move_to(10.0, 0.0).unwrap(),
            Command::LaserOff,
        ],
    )
    .unwrap();
    let id = spooler.push_program(program).unwrap();

    assert!(spooler.wait_idle(WAIT));
    assert_eq!(probe.written_string(), "IDS1P\nIBjS1P\nIUS1P\n");

    let finished = wait_for(
        || {
            while let Ok(event) = rx.try_recv() {
                if let PipelineEvent::JobFinished(done) = event {
                    return done == id;
                }
            }
            false
        },
        WAIT,
    );
    assert!(finished, "JobFinished event not seen");
    spooler.shutdown();
}

#[test]
fn test_pause_holds_dispatch_and_reset_clears_queue() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());

    spooler.realtime(Command::Pause).unwrap();
    assert!(wait_for(
        || spooler.state() == PipelineState::Paused,
        WAIT
    ));

    for _ in 0..5 {
        spooler.push(Command::Home).unwrap();
    }
    // Dispatch is held, so the queue keeps its depth.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(spooler.queue_len(), 5);

    spooler.realtime(Command::Reset).unwrap();
    assert!(wait_for(
        || spooler.queue_len() == 0 && spooler.state() == PipelineState::Idle,
        WAIT
    ));

    // Only the pause and reset sequences ever reached the wire.
    assert_eq!(probe.written_string(), "PN!\nI*\n");
    spooler.shutdown();
}

#[test]
fn test_resume_releases_held_queue() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());

    spooler.realtime(Command::Pause).unwrap();
    assert!(wait_for(
        || spooler.state() == PipelineState::Paused,
        WAIT
    ));
    spooler.push(Command::Home).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(spooler.queue_len(), 1);

    spooler.realtime(Command::Resume).unwrap();
    assert!(spooler.wait_idle(WAIT));
    assert_eq!(probe.written_string(), "PN!\nPN&\nIPP\n");
    spooler.shutdown();
}

#[test]
fn test_reset_interrupts_wait_in_progress() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());
    let mut rx = spooler.subscribe();

    spooler.push(Command::wait(30.0).unwrap()).unwrap();
    spooler.push(Command::Home).unwrap();

    // Let the wait start, then reset out of it.
    assert!(wait_for(
        || {
            while let Ok(event) = rx.try_recv() {
                if let PipelineEvent::Dispatched { kind: "Wait" } = event {
                    return true;
                }
            }
            false
        },
        WAIT,
    ));
    spooler.realtime(Command::Reset).unwrap();

    assert!(wait_for(
        || spooler.queue_len() == 0 && spooler.state() == PipelineState::Idle,
        WAIT
    ));
    // The queued Home was dropped; only the reset bytes went out.
    assert_eq!(probe.written_string(), "I*\n");
    // An interrupted wait is not a dispatch failure.
    assert_eq!(spooler.rejected(), 0);
    spooler.shutdown();
}

#[test]
fn test_wait_buffer_empty_polls_channel() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());
    probe.script_backlog([60, 30, 0]);

    spooler.push(Command::WaitBufferEmpty).unwrap();
    spooler.push(Command::Home).unwrap();

    assert!(spooler.wait_idle(WAIT));
    assert!(probe.poll_count() >= 3);
    assert_eq!(probe.written_string(), "IPP\n");
    spooler.shutdown();
}

#[test]
fn test_buffer_gate_defers_dispatch() {
    let config = SpoolerConfig {
        buffer_max: Some(10),
        ..SpoolerConfig::default()
    };
    let (spooler, probe) = spawn_pipeline(config);
    probe.script_backlog([100, 100, 0]);

    spooler.push(Command::Home).unwrap();
    assert!(spooler.wait_idle(WAIT));

    // Two gated polls before the third reading let the command through.
    assert!(probe.poll_count() >= 3);
    assert_eq!(probe.written_string(), "IPP\n");
    spooler.shutdown();
}

#[test]
fn test_rejection_threshold_closes_pipeline() {
    let config = SpoolerConfig {
        max_rejections: 4,
        ..SpoolerConfig::default()
    };
    let (spooler, probe) = spawn_pipeline(config);
    probe.fail_next_writes(4);

    for _ in 0..4 {
        spooler.push(Command::Home).unwrap();
    }

    assert!(wait_for(|| spooler.state().is_closed(), WAIT));
    assert_eq!(spooler.rejected(), 4);

    let err = spooler.push(Command::Home).unwrap_err();
    assert_eq!(err, SpoolerError::QueueClosed);
    let err = spooler.realtime(Command::Pause).unwrap_err();
    assert_eq!(err, SpoolerError::QueueClosed);
    spooler.shutdown();
}

#[test]
fn test_clear_queue_keeps_running_program() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());
    let mut rx = spooler.subscribe();

    let program = Program::with_commands(
        "slow",
        vec![Command::wait(0.1).unwrap(), Command::move_to(10.0, 0.0).unwrap()],
    )
    .unwrap();
    spooler.push_program(program).unwrap();
    spooler.push(Command::Home).unwrap();

    // Wait until the program's first command is in flight.
    assert!(wait_for(
        || {
            while let Ok(event) = rx.try_recv() {
                if let PipelineEvent::Dispatched { kind: "Wait" } = event {
                    return true;
                }
            }
            false
        },
        WAIT,
    ));

    // Clearing drops the pending Home but not the running program.
    assert_eq!(spooler.clear_queue(), 1);
    assert!(spooler.wait_idle(WAIT));

    let written = probe.written_string();
    assert_eq!(written, "IBjS1P\n");
    spooler.shutdown();
}

#[test]
fn test_cancel_removes_pending_program() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());

    spooler.realtime(Command::Pause).unwrap();
    assert!(wait_for(
        || spooler.state() == PipelineState::Paused,
        WAIT
    ));

    let program =
        Program::with_commands("doomed", vec![Command::move_to(10.0, 0.0).unwrap()]).unwrap();
    let id = spooler.push_program(program).unwrap();
    spooler.push(Command::Home).unwrap();

    assert!(spooler.cancel(id));
    assert!(!spooler.cancel(id));
    assert_eq!(spooler.queue_len(), 1);

    spooler.realtime(Command::Resume).unwrap();
    assert!(spooler.wait_idle(WAIT));
    assert_eq!(probe.written_string(), "PN!\nPN&\nIPP\n");
    spooler.shutdown();
}

#[test]
fn test_shutdown_is_terminal_and_idempotent() {
    let (spooler, _probe) = spawn_pipeline(SpoolerConfig::default());

    spooler.push(Command::Home).unwrap();
    assert!(spooler.wait_idle(WAIT));

    spooler.shutdown();
    assert!(spooler.state().is_closed());
    assert_eq!(
        spooler.push(Command::Home).unwrap_err(),
        SpoolerError::QueueClosed
    );
    // A second shutdown has nothing left to join.
    spooler.shutdown();
}

#[test]
fn test_wait_idle_waits_for_inflight_dispatch() {
    let (spooler, probe) = spawn_pipeline(SpoolerConfig::default());

    // A true return must mean the popped command finished its trip
    // through the interpreter, not merely that the queue looked empty
    // while it was still mid-dispatch.
    for i in 1..=50u32 {
        let x = f64::from(i);
        spooler.push(Command::rapid_move(x, 0.0).unwrap()).unwrap();
        assert!(spooler.wait_idle(WAIT));
        assert_eq!(spooler.snapshot().position.x, x);
    }
    assert!(probe.written_string().ends_with("S1P\n"));
    spooler.shutdown();
}

#[test]
fn test_realtime_rejects_queued_kinds() {
    let (spooler, _probe) = spawn_pipeline(SpoolerConfig::default());

    assert!(matches!(
        spooler.realtime(Command::Home).unwrap_err(),
        SpoolerError::Command(_)
    ));
    assert!(matches!(
        spooler.push(Command::Reset).unwrap_err(),
        SpoolerError::Command(_)
    ));
    spooler.shutdown();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Dispatch order always matches push order, whatever the mix.
    #[test]
    fn prop_dispatch_preserves_push_order(choices in proptest::collection::vec(0u8..5, 1..12)) {
        let (spooler, _probe) = spawn_pipeline(SpoolerConfig::default());
        let mut rx = spooler.subscribe();

        let commands: Vec<Command> = choices
            .iter()
            .map(|c| match c {
                0 => Command::LaserOn,
                1 => Command::LaserOff,
                2 => Command::Home,
                3 => Command::SetAbsolute,
                _ => Command::SetIncremental,
            })
            .collect();
        let expected: Vec<&'static str> = commands.iter().map(|c| c.kind()).collect();

        for command in commands {
            spooler.push(command).unwrap();
        }
        prop_assert!(spooler.wait_idle(WAIT));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::Dispatched { kind } = event {
                seen.push(kind);
            }
        }
        spooler.shutdown();
        prop_assert_eq!(seen, expected);
    }
}
