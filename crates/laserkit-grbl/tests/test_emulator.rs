//! GRBL emulator protocol tests
//!
//! Drive the emulator with raw byte streams over a recording sink and
//! check both sides of the contract: the vocabulary commands submitted
//! to the pipeline and the response lines answered on the wire.

use laserkit_core::command::{Command, CommandSink, JobId, Program};
use laserkit_core::data::{DriverMode, Position, StatusSnapshot};
use laserkit_core::error::SpoolerError;
use laserkit_core::units::MILS_PER_MM;
use laserkit_grbl::{GrblConfig, GrblEmulator, GrblError, GrblResponse, GrblSettingValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct RecordingSink {
    commands: Mutex<Vec<Command>>,
    realtime: Mutex<Vec<Command>>,
    snapshot: Mutex<StatusSnapshot>,
    closed: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        RecordingSink {
            commands: Mutex::new(Vec::new()),
            realtime: Mutex::new(Vec::new()),
            snapshot: Mutex::new(StatusSnapshot::new()),
            closed: AtomicBool::new(false),
        }
    }
}

impl RecordingSink {
    fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.commands.lock().unwrap())
    }

    fn realtime_commands(&self) -> Vec<Command> {
        self.realtime.lock().unwrap().clone()
    }

    fn set_snapshot(&self, snapshot: StatusSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl CommandSink for RecordingSink {
    fn submit(&self, command: Command) -> Result<(), SpoolerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SpoolerError::QueueClosed);
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }

    fn submit_program(&self, program: Program) -> Result<JobId, SpoolerError> {
        let id = program.id();
        self.commands
            .lock()
            .unwrap()
            .extend(program.commands().iter().cloned());
        Ok(id)
    }

    fn submit_realtime(&self, command: Command) -> Result<(), SpoolerError> {
        self.realtime.lock().unwrap().push(command);
        Ok(())
    }

    fn status(&self) -> StatusSnapshot {
        *self.snapshot.lock().unwrap()
    }
}

fn session() -> (GrblEmulator, Arc<RecordingSink>) {
    session_with(GrblConfig::default())
}

fn session_with(config: GrblConfig) -> (GrblEmulator, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let emulator = GrblEmulator::new(sink.clone(), config);
    (emulator, sink)
}

fn wire(responses: &[GrblResponse]) -> String {
    responses.iter().map(|r| r.to_wire()).collect()
}

#[test]
fn test_welcome_banner() {
    assert_eq!(GrblResponse::Welcome.to_wire(), "Grbl 1.1e ['$' for help]\r\n");
}

#[test]
fn test_empty_line_acks() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"\n");
    assert_eq!(wire(&responses), "ok\r\n");
    assert!(sink.take_commands().is_empty());
}

#[test]
fn test_help_line() {
    let (mut emulator, _sink) = session();
    let responses = emulator.write(b"$\n");
    assert_eq!(responses, vec![GrblResponse::Help, GrblResponse::Ok]);
    assert_eq!(
        responses[0].to_wire(),
        "[HLP:$$ $# $G $I $N $x=val $Nx=line $J=line $SLP $C $X $H ~ ! ? ctrl-x]\r\n"
    );
}

#[test]
fn test_settings_dump_order_and_formats() {
    let (mut emulator, _sink) = session();
    let responses = emulator.write(b"$$\n");

    // 34 settings followed by the closing ok.
    assert_eq!(responses.len(), 35);
    assert_eq!(responses[0].to_wire(), "$0=10\r\n");
    assert_eq!(responses.last(), Some(&GrblResponse::Ok));

    let numbers: Vec<u16> = responses
        .iter()
        .filter_map(|r| match r {
            GrblResponse::Setting { number, .. } => Some(*number),
            _ => None,
        })
        .collect();
    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    assert_eq!(numbers, sorted);

    let dump = wire(&responses);
    assert!(dump.contains("$11=0.010\r\n"));
    assert!(dump.contains("$30=1000\r\n"));
    assert!(dump.contains("$132=200.000\r\n"));
}

#[test]
fn test_setting_assignment_round_trips() {
    let (mut emulator, _sink) = session();
    assert_eq!(wire(&emulator.write(b"$1=30\n")), "ok\r\n");

    let responses = emulator.write(b"$$\n");
    let updated = responses.iter().find(|r| {
        matches!(r, GrblResponse::Setting { number: 1, .. })
    });
    assert_eq!(
        updated,
        Some(&GrblResponse::Setting {
            number: 1,
            value: GrblSettingValue::Int(30),
        })
    );
}

#[test]
fn test_unknown_setting_leaves_table_unchanged() {
    let (mut emulator, _sink) = session();
    assert_eq!(wire(&emulator.write(b"$99=1\n")), "error:3\r\n");
    assert_eq!(wire(&emulator.write(b"$1=abc\n")), "error:2\r\n");

    let responses = emulator.write(b"$$\n");
    assert_eq!(responses.len(), 35);
    assert_eq!(responses[1].to_wire(), "$1=25\r\n");
}

#[test]
fn test_unsupported_dollar_commands() {
    let (mut emulator, sink) = session();
    assert_eq!(wire(&emulator.write(b"$G\n")), "error:3\r\n");
    assert_eq!(wire(&emulator.write(b"$SLP\n")), "error:3\r\n");
    assert_eq!(wire(&emulator.write(b"$J=G91X1\n")), "error:3\r\n");
    assert!(sink.take_commands().is_empty());
}

#[test]
fn test_home_command() {
    let (mut emulator, sink) = session();
    assert_eq!(wire(&emulator.write(b"$H\n")), "ok\r\n");
    assert_eq!(sink.take_commands(), vec![Command::Home]);
}

#[test]
fn test_home_command_with_adjust() {
    let config = GrblConfig {
        home_adjust: Some((100.0, 50.0)),
        ..GrblConfig::default()
    };
    let (mut emulator, sink) = session_with(config);
    emulator.write(b"$H\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::Home, Command::rapid_move(100.0, 50.0).unwrap()]
    );
}

#[test]
fn test_absolute_then_incremental_moves() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"G90\nG1 X10 Y10\nG91\nG1 X5 Y5\n");
    assert_eq!(wire(&responses), "ok\r\nok\r\nok\r\nok\r\n");

    assert_eq!(
        sink.take_commands(),
        vec![
            Command::SetAbsolute,
            Command::ModeCompactSet,
            Command::LaserOn,
            Command::move_to(10.0 * MILS_PER_MM, 10.0 * MILS_PER_MM).unwrap(),
            Command::SetIncremental,
            Command::ModeCompactSet,
            Command::LaserOn,
            Command::move_to(5.0 * MILS_PER_MM, 5.0 * MILS_PER_MM).unwrap(),
        ]
    );
}

#[test]
fn test_rapid_move_forces_laser_off() {
    let (mut emulator, sink) = session();
    emulator.write(b"G0 X10\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::LaserOff,
            Command::ModeDefault,
            Command::LaserOff,
            Command::move_to(10.0 * MILS_PER_MM, 0.0).unwrap(),
        ]
    );
}

#[test]
fn test_word_order_speed_and_power_before_motion() {
    let (mut emulator, sink) = session();
    emulator.write(b"G90 G1 X10 Y10 F600 S250\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::SetAbsolute,
            Command::set_speed(600.0 / (MILS_PER_MM * 60.0)).unwrap(),
            Command::set_power(250.0).unwrap(),
            Command::ModeCompactSet,
            Command::LaserOn,
            Command::move_to(10.0 * MILS_PER_MM, 10.0 * MILS_PER_MM).unwrap(),
        ]
    );
}

#[test]
fn test_laser_master_flag() {
    let (mut emulator, sink) = session();

    emulator.write(b"M5\n");
    assert_eq!(sink.take_commands(), vec![Command::LaserOff]);

    // Master off: cut moves stay dark.
    emulator.write(b"G1 X10\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeCompactSet,
            Command::move_to(10.0 * MILS_PER_MM, 0.0).unwrap(),
        ]
    );

    emulator.write(b"M3\n");
    assert!(sink.take_commands().is_empty());

    emulator.write(b"G1 X20\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeCompactSet,
            Command::LaserOn,
            Command::move_to(20.0 * MILS_PER_MM, 0.0).unwrap(),
        ]
    );
}

#[test]
fn test_arcs_degrade_to_moves_without_laser_arm() {
    let (mut emulator, sink) = session();
    emulator.write(b"G2 X10 Y5\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeCompactSet,
            Command::move_to(10.0 * MILS_PER_MM, 5.0 * MILS_PER_MM).unwrap(),
        ]
    );
}

#[test]
fn test_power_passes_raw_values() {
    let (mut emulator, sink) = session();

    // Fractions pass through untouched; the interpreter rescales them.
    assert_eq!(wire(&emulator.write(b"S0.5\n")), "ok\r\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::set_power(0.5).unwrap()]
    );

    assert_eq!(wire(&emulator.write(b"S500\n")), "ok\r\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::set_power(500.0).unwrap()]
    );

    assert_eq!(wire(&emulator.write(b"S1500\n")), "error:2\r\n");
    assert!(sink.take_commands().is_empty());

    assert_eq!(wire(&emulator.write(b"S\n")), "error:2\r\n");
}

#[test]
fn test_feed_mode_conversions() {
    let (mut emulator, sink) = session();

    emulator.write(b"F600\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::set_speed(600.0 / (MILS_PER_MM * 60.0)).unwrap()]
    );

    // G93 inverse time: F divides instead of multiplying.
    emulator.write(b"G93\nF2\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::set_speed((MILS_PER_MM * 60.0) / 2.0).unwrap()]
    );

    emulator.write(b"G94\nF600\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::set_speed(600.0 / (MILS_PER_MM * 60.0)).unwrap()]
    );

    assert_eq!(wire(&emulator.write(b"F\n")), "error:2\r\n");
}

#[test]
fn test_repeated_feed_and_power_words_submit_each() {
    let (mut emulator, sink) = session();

    // Every F word reaches the pipeline; the device applies the last.
    assert_eq!(wire(&emulator.write(b"F100 F600\n")), "ok\r\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::set_speed(100.0 / (MILS_PER_MM * 60.0)).unwrap(),
            Command::set_speed(600.0 / (MILS_PER_MM * 60.0)).unwrap(),
        ]
    );

    assert_eq!(wire(&emulator.write(b"S100 S700\n")), "ok\r\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::set_power(100.0).unwrap(),
            Command::set_power(700.0).unwrap(),
        ]
    );
}

#[test]
fn test_inch_and_mm_scaling() {
    let (mut emulator, sink) = session();

    emulator.write(b"G20\nG0 X1\n");
    let commands = sink.take_commands();
    assert_eq!(
        commands.last(),
        Some(&Command::move_to(1000.0, 0.0).unwrap())
    );

    emulator.write(b"G21\nG0 X1\n");
    let commands = sink.take_commands();
    assert_eq!(
        commands.last(),
        Some(&Command::move_to(MILS_PER_MM, 0.0).unwrap())
    );
}

#[test]
fn test_dwell() {
    let (mut emulator, sink) = session();

    emulator.write(b"G4 P500\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefaultSet, Command::wait(0.5).unwrap()]
    );

    emulator.write(b"G4 S2\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefaultSet, Command::wait(2.0).unwrap()]
    );
}

#[test]
fn test_program_pause_drains_buffer() {
    let (mut emulator, sink) = session();
    emulator.write(b"M0\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefaultSet, Command::WaitBufferEmpty]
    );
}

#[test]
fn test_program_end_stops_the_line() {
    let (mut emulator, sink) = session();

    assert_eq!(wire(&emulator.write(b"M2\n")), "ok\r\n");
    assert!(sink.take_commands().is_empty());

    // M words process first, so M2 ends the line before the motion.
    assert_eq!(wire(&emulator.write(b"G1 X10 M2\n")), "ok\r\n");
    assert!(sink.take_commands().is_empty());

    assert_eq!(wire(&emulator.write(b"M30\n")), "ok\r\n");
}

#[test]
fn test_coolant_signals() {
    let (mut emulator, sink) = session();
    emulator.write(b"M8\nM9\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::signal("coolant", true).unwrap(),
            Command::signal("coolant", false).unwrap(),
        ]
    );
}

#[test]
fn test_unsupported_codes() {
    let (mut emulator, sink) = session();
    assert_eq!(wire(&emulator.write(b"M99\n")), "error:20\r\n");
    assert_eq!(wire(&emulator.write(b"G33\n")), "error:20\r\n");
    assert_eq!(wire(&emulator.write(b"G\n")), "error:2\r\n");
    assert_eq!(wire(&emulator.write(b"M\n")), "error:20\r\n");
    // Only the XY plane exists.
    assert_eq!(wire(&emulator.write(b"G18\n")), "error:2\r\n");
    assert!(sink.take_commands().is_empty());
}

#[test]
fn test_recognized_ignored_codes() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"G17\nG54\nG92\nG10 L2\nM7\nM56\n");
    assert_eq!(wire(&responses), "ok\r\nok\r\nok\r\nok\r\nok\r\nok\r\n");
    assert!(sink.take_commands().is_empty());
}

#[test]
fn test_realtime_bytes_act_mid_line() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"G1 X1!0 Y2\n");

    // The '!' acted immediately and produced no response line.
    assert_eq!(wire(&responses), "ok\r\n");
    assert_eq!(sink.realtime_commands(), vec![Command::Pause]);

    // The surrounding line reassembled as G1 X10 Y2.
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeCompactSet,
            Command::LaserOn,
            Command::move_to(10.0 * MILS_PER_MM, 2.0 * MILS_PER_MM).unwrap(),
        ]
    );

    emulator.write(b"~\x18");
    assert_eq!(
        sink.realtime_commands(),
        vec![Command::Pause, Command::Resume, Command::Reset]
    );
}

#[test]
fn test_status_query_mid_line() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"G90?\n");

    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[0],
        GrblResponse::Status(
            "<Idle|MPos:0.000000,0.000000,0.000000|FS:0.000000,1000>".to_string()
        )
    );
    assert_eq!(responses[1], GrblResponse::Ok);
    assert_eq!(sink.take_commands(), vec![Command::SetAbsolute]);
}

#[test]
fn test_status_reflects_live_snapshot() {
    let (mut emulator, sink) = session();
    sink.set_snapshot(
        StatusSnapshot::new()
            .with_position(Position::new(10.0 * MILS_PER_MM, -5.0 * MILS_PER_MM))
            .with_speed(600.0 / (MILS_PER_MM * 60.0))
            .with_power(250.0)
            .with_driver_mode(DriverMode::Compact),
    );

    let responses = emulator.write(b"?");
    assert_eq!(
        responses,
        vec![GrblResponse::Status(
            "<Busy|MPos:10.000000,-5.000000,0.000000|FS:600.000000,250>".to_string()
        )]
    );
}

#[test]
fn test_backspace_edits_the_buffer() {
    let (mut emulator, sink) = session();
    emulator.write(b"G0 X9\x085\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::LaserOff,
            Command::ModeDefault,
            Command::LaserOff,
            Command::move_to(5.0 * MILS_PER_MM, 0.0).unwrap(),
        ]
    );
}

#[test]
fn test_comments_are_stripped() {
    let (mut emulator, sink) = session();
    let responses = emulator.write(b"G0 X5 (jog clear) ; and stop\n(only a comment)\n");
    assert_eq!(wire(&responses), "ok\r\nok\r\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::LaserOff,
            Command::ModeDefault,
            Command::LaserOff,
            Command::move_to(5.0 * MILS_PER_MM, 0.0).unwrap(),
        ]
    );
}

#[test]
fn test_g28_returns_to_stored_position() {
    let config = GrblConfig {
        home_adjust: Some((100.0, 50.0)),
        ..GrblConfig::default()
    };
    let (mut emulator, sink) = session_with(config);

    // Storing needs both axes and emits nothing.
    assert_eq!(wire(&emulator.write(b"G28.1 X3 Y4\n")), "ok\r\n");
    assert!(sink.take_commands().is_empty());

    emulator.write(b"G28\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeDefaultSet,
            Command::Home,
            Command::rapid_move(100.0, 50.0).unwrap(),
            Command::rapid_move(3.0, 4.0).unwrap(),
        ]
    );
}

#[test]
fn test_g28_without_stored_position() {
    let (mut emulator, sink) = session();
    emulator.write(b"G28\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefaultSet, Command::Home]
    );

    emulator.write(b"G28.2\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefault, Command::Home]
    );
}

#[test]
fn test_g28_3_restores_given_axes() {
    let (mut emulator, sink) = session();
    emulator.write(b"G28.3 X7\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeDefault,
            Command::Home,
            Command::rapid_move(7.0, 0.0).unwrap(),
        ]
    );

    emulator.write(b"G28.3 X7 Y8\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeDefault,
            Command::Home,
            Command::rapid_move(7.0, 0.0).unwrap(),
            Command::rapid_move(0.0, 8.0).unwrap(),
        ]
    );
}

#[test]
fn test_g30_second_stored_position() {
    let (mut emulator, sink) = session();

    assert_eq!(wire(&emulator.write(b"G30.1 X2 Y6\n")), "ok\r\n");
    assert!(sink.take_commands().is_empty());

    emulator.write(b"G30\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::ModeDefault,
            Command::Home,
            Command::rapid_move(2.0, 6.0).unwrap(),
        ]
    );
}

#[test]
fn test_partial_store_falls_through_to_motion() {
    let (mut emulator, sink) = session();

    // One axis is not enough to store; the leftover X becomes motion.
    emulator.write(b"G30.1 X1\n");
    assert_eq!(
        sink.take_commands(),
        vec![
            Command::LaserOff,
            Command::ModeDefault,
            Command::LaserOff,
            Command::move_to(MILS_PER_MM, 0.0).unwrap(),
        ]
    );

    emulator.write(b"G30\n");
    assert_eq!(
        sink.take_commands(),
        vec![Command::ModeDefault, Command::Home]
    );
}

#[test]
fn test_axis_flip() {
    let config = GrblConfig {
        flip_x: -1.0,
        ..GrblConfig::default()
    };
    let (mut emulator, sink) = session_with(config);
    emulator.write(b"G0 X10 Y10\n");
    assert_eq!(
        sink.take_commands().last(),
        Some(&Command::move_to(-10.0 * MILS_PER_MM, 10.0 * MILS_PER_MM).unwrap())
    );
}

#[test]
fn test_closed_pipeline_reports_locked_out() {
    let (mut emulator, sink) = session();
    sink.close();
    let responses = emulator.write(b"G90\n");
    assert_eq!(responses, vec![GrblResponse::Error(GrblError::LockedOut)]);
    assert_eq!(wire(&responses), "error:9\r\n");
}
