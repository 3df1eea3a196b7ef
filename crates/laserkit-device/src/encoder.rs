//! LHYMICRO-GL byte encoding
//!
//! The wire protocol is a terse ASCII code understood by Lhystudios
//! M2-family controller boards:
//! - Single-letter direction codes latch an axis direction
//! - Distances encode as letters for short runs, `z` blocks of 255 mils,
//!   and three-digit decimals for the remainder
//! - Fixed sequences enter and leave the board's program mode, home the
//!   rails, and carry realtime pause/resume/reset

/// Step right (positive X)
pub const CODE_RIGHT: u8 = b'B';
/// Step left (negative X)
pub const CODE_LEFT: u8 = b'T';
/// Step toward the top rail (negative Y)
pub const CODE_TOP: u8 = b'L';
/// Step toward the bottom rail (positive Y)
pub const CODE_BOTTOM: u8 = b'R';
/// Step both latched axes together
pub const CODE_ANGLE: u8 = b'M';
/// Energize the laser
pub const CODE_LASER_ON: u8 = b'D';
/// De-energize the laser
pub const CODE_LASER_OFF: u8 = b'U';

/// Home the rails
pub const SEQ_HOME: &[u8] = b"IPP\n";
/// Lock the rail steppers
pub const SEQ_RAIL_LOCK: &[u8] = b"IS1P\n";
/// Release the rail steppers
pub const SEQ_RAIL_UNLOCK: &[u8] = b"IS2P\n";
/// Abort whatever the board is doing
pub const SEQ_ABORT: &[u8] = b"I\n";
/// Leave compact mode and return to default mode
pub const SEQ_COMPACT_EXIT: &[u8] = b"FNSE-\n";
/// Realtime pause
pub const SEQ_REALTIME_PAUSE: &[u8] = b"PN!\n";
/// Realtime resume
pub const SEQ_REALTIME_RESUME: &[u8] = b"PN&\n";
/// Realtime reset
pub const SEQ_REALTIME_RESET: &[u8] = b"I*\n";

/// Encode a distance in mils
///
/// Runs of 255 emit `z`; a remainder of 52 or more emits three decimal
/// digits; shorter remainders use the letter table (`a`..`y` for 1 to 25,
/// `|a`..`|z` for 26 to 51). Zero encodes as nothing.
pub fn encode_distance(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    while v >= 255 {
        out.push(b'z');
        v -= 255;
    }
    if v >= 52 {
        out.extend_from_slice(format!("{:03}", v).as_bytes());
    } else if v >= 26 {
        out.push(b'|');
        out.push(b'a' + (v - 26) as u8);
    } else if v >= 1 {
        out.push(b'a' + (v - 1) as u8);
    }
    out
}

// M2 stepper clock constant for the variable-speed table.
const PERIOD_SCALE: f64 = 195_758.0;

/// Speed code word for M2-family boards
///
/// The board preloads a 16-bit period counter per step, so faster speeds
/// produce larger preload words. `CV` selects the variable-speed table;
/// the preload follows as five decimal digits.
pub fn speed_code(speed: f64) -> Vec<u8> {
    let period = if speed <= 0.0 {
        65_535.0
    } else {
        (PERIOD_SCALE / speed).round().clamp(1.0, 65_535.0)
    };
    let preload = 65_536.0 - period;
    format!("CV{:05}", preload as u32).into_bytes()
}
