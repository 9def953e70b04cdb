//! Standard MIDI File assembly.
//!
//! This module provides the event model, the per-track assembler that sorts,
//! deduplicates and deinterleaves events, and the file assembler that routes
//! events to tracks and writes the finished SMF bytes.

mod config;
mod error;
mod event;
mod file;
mod track;
pub mod tuning;
pub mod vlq;

pub use config::{FileConfig, SmfFormat};
pub use error::{MidiError, Result};
pub use event::{AccidentalType, DedupKey, MidiEvent, Mode, TimeSignature, TimedEvent};
pub use file::MidiFile;
pub use track::{Track, END_OF_TRACK};

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Default ticks per quarter note for new files.
pub const TICKS_PER_QUARTER: u16 = 960;

/// Microseconds in one minute, for BPM to tempo conversion.
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Largest value the 24-bit tempo field can hold.
const MAX_TEMPO_MICROSECONDS: u32 = 0x00FF_FFFF;

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// # Examples
///
/// ```
/// use smfwriter::midi::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Converts a time in quarter notes (beats) to ticks, truncating any
/// fraction of a tick.
///
/// # Errors
///
/// Returns `InvalidTime` for negative or non-finite times and for times
/// that do not fit in 32 bits of ticks
pub fn quarter_to_tick(quarters: f64, ticks_per_quarter: u16) -> Result<u32> {
    time_to_tick(quarters * f64::from(ticks_per_quarter))
        .map_err(|_| MidiError::InvalidTime(quarters))
}

/// Converts ticks back to quarter notes.
pub fn tick_to_quarter(tick: u32, ticks_per_quarter: u16) -> f64 {
    f64::from(tick) / f64::from(ticks_per_quarter)
}

/// Validates a time that is already expressed in ticks.
pub(crate) fn time_to_tick(ticks: f64) -> Result<u32> {
    if !ticks.is_finite() || ticks < 0.0 || ticks >= f64::from(u32::MAX) + 1.0 {
        return Err(MidiError::InvalidTime(ticks));
    }
    Ok(ticks.trunc() as u32)
}

/// Converts beats per minute to microseconds per quarter note.
///
/// # Errors
///
/// Returns `InvalidTempo` if the result does not fit the 24-bit tempo field
pub fn bpm_to_microseconds(bpm: f64) -> Result<u32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(MidiError::InvalidTempo(bpm));
    }
    let micros = (MICROSECONDS_PER_MINUTE / bpm).trunc();
    if micros < 1.0 || micros > f64::from(MAX_TEMPO_MICROSECONDS) {
        return Err(MidiError::InvalidTempo(bpm));
    }
    Ok(micros as u32)
}

/// Calculates the power of 2 for a time signature denominator.
///
/// E.g., 4 -> 2 (2^2 = 4), 8 -> 3 (2^3 = 8). Returns `None` when the
/// denominator is not a power of two.
pub fn denominator_to_power(denom: u8) -> Option<u8> {
    if denom.is_power_of_two() {
        Some(denom.trailing_zeros() as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_to_name(60), "C4");
        assert_eq!(note_to_name(69), "A4");
        assert_eq!(note_to_name(0), "C-1");
        assert_eq!(note_to_name(127), "G9");
    }

    #[test]
    fn test_tick_conversions() {
        assert_eq!(quarter_to_tick(1.0, 960).unwrap(), 960);
        assert_eq!(quarter_to_tick(0.5, 960).unwrap(), 480);
        // Fractions of a tick are truncated
        assert_eq!(quarter_to_tick(0.0001, 960).unwrap(), 0);
        assert_eq!(tick_to_quarter(1440, 960), 1.5);
        assert!(quarter_to_tick(-0.5, 960).is_err());
        assert!(quarter_to_tick(f64::INFINITY, 960).is_err());
        assert!(quarter_to_tick(1e12, 960).is_err());
    }

    #[test]
    fn test_tempo_conversion() {
        assert_eq!(bpm_to_microseconds(120.0).unwrap(), 500_000);
        assert_eq!(bpm_to_microseconds(90.0).unwrap(), 666_666);
        assert!(bpm_to_microseconds(0.0).is_err());
        assert!(bpm_to_microseconds(-1.0).is_err());
        assert!(bpm_to_microseconds(1.0).is_err()); // 60,000,000 overflows 24 bits
    }

    #[test]
    fn test_denominator_power() {
        assert_eq!(denominator_to_power(4), Some(2));
        assert_eq!(denominator_to_power(8), Some(3));
        assert_eq!(denominator_to_power(2), Some(1));
        assert_eq!(denominator_to_power(1), Some(0));
        assert_eq!(denominator_to_power(6), None);
        assert_eq!(denominator_to_power(0), None);
    }
}
