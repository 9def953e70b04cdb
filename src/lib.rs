//! smfwriter - A Standard MIDI File writer.
//!
//! This library collects notes, controller changes, tempo and meta events on
//! any number of tracks and writes them out as a byte-exact Standard MIDI
//! File (format 0 or 1).

pub mod midi;

// Re-export commonly used types
pub use midi::{
    AccidentalType, FileConfig, MidiError, MidiFile, Mode, SmfFormat, TimeSignature, Track,
    TICKS_PER_QUARTER,
};
