//! Error type shared by every stage of the writer.
//!
//! Validation errors are raised at the add-event boundary so that a bad value
//! never reaches the byte stream. I/O errors are only produced by the final
//! write and are passed through unchanged.

use thiserror::Error;

/// Errors that can occur while building or writing a MIDI file.
#[derive(Debug, Error)]
pub enum MidiError {
    /// Channel outside 0-15.
    #[error("channel {0} out of range (0-15)")]
    InvalidChannel(u8),

    /// A 7-bit data value (pitch, velocity, controller, program...) outside 0-127.
    #[error("{field} {value} out of range (0-127)")]
    DataOutOfRange { field: &'static str, value: u32 },

    /// Pitch wheel value outside the signed 14-bit range.
    #[error("pitch wheel value {0} out of range (-8192..=8191)")]
    PitchWheelOutOfRange(i16),

    /// Negative, NaN or otherwise unrepresentable event time.
    #[error("invalid event time {0}")]
    InvalidTime(f64),

    /// Tempo that cannot be stored in the 24-bit microseconds field.
    #[error("invalid tempo {0} bpm")]
    InvalidTempo(f64),

    #[error("invalid time signature: {0}")]
    InvalidTimeSignature(String),

    #[error("invalid key signature: {0} accidentals (0-7)")]
    InvalidKeySignature(u8),

    /// Frequency outside what the tuning standard can express.
    #[error("frequency {0} Hz cannot be expressed as a MIDI tuning value")]
    InvalidFrequency(f64),

    /// Text containing characters outside ISO-8859-1.
    #[error("character {0:?} cannot be encoded as ISO-8859-1")]
    UnencodableText(char),

    #[error("track {index} out of range ({count} tracks)")]
    TrackOutOfRange { index: usize, count: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An event was added after the file or track was finalized.
    #[error("cannot add events after the file has been closed")]
    Closed,

    /// A variable-length quantity ran past the end of the buffer.
    #[error("truncated variable-length quantity")]
    TruncatedVlq,

    /// A variable-length quantity does not fit in 32 bits.
    #[error("variable-length quantity overflows 32 bits")]
    VlqOverflow,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MidiError>;

/// Checks that a channel fits the low nibble of a status byte.
pub(crate) fn check_channel(channel: u8) -> Result<u8> {
    if channel > 15 {
        return Err(MidiError::InvalidChannel(channel));
    }
    Ok(channel)
}

/// Checks that a data byte has its high bit clear.
pub(crate) fn check_data(field: &'static str, value: u8) -> Result<u8> {
    if value > 127 {
        return Err(MidiError::DataOutOfRange {
            field,
            value: u32::from(value),
        });
    }
    Ok(value)
}
