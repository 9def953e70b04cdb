//! MIDI Tuning Standard frequency encoding.
//!
//! A frequency is stored as three 7-bit bytes: the equal-tempered note at or
//! below it, then the distance above that note as a 14-bit fraction of a
//! semitone.

use super::error::{MidiError, Result};

/// Steps per semitone in the 14-bit fraction.
const RESOLUTION: f64 = 16384.0;

/// Concert A, MIDI note 69.
const A4_HZ: f64 = 440.0;
const A4_NOTE: f64 = 69.0;

fn note_frequency(note: f64) -> f64 {
    A4_HZ * 2f64.powf((note - A4_NOTE) / 12.0)
}

/// Converts a frequency in Hz to its three-byte tuning representation.
///
/// # Errors
///
/// Returns `InvalidFrequency` for non-finite or non-positive values and for
/// frequencies below note 0 or above note 127
pub fn frequency_to_bytes(frequency: f64) -> Result<[u8; 3]> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(MidiError::InvalidFrequency(frequency));
    }

    let semitones = A4_NOTE + 12.0 * (frequency / A4_HZ).log2();
    if !(0.0..128.0).contains(&semitones) {
        return Err(MidiError::InvalidFrequency(frequency));
    }
    // Snap values a rounding error below an exact note onto that note
    let note = (semitones + 1e-9).trunc().min(127.0) as u8;

    let lower = note_frequency(f64::from(note));
    let cents = if frequency == lower {
        0.0
    } else {
        1200.0 * (frequency / lower).log2()
    };
    let fraction = (cents / 100.0 * RESOLUTION).round().max(0.0) as u32;

    let msb = (fraction >> 7).min(0x7F) as u8;
    let mut lsb = fraction.saturating_sub(u32::from(msb) << 7).min(0x7F) as u8;
    // 7F 7F 7F means "no change" in the tuning messages
    if note == 0x7F && msb == 0x7F && lsb == 0x7F {
        lsb = 0x7E;
    }

    Ok([note, msb, lsb])
}

/// Converts a three-byte tuning representation back into Hz.
pub fn bytes_to_frequency(bytes: [u8; 3]) -> f64 {
    let base = note_frequency(f64::from(bytes[0]));
    let fraction = f64::from((u32::from(bytes[1]) << 7) + u32::from(bytes[2]));
    let cents = fraction * 100.0 / RESOLUTION;
    base * 2f64.powf(cents / 1200.0)
}
