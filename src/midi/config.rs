//! File-level configuration.
//!
//! Everything that shapes the output without being an event lives here, so a
//! caller can keep it in a JSON file next to the events it produces.

use super::error::{MidiError, Result};
use super::TICKS_PER_QUARTER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// SMF format selector written to the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmfFormat {
    /// Format 0: every track is written as-is, no tempo track is added.
    SingleTrack,
    /// Format 1: a tempo-map track is prepended to the caller's tracks.
    #[default]
    MultiTrack,
}

impl SmfFormat {
    /// Value stored in the header's format field.
    pub fn as_u16(self) -> u16 {
        match self {
            SmfFormat::SingleTrack => 0,
            SmfFormat::MultiTrack => 1,
        }
    }
}

/// Options fixed at construction time of a [`MidiFile`](super::MidiFile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub format: SmfFormat,

    /// Header division: ticks per quarter note (1-32767).
    pub ticks_per_quarter: u16,

    /// Collapse duplicate events when a track is closed.
    pub remove_duplicates: bool,

    /// Resolve overlapping notes of the same pitch and channel on close.
    pub deinterleave: bool,

    /// Shift every track so the earliest event in the file lands on tick 0.
    pub adjust_origin: bool,

    /// Interpret event times as ticks instead of quarter notes.
    pub time_in_ticks: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            format: SmfFormat::MultiTrack,
            ticks_per_quarter: TICKS_PER_QUARTER,
            remove_duplicates: true,
            deinterleave: true,
            adjust_origin: false,
            time_in_ticks: false,
        }
    }
}

impl FileConfig {
    /// Checks the values that cannot be expressed in an SMF header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero division or one with the SMPTE
    /// bit (0x8000) set
    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_quarter == 0 || self.ticks_per_quarter > 0x7FFF {
            return Err(MidiError::InvalidConfig(format!(
                "ticks per quarter note must be 1-32767, got {}",
                self.ticks_per_quarter
            )));
        }
        Ok(())
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file reading, parsing or validation fails
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
