//! MIDI event model and per-event wire encoding.
//!
//! Every event is stored with its absolute tick and the file-wide insertion
//! order it was added with. Encoding happens only once the owning track has
//! been sorted, against the tick of the event written just before it.

use super::error::{MidiError, Result};
use super::vlq::write_vlq;
use super::{denominator_to_power, note_to_name};
use std::fmt;

/// Meta event status byte.
const META: u8 = 0xFF;
/// System exclusive start and end bytes.
const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Universal sysex ids for real-time and non-real-time messages.
const UNIVERSAL_REAL_TIME: u8 = 0x7F;
const UNIVERSAL_NON_REAL_TIME: u8 = 0x7E;

/// Sign of the accidentals in a key signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccidentalType {
    Sharps,
    Flats,
}

impl AccidentalType {
    fn sign(self) -> i8 {
        match self {
            AccidentalType::Sharps => 1,
            AccidentalType::Flats => -1,
        }
    }
}

/// Key signature mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    fn as_byte(self) -> u8 {
        match self {
            Mode::Major => 0,
            Mode::Minor => 1,
        }
    }
}

/// A meter as written on the score, e.g. 6/8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    /// Written denominator (4 = quarter note); must be a power of two
    pub denominator: u8,
    /// MIDI clocks per metronome click (24 = one quarter note)
    pub clocks_per_tick: u8,
    /// Notated 32nd notes per MIDI quarter note
    pub notes_per_quarter: u8,
}

impl TimeSignature {
    /// Thirty-second notes per quarter in ordinary notation.
    pub const DEFAULT_NOTES_PER_QUARTER: u8 = 8;

    /// Creates a time signature with eight 32nd notes per quarter.
    pub fn new(numerator: u8, denominator: u8, clocks_per_tick: u8) -> Self {
        Self {
            numerator,
            denominator,
            clocks_per_tick,
            notes_per_quarter: Self::DEFAULT_NOTES_PER_QUARTER,
        }
    }

    pub fn with_notes_per_quarter(mut self, notes_per_quarter: u8) -> Self {
        self.notes_per_quarter = notes_per_quarter;
        self
    }

    /// Converts to the wire event, checking the numerator and denominator.
    pub fn to_event(self) -> Result<MidiEvent> {
        if self.numerator == 0 {
            return Err(MidiError::InvalidTimeSignature(
                "numerator must be at least 1".to_string(),
            ));
        }
        let denominator_power = denominator_to_power(self.denominator).ok_or_else(|| {
            MidiError::InvalidTimeSignature(format!(
                "denominator {} is not a power of two",
                self.denominator
            ))
        })?;
        Ok(MidiEvent::TimeSignature {
            numerator: self.numerator,
            denominator_power,
            clocks_per_tick: self.clocks_per_tick,
            notes_per_quarter: self.notes_per_quarter,
        })
    }
}

/// MIDI event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiEvent {
    /// Note on: channel, pitch, velocity, plus the duration it was added with
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: u8,
        duration: u32,
        annotation: Option<String>,
    },
    /// Note off: channel, pitch, velocity (the velocity of the matching note on)
    NoteOff {
        channel: u8,
        pitch: u8,
        velocity: u8,
        annotation: Option<String>,
    },
    /// Set tempo: microseconds per quarter note (24 bits)
    Tempo { microseconds_per_quarter: u32 },
    /// Copyright notice, ISO-8859-1 encoded
    Copyright(Vec<u8>),
    /// Free text, ISO-8859-1 encoded
    Text(Vec<u8>),
    /// Track name, ISO-8859-1 encoded
    TrackName(Vec<u8>),
    KeySignature {
        accidentals: u8,
        accidental_type: AccidentalType,
        mode: Mode,
    },
    /// Time signature with the denominator stored as a power of two
    TimeSignature {
        numerator: u8,
        denominator_power: u8,
        clocks_per_tick: u8,
        notes_per_quarter: u8,
    },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Pitch wheel, signed around the centre (0)
    PitchWheel { channel: u8, value: i16 },
    SysEx { manufacturer_id: u8, payload: Vec<u8> },
    UniversalSysEx {
        real_time: bool,
        sysex_channel: u8,
        code: u8,
        subcode: u8,
        payload: Vec<u8>,
    },
}

/// Identity of an event for duplicate removal.
///
/// Deliberately narrower than full equality: two note ons at the same tick,
/// pitch and channel are duplicates even when their velocities differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    NoteOn { tick: u32, pitch: u8, channel: u8 },
    NoteOff { tick: u32, pitch: u8, channel: u8 },
    Tempo { tick: u32, microseconds_per_quarter: u32 },
    Copyright { tick: u32 },
    Text { tick: u32 },
    TrackName { tick: u32, name: Vec<u8> },
    KeySignature { tick: u32 },
    TimeSignature { tick: u32 },
    ProgramChange { tick: u32, program: u8, channel: u8 },
    ChannelPressure { tick: u32, pressure: u8, channel: u8 },
}

/// Represents a timed MIDI event for sorting and writing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    /// Absolute tick position
    pub tick: u32,
    /// File-wide order in which the event was added, last sort tie-break
    pub insertion_order: u64,
    /// The MIDI event
    pub event: MidiEvent,
}

impl TimedEvent {
    pub fn new(tick: u32, insertion_order: u64, event: MidiEvent) -> Self {
        Self {
            tick,
            insertion_order,
            event,
        }
    }

    /// Secondary sort rank for events at the same tick (lower = first).
    ///
    /// Names and signatures come first, then other meta and configuration
    /// events, then note offs, then note ons and continuous data.
    pub fn priority(&self) -> u8 {
        match self.event {
            MidiEvent::TrackName(_) | MidiEvent::TimeSignature { .. } => 0,
            MidiEvent::Copyright(_)
            | MidiEvent::Text(_)
            | MidiEvent::KeySignature { .. }
            | MidiEvent::ProgramChange { .. }
            | MidiEvent::SysEx { .. }
            | MidiEvent::UniversalSysEx { .. } => 1,
            MidiEvent::NoteOff { .. } => 2,
            MidiEvent::NoteOn { .. }
            | MidiEvent::Tempo { .. }
            | MidiEvent::ControlChange { .. }
            | MidiEvent::ChannelPressure { .. }
            | MidiEvent::PitchWheel { .. } => 3,
        }
    }

    /// Full ordering key: tick, then priority, then insertion order.
    pub fn sort_key(&self) -> (u32, u8, u64) {
        (self.tick, self.priority(), self.insertion_order)
    }

    /// Returns the duplicate-removal identity, or `None` for events that are
    /// never considered duplicates (controllers, pitch wheel, sysex).
    pub fn dedup_key(&self) -> Option<DedupKey> {
        let tick = self.tick;
        let key = match &self.event {
            MidiEvent::NoteOn { channel, pitch, .. } => DedupKey::NoteOn {
                tick,
                pitch: *pitch,
                channel: *channel,
            },
            MidiEvent::NoteOff { channel, pitch, .. } => DedupKey::NoteOff {
                tick,
                pitch: *pitch,
                channel: *channel,
            },
            MidiEvent::Tempo {
                microseconds_per_quarter,
            } => DedupKey::Tempo {
                tick,
                microseconds_per_quarter: *microseconds_per_quarter,
            },
            MidiEvent::Copyright(_) => DedupKey::Copyright { tick },
            MidiEvent::Text(_) => DedupKey::Text { tick },
            MidiEvent::TrackName(name) => DedupKey::TrackName {
                tick,
                name: name.clone(),
            },
            MidiEvent::KeySignature { .. } => DedupKey::KeySignature { tick },
            MidiEvent::TimeSignature { .. } => DedupKey::TimeSignature { tick },
            MidiEvent::ProgramChange { channel, program } => DedupKey::ProgramChange {
                tick,
                program: *program,
                channel: *channel,
            },
            MidiEvent::ChannelPressure { channel, pressure } => DedupKey::ChannelPressure {
                tick,
                pressure: *pressure,
                channel: *channel,
            },
            MidiEvent::ControlChange { .. }
            | MidiEvent::PitchWheel { .. }
            | MidiEvent::SysEx { .. }
            | MidiEvent::UniversalSysEx { .. } => return None,
        };
        Some(key)
    }

    /// Writes delta time, status and payload to `buffer`.
    ///
    /// # Panics
    ///
    /// Panics if `previous_tick` is later than this event, which means the
    /// track was not sorted before encoding.
    pub fn write(&self, previous_tick: u32, buffer: &mut Vec<u8>) {
        assert!(
            self.tick >= previous_tick,
            "negative delta time: event at tick {} follows tick {}",
            self.tick,
            previous_tick
        );
        write_vlq(self.tick - previous_tick, buffer);
        write_event(&self.event, buffer);
    }
}

impl fmt::Display for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event {
            MidiEvent::NoteOn {
                channel,
                pitch,
                velocity,
                duration,
                ..
            } => write!(
                f,
                "NoteOn {} at tick {} duration {} ch {} vel {}",
                note_to_name(*pitch),
                self.tick,
                duration,
                channel,
                velocity
            ),
            MidiEvent::NoteOff {
                channel,
                pitch,
                velocity,
                ..
            } => write!(
                f,
                "NoteOff {} at tick {} ch {} vel {}",
                note_to_name(*pitch),
                self.tick,
                channel,
                velocity
            ),
            other => write!(f, "{} at tick {}", event_name(other), self.tick),
        }
    }
}

fn event_name(event: &MidiEvent) -> &'static str {
    match event {
        MidiEvent::NoteOn { .. } => "NoteOn",
        MidiEvent::NoteOff { .. } => "NoteOff",
        MidiEvent::Tempo { .. } => "Tempo",
        MidiEvent::Copyright(_) => "Copyright",
        MidiEvent::Text(_) => "Text",
        MidiEvent::TrackName(_) => "TrackName",
        MidiEvent::KeySignature { .. } => "KeySignature",
        MidiEvent::TimeSignature { .. } => "TimeSignature",
        MidiEvent::ProgramChange { .. } => "ProgramChange",
        MidiEvent::ChannelPressure { .. } => "ChannelPressure",
        MidiEvent::ControlChange { .. } => "ControlChange",
        MidiEvent::PitchWheel { .. } => "PitchWheel",
        MidiEvent::SysEx { .. } => "SysEx",
        MidiEvent::UniversalSysEx { .. } => "UniversalSysEx",
    }
}

/// Writes a meta event with a length-prefixed payload (without delta time).
fn write_meta(kind: u8, payload: &[u8], buffer: &mut Vec<u8>) {
    buffer.push(META);
    buffer.push(kind);
    write_vlq(payload.len() as u32, buffer);
    buffer.extend_from_slice(payload);
}

/// Writes a single MIDI event to the buffer (without delta time).
fn write_event(event: &MidiEvent, buffer: &mut Vec<u8>) {
    match event {
        MidiEvent::NoteOn {
            channel,
            pitch,
            velocity,
            ..
        } => {
            buffer.push(0x90 | (channel & 0x0F));
            buffer.push(*pitch);
            buffer.push(*velocity);
        }
        MidiEvent::NoteOff {
            channel,
            pitch,
            velocity,
            ..
        } => {
            buffer.push(0x80 | (channel & 0x0F));
            buffer.push(*pitch);
            buffer.push(*velocity);
        }
        MidiEvent::ProgramChange { channel, program } => {
            buffer.push(0xC0 | (channel & 0x0F));
            buffer.push(*program);
        }
        MidiEvent::ChannelPressure { channel, pressure } => {
            buffer.push(0xD0 | (channel & 0x0F));
            buffer.push(*pressure);
        }
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => {
            buffer.push(0xB0 | (channel & 0x0F));
            buffer.push(*controller);
            buffer.push(*value);
        }
        MidiEvent::PitchWheel { channel, value } => {
            // 14-bit unsigned on the wire, LSB first
            let raw = (i32::from(*value) + 8192) as u16;
            buffer.push(0xE0 | (channel & 0x0F));
            buffer.push((raw & 0x7F) as u8);
            buffer.push(((raw >> 7) & 0x7F) as u8);
        }
        MidiEvent::Tempo {
            microseconds_per_quarter,
        } => {
            // Meta event: FF 51 03 tt tt tt
            let bytes = microseconds_per_quarter.to_be_bytes();
            write_meta(0x51, &bytes[1..], buffer);
        }
        MidiEvent::Copyright(notice) => write_meta(0x02, notice, buffer),
        MidiEvent::Text(text) => write_meta(0x01, text, buffer),
        MidiEvent::TrackName(name) => write_meta(0x03, name, buffer),
        MidiEvent::KeySignature {
            accidentals,
            accidental_type,
            mode,
        } => {
            // Meta event: FF 59 02 sf mi, sf negative for flats
            let sf = (*accidentals as i8) * accidental_type.sign();
            write_meta(0x59, &[sf as u8, mode.as_byte()], buffer);
        }
        MidiEvent::TimeSignature {
            numerator,
            denominator_power,
            clocks_per_tick,
            notes_per_quarter,
        } => {
            // Meta event: FF 58 04 nn dd cc bb
            write_meta(
                0x58,
                &[
                    *numerator,
                    *denominator_power,
                    *clocks_per_tick,
                    *notes_per_quarter,
                ],
                buffer,
            );
        }
        MidiEvent::SysEx {
            manufacturer_id,
            payload,
        } => {
            // Length covers the manufacturer id and the terminator
            buffer.push(SYSEX_START);
            write_vlq(payload.len() as u32 + 2, buffer);
            buffer.push(*manufacturer_id);
            buffer.extend_from_slice(payload);
            buffer.push(SYSEX_END);
        }
        MidiEvent::UniversalSysEx {
            real_time,
            sysex_channel,
            code,
            subcode,
            payload,
        } => {
            // Length covers id, device channel, code, subcode and terminator
            buffer.push(SYSEX_START);
            write_vlq(payload.len() as u32 + 5, buffer);
            buffer.push(if *real_time {
                UNIVERSAL_REAL_TIME
            } else {
                UNIVERSAL_NON_REAL_TIME
            });
            buffer.push(*sysex_channel);
            buffer.push(*code);
            buffer.push(*subcode);
            buffer.extend_from_slice(payload);
            buffer.push(SYSEX_END);
        }
    }
}

/// Encodes text as ISO-8859-1, one byte per character.
pub(crate) fn encode_latin1(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| MidiError::UnencodableText(c)))
        .collect()
}
