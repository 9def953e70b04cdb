//! MIDI track assembly.
//!
//! A track collects events in any order while it is open. Closing it removes
//! duplicates, sorts, and untangles overlapping notes; encoding then turns
//! the sorted events into the body of an `MTrk` chunk.

use super::error::{check_channel, check_data, MidiError, Result};
use super::event::{
    encode_latin1, AccidentalType, MidiEvent, Mode, TimeSignature, TimedEvent,
};
use super::{bpm_to_microseconds, tuning};
use std::collections::{HashMap, HashSet};
use std::io::Write;

/// End-of-track meta event, delta 0: `00 FF 2F 00`.
pub const END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

/// Track chunk signature.
const TRACK_SIGNATURE: &[u8; 4] = b"MTrk";

/// Universal sysex code and subcode of a single note tuning change.
const NOTE_TUNING_CODE: u8 = 0x08;
const NOTE_TUNING_SUBCODE: u8 = 0x02;

/// Represents a single track of a MIDI file.
///
/// Events can be added in any order until the track is closed. After
/// [`close`](Track::close) the event list is sorted by tick and never changes
/// again, apart from the origin shift applied by [`encode`](Track::encode).
#[derive(Debug, Clone)]
pub struct Track {
    /// Events added so far; sorted once the track is closed.
    events: Vec<TimedEvent>,

    /// Collapse duplicate events on close.
    remove_duplicates: bool,

    /// Resolve overlapping notes of the same pitch on close.
    deinterleave: bool,

    closed: bool,

    /// Encoded chunk body, including the end-of-track marker.
    data: Option<Vec<u8>>,
}

impl Track {
    /// Creates an empty, open track.
    pub fn new(remove_duplicates: bool, deinterleave: bool) -> Self {
        Self {
            events: Vec::new(),
            remove_duplicates,
            deinterleave,
            closed: false,
            data: None,
        }
    }

    fn push(&mut self, tick: u32, insertion_order: u64, event: MidiEvent) -> Result<()> {
        if self.closed {
            return Err(MidiError::Closed);
        }
        self.events.push(TimedEvent::new(tick, insertion_order, event));
        Ok(())
    }

    /// Adds a note as a note on at `tick` and a note off at `tick + duration`.
    ///
    /// Both halves share the insertion order and annotation. A zero
    /// `duration` is rejected: its note off would sort before its note on.
    #[allow(clippy::too_many_arguments)]
    pub fn add_note(
        &mut self,
        channel: u8,
        pitch: u8,
        tick: u32,
        duration: u32,
        velocity: u8,
        annotation: Option<String>,
        insertion_order: u64,
    ) -> Result<()> {
        let channel = check_channel(channel)?;
        let pitch = check_data("pitch", pitch)?;
        let velocity = check_data("velocity", velocity)?;
        if duration == 0 {
            return Err(MidiError::InvalidTime(0.0));
        }
        let end = tick
            .checked_add(duration)
            .ok_or(MidiError::InvalidTime(f64::from(tick) + f64::from(duration)))?;

        self.push(
            tick,
            insertion_order,
            MidiEvent::NoteOn {
                channel,
                pitch,
                velocity,
                duration,
                annotation: annotation.clone(),
            },
        )?;
        self.push(
            end,
            insertion_order,
            MidiEvent::NoteOff {
                channel,
                pitch,
                velocity,
                annotation,
            },
        )
    }

    pub fn add_controller(
        &mut self,
        channel: u8,
        tick: u32,
        controller: u8,
        value: u8,
        insertion_order: u64,
    ) -> Result<()> {
        let event = MidiEvent::ControlChange {
            channel: check_channel(channel)?,
            controller: check_data("controller number", controller)?,
            value: check_data("controller value", value)?,
        };
        self.push(tick, insertion_order, event)
    }

    /// Adds a pitch wheel change; `value` is signed around the centre.
    pub fn add_pitch_wheel(
        &mut self,
        channel: u8,
        tick: u32,
        value: i16,
        insertion_order: u64,
    ) -> Result<()> {
        if !(-8192..=8191).contains(&value) {
            return Err(MidiError::PitchWheelOutOfRange(value));
        }
        let channel = check_channel(channel)?;
        self.push(tick, insertion_order, MidiEvent::PitchWheel { channel, value })
    }

    /// Adds a tempo change in beats per minute.
    pub fn add_tempo(&mut self, tick: u32, bpm: f64, insertion_order: u64) -> Result<()> {
        let microseconds_per_quarter = bpm_to_microseconds(bpm)?;
        self.push(
            tick,
            insertion_order,
            MidiEvent::Tempo {
                microseconds_per_quarter,
            },
        )
    }

    pub fn add_track_name(&mut self, tick: u32, name: &str, insertion_order: u64) -> Result<()> {
        let name = encode_latin1(name)?;
        self.push(tick, insertion_order, MidiEvent::TrackName(name))
    }

    /// Adds a time signature, rejecting a zero numerator or a denominator
    /// that is not a power of two.
    pub fn add_time_signature(
        &mut self,
        tick: u32,
        signature: TimeSignature,
        insertion_order: u64,
    ) -> Result<()> {
        let event = signature.to_event()?;
        self.push(tick, insertion_order, event)
    }

    pub fn add_key_signature(
        &mut self,
        tick: u32,
        accidentals: u8,
        accidental_type: AccidentalType,
        mode: Mode,
        insertion_order: u64,
    ) -> Result<()> {
        if accidentals > 7 {
            return Err(MidiError::InvalidKeySignature(accidentals));
        }
        self.push(
            tick,
            insertion_order,
            MidiEvent::KeySignature {
                accidentals,
                accidental_type,
                mode,
            },
        )
    }

    pub fn add_program_change(
        &mut self,
        channel: u8,
        tick: u32,
        program: u8,
        insertion_order: u64,
    ) -> Result<()> {
        let event = MidiEvent::ProgramChange {
            channel: check_channel(channel)?,
            program: check_data("program", program)?,
        };
        self.push(tick, insertion_order, event)
    }

    pub fn add_channel_pressure(
        &mut self,
        channel: u8,
        tick: u32,
        pressure: u8,
        insertion_order: u64,
    ) -> Result<()> {
        let event = MidiEvent::ChannelPressure {
            channel: check_channel(channel)?,
            pressure: check_data("pressure", pressure)?,
        };
        self.push(tick, insertion_order, event)
    }

    pub fn add_copyright(&mut self, tick: u32, notice: &str, insertion_order: u64) -> Result<()> {
        let notice = encode_latin1(notice)?;
        self.push(tick, insertion_order, MidiEvent::Copyright(notice))
    }

    pub fn add_text(&mut self, tick: u32, text: &str, insertion_order: u64) -> Result<()> {
        let text = encode_latin1(text)?;
        self.push(tick, insertion_order, MidiEvent::Text(text))
    }

    /// Adds a manufacturer system exclusive message. The payload must not
    /// include the `F0`/`F7` framing.
    pub fn add_sysex(
        &mut self,
        tick: u32,
        manufacturer_id: u8,
        payload: &[u8],
        insertion_order: u64,
    ) -> Result<()> {
        let manufacturer_id = check_data("manufacturer id", manufacturer_id)?;
        let payload = check_sysex_payload(payload)?;
        self.push(
            tick,
            insertion_order,
            MidiEvent::SysEx {
                manufacturer_id,
                payload,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_universal_sysex(
        &mut self,
        tick: u32,
        code: u8,
        subcode: u8,
        payload: &[u8],
        sysex_channel: u8,
        real_time: bool,
        insertion_order: u64,
    ) -> Result<()> {
        let event = MidiEvent::UniversalSysEx {
            real_time,
            sysex_channel: check_data("sysex channel", sysex_channel)?,
            code: check_data("sysex code", code)?,
            subcode: check_data("sysex subcode", subcode)?,
            payload: check_sysex_payload(payload)?,
        };
        self.push(tick, insertion_order, event)
    }

    /// Retunes individual notes with a single note tuning change message at
    /// tick 0.
    ///
    /// # Arguments
    ///
    /// * `tunings` - `(note number, frequency in Hz)` pairs
    /// * `sysex_channel` - Device id, 0x7F addresses every device
    /// * `real_time` - Send as a real-time message
    /// * `tuning_program` - Tuning program being changed
    pub fn change_note_tuning(
        &mut self,
        tunings: &[(u8, f64)],
        sysex_channel: u8,
        real_time: bool,
        tuning_program: u8,
        insertion_order: u64,
    ) -> Result<()> {
        let count = u8::try_from(tunings.len())
            .ok()
            .filter(|n| *n <= 127)
            .ok_or(MidiError::DataOutOfRange {
                field: "tuning count",
                value: tunings.len() as u32,
            })?;

        let mut payload = Vec::with_capacity(2 + tunings.len() * 4);
        payload.push(check_data("tuning program", tuning_program)?);
        payload.push(count);
        for &(note, frequency) in tunings {
            payload.push(check_data("note", note)?);
            payload.extend_from_slice(&tuning::frequency_to_bytes(frequency)?);
        }

        self.add_universal_sysex(
            0,
            NOTE_TUNING_CODE,
            NOTE_TUNING_SUBCODE,
            &payload,
            sysex_channel,
            real_time,
            insertion_order,
        )
    }

    /// Checks that moving `origin` to `offset` keeps every event within
    /// 32 bits of ticks, without touching the events.
    pub(crate) fn check_shift(&self, origin: u32, offset: u32) -> Result<()> {
        if self.closed {
            return Err(MidiError::Closed);
        }
        let (Some(first), Some(last)) = (self.first_tick(), self.last_tick()) else {
            return Ok(());
        };
        if first < origin {
            return Err(MidiError::InvalidTime(f64::from(first)));
        }
        let moved = u64::from(last - origin) + u64::from(offset);
        if moved > u64::from(u32::MAX) {
            return Err(MidiError::InvalidTime(moved as f64));
        }
        Ok(())
    }

    /// Moves every event so that `origin` lands on `offset`. Either every
    /// event moves or none does.
    pub(crate) fn shift(&mut self, origin: u32, offset: u32) -> Result<()> {
        self.check_shift(origin, offset)?;
        for event in &mut self.events {
            event.tick = event.tick - origin + offset;
        }
        Ok(())
    }

    /// Closes the track: removes duplicates, sorts, and deinterleaves.
    ///
    /// Calling this more than once has no further effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let added = self.events.len();
        self.sort();
        if self.remove_duplicates {
            self.remove_duplicate_events();
        }
        if self.deinterleave {
            self.deinterleave_notes();
        }

        tracing::debug!(added, kept = self.events.len(), "closed track");
    }

    fn sort(&mut self) {
        self.events.sort_by_key(TimedEvent::sort_key);
    }

    /// Keeps the earliest-added event of every duplicate class. Must run on a
    /// sorted list so "first seen" means "lowest insertion order".
    fn remove_duplicate_events(&mut self) {
        let mut seen = HashSet::new();
        self.events
            .retain(|event| event.dedup_key().map_or(true, |key| seen.insert(key)));
    }

    /// Re-pairs note offs when notes of the same pitch and channel overlap.
    ///
    /// Walking the sorted list, every note on pushes its tick onto a stack for
    /// its (pitch, channel). A note off that finds more than one note still
    /// sounding is moved back to the most recently started one, so the older
    /// note ends where the newer one begins and the newer note keeps the
    /// later note off.
    fn deinterleave_notes(&mut self) {
        let mut sounding: HashMap<(u8, u8), Vec<u32>> = HashMap::new();
        let mut moved = 0usize;

        for event in &mut self.events {
            match event.event {
                MidiEvent::NoteOn { channel, pitch, .. } => {
                    sounding.entry((pitch, channel)).or_default().push(event.tick);
                }
                MidiEvent::NoteOff { channel, pitch, .. } => {
                    match sounding.get_mut(&(pitch, channel)) {
                        Some(stack) if stack.len() > 1 => {
                            if let Some(tick) = stack.pop() {
                                event.tick = tick;
                                moved += 1;
                            }
                        }
                        Some(stack) if !stack.is_empty() => {
                            stack.pop();
                        }
                        _ => {
                            tracing::warn!(
                                pitch,
                                channel,
                                tick = event.tick,
                                "note off without a sounding note on"
                            );
                        }
                    }
                }
                _ => {}
            }
        }

        if moved > 0 {
            tracing::trace!(moved, "deinterleaved overlapping notes");
            self.sort();
        }
    }

    /// Encodes the track body, shifting every event left by `origin` ticks.
    ///
    /// Closes the track first if needed. Only the first call has any effect.
    ///
    /// # Panics
    ///
    /// Panics if `origin` is later than the first event of the track.
    pub(crate) fn encode(&mut self, origin: u32) {
        if self.data.is_some() {
            return;
        }
        self.close();

        if let Some(first) = self.first_tick() {
            assert!(
                origin <= first,
                "origin {origin} is after the first event at tick {first}"
            );
        }

        let mut data = Vec::new();
        let mut previous_tick = 0u32;
        for event in &mut self.events {
            event.tick -= origin;
            event.write(previous_tick, &mut data);
            previous_tick = event.tick;
        }
        data.extend_from_slice(&END_OF_TRACK);
        self.data = Some(data);
    }

    /// Writes the complete `MTrk` chunk, encoding the track with no origin
    /// shift if that has not happened yet.
    pub fn write_chunk<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.encode(0);
        let mut chunk = Vec::new();
        self.append_chunk(&mut chunk);
        writer.write_all(&chunk)?;
        Ok(())
    }

    /// Appends signature, big-endian length and body to `out`.
    pub(crate) fn append_chunk(&self, out: &mut Vec<u8>) {
        let data = self.data.as_deref().unwrap_or(&END_OF_TRACK);
        out.extend_from_slice(TRACK_SIGNATURE);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }

    /// Returns the events (sorted by tick once closed).
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Tick of the first event after closing, or of the earliest event if
    /// still open.
    pub fn first_tick(&self) -> Option<u32> {
        if self.closed {
            self.events.first().map(|e| e.tick)
        } else {
            self.events.iter().map(|e| e.tick).min()
        }
    }

    fn last_tick(&self) -> Option<u32> {
        self.events.iter().map(|e| e.tick).max()
    }

    /// Encoded chunk body, available once the track has been encoded.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the number of events in the track.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for Track {
    fn default() -> Self {
        Self::new(true, true)
    }
}

fn check_sysex_payload(payload: &[u8]) -> Result<Vec<u8>> {
    payload
        .iter()
        .map(|&byte| check_data("sysex data", byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::vlq::decode_vlq;

    /// Decodes a chunk body into (absolute tick, status byte) pairs.
    fn walk(data: &[u8]) -> Vec<(u32, u8)> {
        let mut out = Vec::new();
        let mut pos = 0;
        let mut tick = 0;
        while pos < data.len() {
            let (delta, used) = decode_vlq(&data[pos..]).unwrap();
            pos += used;
            tick += delta;
            let status = data[pos];
            pos += 1;
            let len = match status {
                0xFF => {
                    pos += 1;
                    let (len, used) = decode_vlq(&data[pos..]).unwrap();
                    pos += used;
                    len as usize
                }
                0xF0 => {
                    let (len, used) = decode_vlq(&data[pos..]).unwrap();
                    pos += used;
                    len as usize
                }
                s if s & 0xF0 == 0xC0 || s & 0xF0 == 0xD0 => 1,
                _ => 2,
            };
            pos += len;
            out.push((tick, status));
        }
        out
    }

    fn note_ticks(track: &Track) -> Vec<(u32, &'static str)> {
        track
            .events()
            .iter()
            .filter_map(|e| match e.event {
                MidiEvent::NoteOn { .. } => Some((e.tick, "on")),
                MidiEvent::NoteOff { .. } => Some((e.tick, "off")),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_add_note_pairs() {
        let mut track = Track::new(false, false);
        track
            .add_note(2, 64, 100, 50, 90, Some("lead".to_string()), 7)
            .unwrap();
        track.close();
        let events = track.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick, 100);
        assert_eq!(events[1].tick, 150);
        assert!(events.iter().all(|e| e.insertion_order == 7));
        match &events[1].event {
            MidiEvent::NoteOff {
                annotation,
                velocity,
                ..
            } => {
                assert_eq!(annotation.as_deref(), Some("lead"));
                assert_eq!(*velocity, 90);
            }
            other => panic!("expected note off, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_values() {
        let mut track = Track::default();
        assert!(matches!(
            track.add_note(16, 60, 0, 1, 100, None, 0),
            Err(MidiError::InvalidChannel(16))
        ));
        assert!(matches!(
            track.add_note(0, 128, 0, 1, 100, None, 0),
            Err(MidiError::DataOutOfRange { field: "pitch", .. })
        ));
        assert!(track.add_controller(0, 0, 128, 0, 0).is_err());
        assert!(track.add_controller(0, 0, 7, 200, 0).is_err());
        assert!(track.add_pitch_wheel(0, 0, 8192, 0).is_err());
        assert!(track.add_pitch_wheel(0, 0, -8193, 0).is_err());
        assert!(track.add_time_signature(0, TimeSignature::new(3, 6, 24), 0).is_err());
        assert!(track.add_key_signature(0, 8, AccidentalType::Sharps, Mode::Major, 0).is_err());
        assert!(track.add_sysex(0, 0x41, &[0x80], 0).is_err());
        assert!(track.add_note(0, 60, u32::MAX, 1, 100, None, 0).is_err());
        assert!(track.is_empty());
    }

    #[test]
    fn test_sort_order_at_same_tick() {
        let mut track = Track::new(false, false);
        track.add_note(0, 60, 0, 10, 100, None, 0).unwrap();
        track.add_track_name(0, "Piano", 1).unwrap();
        track.add_note(0, 62, 10, 10, 100, None, 2).unwrap();
        track.close();

        let order: Vec<_> = track.events().iter().map(|e| (e.tick, e.priority())).collect();
        // Track name before the note on; the note off at 10 before the note on at 10
        assert_eq!(order, vec![(0, 0), (0, 3), (10, 2), (10, 3), (20, 2)]);
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut track = Track::new(false, false);
        track.add_controller(0, 0, 7, 100, 5).unwrap();
        track.add_controller(0, 0, 10, 64, 3).unwrap();
        track.close();
        let controllers: Vec<_> = track
            .events()
            .iter()
            .map(|e| match e.event {
                MidiEvent::ControlChange { controller, .. } => controller,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(controllers, vec![10, 7]);
    }

    #[test]
    fn test_duplicate_removal() {
        let mut track = Track::new(true, false);
        track.add_note(0, 60, 0, 10, 100, None, 0).unwrap();
        track.add_note(0, 60, 0, 10, 40, None, 1).unwrap();
        // Controllers never collapse
        track.add_controller(0, 0, 7, 100, 2).unwrap();
        track.add_controller(0, 0, 7, 100, 3).unwrap();
        track.close();

        let note_ons: Vec<_> = track
            .events()
            .iter()
            .filter_map(|e| match e.event {
                MidiEvent::NoteOn { velocity, .. } => Some(velocity),
                _ => None,
            })
            .collect();
        assert_eq!(note_ons, vec![100]);
        assert_eq!(track.len(), 4);
    }

    #[test]
    fn test_duplicates_kept_when_disabled() {
        let mut track = Track::new(false, false);
        track.add_note(0, 60, 0, 10, 100, None, 0).unwrap();
        track.add_note(0, 60, 0, 10, 40, None, 1).unwrap();
        track.close();
        assert_eq!(track.len(), 4);
    }

    #[test]
    fn test_deinterleave_pairs_most_recent_note() {
        let mut track = Track::new(false, true);
        track.add_note(0, 60, 0, 20, 100, None, 0).unwrap();
        track.add_note(0, 60, 10, 20, 100, None, 1).unwrap();
        track.close();

        // The note off at 20 moves to 10, closing the first note as the
        // second starts; the second note keeps the note off at 30.
        assert_eq!(
            note_ticks(&track),
            vec![(0, "on"), (10, "off"), (10, "on"), (30, "off")]
        );
    }

    #[test]
    fn test_deinterleave_triple_overlap_is_lifo() {
        let mut track = Track::new(false, true);
        track.add_note(0, 60, 0, 30, 100, None, 0).unwrap();
        track.add_note(0, 60, 10, 30, 100, None, 1).unwrap();
        track.add_note(0, 60, 15, 35, 100, None, 2).unwrap();
        track.close();

        // Off at 30 goes to the newest note (15), off at 40 to the next
        // newest (10); with one note left the off at 50 stays put.
        assert_eq!(
            note_ticks(&track),
            vec![
                (0, "on"),
                (10, "off"),
                (10, "on"),
                (15, "off"),
                (15, "on"),
                (50, "off"),
            ]
        );
        let offs: Vec<_> = track
            .events()
            .iter()
            .filter(|e| matches!(e.event, MidiEvent::NoteOff { .. }))
            .map(|e| (e.tick, e.insertion_order))
            .collect();
        assert_eq!(offs, vec![(10, 1), (15, 0), (50, 2)]);
    }

    #[test]
    fn test_deinterleave_keeps_unmatched_note_off() {
        // The duplicate note on is dropped, leaving two note offs for one
        // sounding note.
        let mut track = Track::new(true, true);
        track.add_note(0, 60, 0, 10, 100, None, 0).unwrap();
        track.add_note(0, 60, 0, 20, 100, None, 1).unwrap();
        track.close();
        assert_eq!(note_ticks(&track), vec![(0, "on"), (10, "off"), (20, "off")]);

        track.encode(0);
        assert!(track.data().unwrap().ends_with(&END_OF_TRACK));
    }

    #[test]
    fn test_zero_duration_note_rejected() {
        let mut track = Track::default();
        assert!(matches!(
            track.add_note(0, 60, 960, 0, 100, None, 0),
            Err(MidiError::InvalidTime(_))
        ));
        assert!(track.is_empty());
    }

    #[test]
    fn test_deinterleave_disabled_keeps_overlap() {
        let mut track = Track::new(false, false);
        track.add_note(0, 60, 0, 20, 100, None, 0).unwrap();
        track.add_note(0, 60, 10, 20, 100, None, 1).unwrap();
        track.close();
        assert_eq!(
            note_ticks(&track),
            vec![(0, "on"), (10, "on"), (20, "off"), (30, "off")]
        );
    }

    #[test]
    fn test_deinterleave_ignores_other_pitches() {
        let mut track = Track::new(false, true);
        track.add_note(0, 60, 0, 20, 100, None, 0).unwrap();
        track.add_note(0, 64, 10, 20, 100, None, 1).unwrap();
        track.add_note(1, 60, 5, 20, 100, None, 2).unwrap();
        track.close();
        let ticks: Vec<_> = track.events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 5, 10, 20, 25, 30]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut track = Track::new(true, true);
        track.add_note(0, 60, 0, 20, 100, None, 0).unwrap();
        track.add_note(0, 60, 10, 20, 100, None, 1).unwrap();
        track.close();
        let first: Vec<_> = track.events().to_vec();
        track.close();
        assert_eq!(track.events(), first.as_slice());

        track.encode(0);
        let data = track.data().unwrap().to_vec();
        track.encode(0);
        assert_eq!(track.data().unwrap(), data.as_slice());
        assert!(data.ends_with(&END_OF_TRACK));
        assert_eq!(data.windows(3).filter(|w| *w == [0xFF, 0x2F, 0x00]).count(), 1);
    }

    #[test]
    fn test_add_after_close_fails() {
        let mut track = Track::default();
        track.close();
        assert!(matches!(track.add_text(0, "late", 0), Err(MidiError::Closed)));
    }

    #[test]
    fn test_encode_with_origin() {
        let mut track = Track::new(false, false);
        track.add_note(0, 60, 480, 480, 100, None, 0).unwrap();
        track.encode(480);
        assert_eq!(
            track.data().unwrap(),
            &[0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x80, 0x3C, 0x64, 0x00, 0xFF, 0x2F, 0x00]
        );
        assert_eq!(track.events()[0].tick, 0);
    }

    #[test]
    fn test_deltas_non_negative_and_monotonic() {
        let mut track = Track::default();
        for i in 0..50u32 {
            let tick = (i * 7919) % 1000;
            let channel = (i % 16) as u8;
            let pitch = (40 + i % 30) as u8;
            track.add_note(channel, pitch, tick, 1 + i % 90, 80, None, u64::from(i)).unwrap();
            track.add_pitch_wheel(0, tick / 2, (i as i16) * 100, u64::from(100 + i)).unwrap();
        }
        track.add_tempo(300, 100.0, 500).unwrap();
        track.encode(0);

        let walked = walk(track.data().unwrap());
        assert_eq!(walked.len(), track.len() + 1);
        assert!(walked.windows(2).all(|w| w[0].0 <= w[1].0));
        let ticks: Vec<_> = track.events().iter().map(|e| e.tick).collect();
        let walked_ticks: Vec<_> = walked.iter().map(|w| w.0).collect();
        assert_eq!(&walked_ticks[..ticks.len()], &ticks[..]);
    }

    #[test]
    fn test_write_chunk() {
        let mut track = Track::default();
        track.add_program_change(0, 0, 5, 0).unwrap();
        let mut out = Vec::new();
        track.write_chunk(&mut out).unwrap();
        assert_eq!(
            out,
            vec![
                b'M', b'T', b'r', b'k', 0, 0, 0, 7, 0x00, 0xC0, 0x05, 0x00, 0xFF, 0x2F, 0x00
            ]
        );
    }

    #[test]
    fn test_empty_track_chunk() {
        let mut track = Track::default();
        let mut out = Vec::new();
        track.write_chunk(&mut out).unwrap();
        assert_eq!(out, vec![b'M', b'T', b'r', b'k', 0, 0, 0, 4, 0x00, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn test_note_tuning_payload() {
        let mut track = Track::default();
        track
            .change_note_tuning(&[(69, 440.0), (70, 880.0)], 0x7F, true, 0, 0)
            .unwrap();
        match &track.events()[0].event {
            MidiEvent::UniversalSysEx {
                real_time,
                sysex_channel,
                code,
                subcode,
                payload,
            } => {
                assert!(*real_time);
                assert_eq!((*sysex_channel, *code, *subcode), (0x7F, 8, 2));
                assert_eq!(payload, &vec![0, 2, 69, 69, 0, 0, 70, 81, 0, 0]);
            }
            other => panic!("expected universal sysex, got {other:?}"),
        }
        assert!(track.change_note_tuning(&[(60, 1.0)], 0x7F, true, 0, 1).is_err());
    }

    #[test]
    fn test_shift() {
        let mut track = Track::new(false, false);
        track.add_text(100, "a", 0).unwrap();
        track.add_text(250, "b", 1).unwrap();
        track.shift(100, 10).unwrap();
        let ticks: Vec<_> = track.events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![10, 160]);
    }

    #[test]
    fn test_shift_overflow_moves_nothing() {
        let mut track = Track::new(false, false);
        track.add_text(10, "a", 0).unwrap();
        track.add_text(u32::MAX - 5, "b", 1).unwrap();
        assert!(matches!(track.shift(10, 100), Err(MidiError::InvalidTime(_))));
        let ticks: Vec<_> = track.events().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![10, u32::MAX - 5]);
        // Origin later than the first event
        assert!(track.shift(20, 0).is_err());
    }
}
