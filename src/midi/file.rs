//! Standard MIDI File (SMF) assembly.
//!
//! [`MidiFile`] owns every track of the output and is the only place that
//! knows how caller track numbers map onto chunks. It stamps each event with
//! a file-wide insertion order, converts beat times to ticks, and on close
//! finalizes every track before writing the header and chunks in one go.
//!
//! # Format Details
//!
//! - Format 0: the caller's tracks are written as they are.
//! - Format 1: a tempo-map track is written first. Tempo, time signature and
//!   key signature events always go there; everything else goes to the
//!   caller's track, one chunk later.

use super::config::{FileConfig, SmfFormat};
use super::error::{check_channel, check_data, MidiError, Result};
use super::event::{AccidentalType, Mode, TimeSignature};
use super::track::Track;
use super::{quarter_to_tick, tick_to_quarter, time_to_tick};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header chunk signature and body length.
const HEADER_SIGNATURE: &[u8; 4] = b"MThd";
const HEADER_LENGTH: u32 = 6;

/// Controllers used by registered and non-registered parameter calls.
const RPN_MSB: u8 = 101;
const RPN_LSB: u8 = 100;
const NRPN_MSB: u8 = 99;
const NRPN_LSB: u8 = 98;
const DATA_ENTRY_MSB: u8 = 6;
const DATA_ENTRY_LSB: u8 = 38;

/// Registered parameter numbers of the tuning program and bank.
const RPN_TUNING_PROGRAM: u8 = 3;
const RPN_TUNING_BANK: u8 = 4;

/// Where an event belongs in a format 1 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    /// The shared tempo-map track (chunk 0).
    TempoMap,
    /// The caller's own track.
    Caller,
}

/// A Standard MIDI File under construction.
///
/// # Examples
///
/// ```
/// use smfwriter::midi::{FileConfig, MidiFile};
///
/// let mut file = MidiFile::new(1, FileConfig::default()).unwrap();
/// file.add_tempo(0, 0.0, 120.0).unwrap();
/// file.add_note(0, 0, 60, 0.0, 1.0, 100).unwrap();
/// let bytes = file.to_bytes();
/// assert_eq!(&bytes[..4], b"MThd");
/// ```
#[derive(Debug, Clone)]
pub struct MidiFile {
    config: FileConfig,

    /// Every chunk written after the header, tempo track first in format 1.
    tracks: Vec<Track>,

    /// Insertion order for the next event. Never reset.
    event_counter: u64,

    closed: bool,
}

impl MidiFile {
    /// Creates a file with `track_count` caller tracks.
    ///
    /// In format 1 one more track is created for the tempo map.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `track_count` is zero, the chunk count does
    /// not fit the header, or the configuration is invalid
    pub fn new(track_count: usize, config: FileConfig) -> Result<Self> {
        config.validate()?;
        if track_count == 0 {
            return Err(MidiError::InvalidConfig(
                "a MIDI file needs at least one track".to_string(),
            ));
        }

        let chunk_count = match config.format {
            SmfFormat::SingleTrack => track_count,
            SmfFormat::MultiTrack => track_count + 1,
        };
        if chunk_count > usize::from(u16::MAX) {
            return Err(MidiError::InvalidConfig(format!(
                "{chunk_count} tracks do not fit in a MIDI file header"
            )));
        }
        if config.format == SmfFormat::SingleTrack && track_count > 1 {
            tracing::warn!(
                track_count,
                "format 0 file with more than one track; most players expect one"
            );
        }

        let tracks = (0..chunk_count)
            .map(|_| Track::new(config.remove_duplicates, config.deinterleave))
            .collect();

        Ok(Self {
            config,
            tracks,
            event_counter: 0,
            closed: false,
        })
    }

    /// Creates a file with the default configuration.
    pub fn with_tracks(track_count: usize) -> Result<Self> {
        Self::new(track_count, FileConfig::default())
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// Returns all chunks, including the tempo track in format 1.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of chunks written after the header.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Converts quarter notes to ticks at this file's resolution.
    pub fn quarter_to_tick(&self, quarters: f64) -> Result<u32> {
        quarter_to_tick(quarters, self.config.ticks_per_quarter)
    }

    /// Converts ticks to quarter notes at this file's resolution.
    pub fn tick_to_quarter(&self, tick: u32) -> f64 {
        tick_to_quarter(tick, self.config.ticks_per_quarter)
    }

    /// Converts a caller time (beats, or ticks if configured) to ticks.
    fn time_to_ticks(&self, time: f64) -> Result<u32> {
        if self.config.time_in_ticks {
            time_to_tick(time)
        } else {
            self.quarter_to_tick(time)
        }
    }

    /// Maps a caller track number to a chunk index.
    fn route(&self, track: usize, destination: Destination) -> Result<usize> {
        let index = match (self.config.format, destination) {
            (SmfFormat::SingleTrack, _) => track,
            (SmfFormat::MultiTrack, Destination::TempoMap) => return Ok(0),
            (SmfFormat::MultiTrack, Destination::Caller) => track.saturating_add(1),
        };
        if index >= self.tracks.len() {
            return Err(MidiError::TrackOutOfRange {
                index: track,
                count: match self.config.format {
                    SmfFormat::SingleTrack => self.tracks.len(),
                    SmfFormat::MultiTrack => self.tracks.len() - 1,
                },
            });
        }
        Ok(index)
    }

    /// Routes one addition to its track, stamping it with the next insertion
    /// order. The counter only advances when the track accepts the event.
    fn stamp<F>(&mut self, track: usize, destination: Destination, add: F) -> Result<()>
    where
        F: FnOnce(&mut Track, u64) -> Result<()>,
    {
        if self.closed {
            return Err(MidiError::Closed);
        }
        let index = self.route(track, destination)?;
        add(&mut self.tracks[index], self.event_counter)?;
        self.event_counter += 1;
        Ok(())
    }

    /// Adds a note.
    ///
    /// # Arguments
    ///
    /// * `track` - Caller track number
    /// * `channel` - MIDI channel (0-15)
    /// * `pitch` - MIDI note number (0-127)
    /// * `time` - Start time in quarter notes (or ticks)
    /// * `duration` - Length in quarter notes (or ticks); must cover at
    ///   least one tick
    /// * `velocity` - Note velocity (0-127)
    pub fn add_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        time: f64,
        duration: f64,
        velocity: u8,
    ) -> Result<()> {
        self.add_note_inner(track, channel, pitch, time, duration, velocity, None)
    }

    /// Adds a note carrying a free-text annotation. The annotation is kept on
    /// the events but never written to the file.
    #[allow(clippy::too_many_arguments)]
    pub fn add_annotated_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        time: f64,
        duration: f64,
        velocity: u8,
        annotation: impl Into<String>,
    ) -> Result<()> {
        let annotation = Some(annotation.into());
        self.add_note_inner(track, channel, pitch, time, duration, velocity, annotation)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_note_inner(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        time: f64,
        duration: f64,
        velocity: u8,
        annotation: Option<String>,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        let length = self.time_to_ticks(duration)?;
        if length == 0 {
            return Err(MidiError::InvalidTime(duration));
        }
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_note(channel, pitch, tick, length, velocity, annotation, order)
        })
    }

    pub fn add_track_name(&mut self, track: usize, time: f64, name: &str) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_track_name(tick, name, order)
        })
    }

    /// Adds a tempo change. In format 1 this always goes to the tempo track.
    pub fn add_tempo(&mut self, track: usize, time: f64, bpm: f64) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::TempoMap, |t, order| {
            t.add_tempo(tick, bpm, order)
        })
    }

    /// Adds a time signature. In format 1 this always goes to the tempo track.
    ///
    /// [`TimeSignature::new`] fills in the usual eight 32nd notes per quarter.
    pub fn add_time_signature(
        &mut self,
        track: usize,
        time: f64,
        signature: TimeSignature,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::TempoMap, |t, order| {
            t.add_time_signature(tick, signature, order)
        })
    }

    /// Adds a key signature. In format 1 this always goes to the tempo track.
    pub fn add_key_signature(
        &mut self,
        track: usize,
        time: f64,
        accidentals: u8,
        accidental_type: AccidentalType,
        mode: Mode,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::TempoMap, |t, order| {
            t.add_key_signature(tick, accidentals, accidental_type, mode, order)
        })
    }

    pub fn add_copyright(&mut self, track: usize, time: f64, notice: &str) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_copyright(tick, notice, order)
        })
    }

    pub fn add_text(&mut self, track: usize, time: f64, text: &str) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_text(tick, text, order)
        })
    }

    pub fn add_program_change(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        program: u8,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_program_change(channel, tick, program, order)
        })
    }

    pub fn add_channel_pressure(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        pressure: u8,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_channel_pressure(channel, tick, pressure, order)
        })
    }

    pub fn add_controller_event(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        controller: u8,
        value: u8,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_controller(channel, tick, controller, value, order)
        })
    }

    /// Adds a pitch wheel change (-8192 to 8191, 0 is centred).
    pub fn add_pitch_wheel_event(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        value: i16,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_pitch_wheel(channel, tick, value, order)
        })
    }

    /// Adds a manufacturer system exclusive message.
    pub fn add_sysex(
        &mut self,
        track: usize,
        time: f64,
        manufacturer_id: u8,
        payload: &[u8],
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_sysex(tick, manufacturer_id, payload, order)
        })
    }

    /// Adds a universal system exclusive message.
    ///
    /// `sysex_channel` is the device id (0x7F for all devices).
    #[allow(clippy::too_many_arguments)]
    pub fn add_universal_sysex(
        &mut self,
        track: usize,
        time: f64,
        code: u8,
        subcode: u8,
        payload: &[u8],
        sysex_channel: u8,
        real_time: bool,
    ) -> Result<()> {
        let tick = self.time_to_ticks(time)?;
        self.stamp(track, Destination::Caller, |t, order| {
            t.add_universal_sysex(tick, code, subcode, payload, sysex_channel, real_time, order)
        })
    }

    /// Retunes individual notes (MIDI Tuning Standard single note change).
    ///
    /// # Arguments
    ///
    /// * `tunings` - `(note number, frequency in Hz)` pairs
    /// * `sysex_channel` - Device id, 0x7F for all devices
    /// * `real_time` - Send as a real-time message
    /// * `tuning_program` - Tuning program to change (0-127)
    pub fn change_note_tuning(
        &mut self,
        track: usize,
        tunings: &[(u8, f64)],
        sysex_channel: u8,
        real_time: bool,
        tuning_program: u8,
    ) -> Result<()> {
        self.stamp(track, Destination::Caller, |t, order| {
            t.change_note_tuning(tunings, sysex_channel, real_time, tuning_program, order)
        })
    }

    /// Sends a registered parameter number (RPN) change as a controller
    /// sequence: 101, 100, 6 and, if `data_lsb` is given, 38.
    ///
    /// With `time_order` each controller is placed one tick after the
    /// previous one, so receivers that reorder simultaneous events still see
    /// them in sequence.
    #[allow(clippy::too_many_arguments)]
    pub fn make_rpn_call(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        controller_msb: u8,
        controller_lsb: u8,
        data_msb: u8,
        data_lsb: Option<u8>,
        time_order: bool,
    ) -> Result<()> {
        let selectors = [(RPN_MSB, controller_msb), (RPN_LSB, controller_lsb)];
        self.parameter_call(track, channel, time, selectors, data_msb, data_lsb, time_order)
    }

    /// Sends a non-registered parameter number (NRPN) change: controllers
    /// 99, 98, 6 and optionally 38.
    #[allow(clippy::too_many_arguments)]
    pub fn make_nrpn_call(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        controller_msb: u8,
        controller_lsb: u8,
        data_msb: u8,
        data_lsb: Option<u8>,
        time_order: bool,
    ) -> Result<()> {
        let selectors = [(NRPN_MSB, controller_msb), (NRPN_LSB, controller_lsb)];
        self.parameter_call(track, channel, time, selectors, data_msb, data_lsb, time_order)
    }

    /// Selects a tuning bank through RPN 0/4.
    pub fn change_tuning_bank(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        bank: u8,
        time_order: bool,
    ) -> Result<()> {
        self.make_rpn_call(track, channel, time, 0, RPN_TUNING_BANK, 0, Some(bank), time_order)
    }

    /// Selects a tuning program through RPN 0/3.
    pub fn change_tuning_program(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        program: u8,
        time_order: bool,
    ) -> Result<()> {
        self.make_rpn_call(
            track,
            channel,
            time,
            0,
            RPN_TUNING_PROGRAM,
            0,
            Some(program),
            time_order,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn parameter_call(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        selectors: [(u8, u8); 2],
        data_msb: u8,
        data_lsb: Option<u8>,
        time_order: bool,
    ) -> Result<()> {
        // Validate everything first so a bad value never leaves half a call
        check_channel(channel)?;
        self.route(track, Destination::Caller)?;
        let mut messages = selectors.to_vec();
        messages.push((DATA_ENTRY_MSB, data_msb));
        if let Some(lsb) = data_lsb {
            messages.push((DATA_ENTRY_LSB, lsb));
        }
        for &(_, value) in &messages {
            check_data("parameter value", value)?;
        }

        let step = u32::from(time_order);
        let start = self.time_to_ticks(time)?;
        if start.checked_add(step * messages.len() as u32).is_none() {
            return Err(MidiError::InvalidTime(time));
        }

        for (i, (controller, value)) in messages.into_iter().enumerate() {
            let tick = start + step * i as u32;
            self.stamp(track, Destination::Caller, |t, order| {
                t.add_controller(channel, tick, controller, value, order)
            })?;
        }
        Ok(())
    }

    /// Moves every event in the file so the earliest one sits at `offset`
    /// (quarter notes, or ticks if configured). Must be called before close.
    pub fn shift_tracks(&mut self, offset: f64) -> Result<()> {
        if self.closed {
            return Err(MidiError::Closed);
        }
        let offset = self.time_to_ticks(offset)?;
        let Some(origin) = self.find_origin() else {
            return Ok(());
        };
        // Check every track before moving any, so a failure changes nothing
        for track in &self.tracks {
            track.check_shift(origin, offset)?;
        }
        for track in &mut self.tracks {
            track.shift(origin, offset)?;
        }
        Ok(())
    }

    /// Earliest tick over the first events of all tracks.
    fn find_origin(&self) -> Option<u32> {
        self.tracks.iter().filter_map(Track::first_tick).min()
    }

    /// Closes every track and encodes it. Only the first call has any effect.
    ///
    /// Tracks are sorted in parallel; the origin is computed only once every
    /// track is sorted, then applied uniformly when `adjust_origin` is set.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.tracks.par_iter_mut().for_each(Track::close);

        let origin = if self.config.adjust_origin {
            self.find_origin().unwrap_or(0)
        } else {
            0
        };
        self.tracks
            .par_iter_mut()
            .for_each(|track| track.encode(origin));

        self.closed = true;
        tracing::debug!(
            tracks = self.tracks.len(),
            events = self.event_counter,
            origin,
            "closed MIDI file"
        );
    }

    /// Writes the 14-byte header chunk.
    fn write_header(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(HEADER_SIGNATURE);
        buffer.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
        buffer.extend_from_slice(&self.config.format.as_u16().to_be_bytes());
        buffer.extend_from_slice(&(self.tracks.len() as u16).to_be_bytes());
        buffer.extend_from_slice(&self.config.ticks_per_quarter.to_be_bytes());
    }

    /// Closes the file and returns the complete SMF bytes.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.close();
        let mut buffer = Vec::new();
        self.write_header(&mut buffer);
        for track in &self.tracks {
            track.append_chunk(&mut buffer);
        }
        buffer
    }

    /// Closes the file and writes it to `writer` in a single call.
    ///
    /// # Errors
    ///
    /// Returns the writer's I/O error unchanged; nothing is retried
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Closes the file and saves it to `path`.
    ///
    /// # Errors
    ///
    /// Returns error if file creation or writing fails
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes();
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        tracing::info!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }
}
