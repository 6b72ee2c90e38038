use crate::core::constants::*;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

/// MIDI clock time: the integer count of MIDI ticks from the song origin. A quarter note spans
/// `clocks_per_beat` ticks.
pub type MidiClockTime = u64;

/// Sentinel for "no such time" (e.g. the length of a note with no matching note off).
pub const TIME_INFINITE: MidiClockTime = u32::MAX as MidiClockTime;

/// A single MIDI (or meta) message: a status byte, up to three data bytes, and, for variable
/// payloads, an owned byte buffer. The payload buffer holds SysEx bodies, meta text, tempo,
/// time signature and SMPTE offset data.
///
/// Two internal encodings reuse the `status == 0` slot: *NoOp* (`data1 == 0`) and *BeatMarker*
/// (`data1 == 1`). They are sequencer sentinels and are never transmitted or written to a file.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Message {
    status: u8,
    data1: u8,
    data2: u8,
    data3: u8,
    sysex: Option<Vec<u8>>,
}

impl Message {
    /// A NoOp message, the empty value of the type.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        let mut msg = Self::new();
        msg.set_note_on(channel, note, velocity);
        msg
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        let mut msg = Self::new();
        msg.set_note_off(channel, note, velocity);
        msg
    }

    pub fn poly_pressure(channel: u8, note: u8, pressure: u8) -> Self {
        let mut msg = Self::new();
        msg.set_poly_pressure(channel, note, pressure);
        msg
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        let mut msg = Self::new();
        msg.set_control_change(channel, controller, value);
        msg
    }

    /// A control change of controller 7 (main volume).
    pub fn volume_change(channel: u8, value: u8) -> Self {
        Self::control_change(channel, C_MAIN_VOLUME, value)
    }

    /// A control change of controller 10 (pan).
    pub fn pan_change(channel: u8, value: u8) -> Self {
        Self::control_change(channel, C_PAN, value)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        let mut msg = Self::new();
        msg.set_program_change(channel, program);
        msg
    }

    pub fn channel_pressure(channel: u8, pressure: u8) -> Self {
        let mut msg = Self::new();
        msg.set_channel_pressure(channel, pressure);
        msg
    }

    /// A pitch bend from a signed amount in `-8192..=8191` (0 is centered).
    pub fn pitch_bend(channel: u8, amount: i16) -> Self {
        let mut msg = Self::new();
        msg.set_pitch_bend(channel, amount);
        msg
    }

    /// The channel mode message "all notes off" (controller 123).
    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(channel, C_ALL_NOTES_OFF, 0)
    }

    /// A system exclusive message. The payload must be the full `F0 … F7` framing; when the
    /// first/last bytes are missing they are added.
    pub fn system_exclusive(payload: Vec<u8>) -> Self {
        let mut body = payload;
        if body.first() != Some(&SYSEX_START) {
            body.insert(0, SYSEX_START);
        }
        if body.last() != Some(&SYSEX_END) {
            body.push(SYSEX_END);
        }
        let mut msg = Self::new();
        msg.status = SYSEX_START;
        msg.sysex = Some(body);
        msg
    }

    /// A song position pointer message (14-bit beat count).
    pub fn song_position(position: u16) -> Self {
        let mut msg = Self::new();
        msg.status = SONG_POSITION;
        msg.data1 = (position & 0x7f) as u8;
        msg.data2 = ((position >> 7) & 0x7f) as u8;
        msg
    }

    pub fn song_select(song: u8) -> Self {
        let mut msg = Self::new();
        msg.status = SONG_SELECT;
        msg.data1 = song & 0x7f;
        msg
    }

    pub fn tune_request() -> Self {
        let mut msg = Self::new();
        msg.status = TUNE_REQUEST;
        msg
    }

    /// A text meta event of the given type (`0x01..=0x0f`). The text bytes land in the payload
    /// without a trailing NUL.
    pub fn text_event<S: AsRef<str>>(meta_type: u8, text: S) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = meta_type.max(META_GENERIC_TEXT).min(META_TEXT_LAST);
        msg.sysex = Some(text.as_ref().as_bytes().to_vec());
        msg
    }

    pub fn track_name<S: AsRef<str>>(name: S) -> Self {
        Self::text_event(META_TRACK_NAME, name)
    }

    pub fn marker_text<S: AsRef<str>>(text: S) -> Self {
        Self::text_event(META_MARKER_TEXT, text)
    }

    pub fn lyric<S: AsRef<str>>(text: S) -> Self {
        Self::text_event(META_LYRIC_TEXT, text)
    }

    /// A tempo meta event from beats per minute. Stored as a big-endian 24 bit count of
    /// microseconds per quarter note.
    pub fn tempo(bpm: f64) -> Self {
        let micros = (60_000_000.0 / bpm.max(1.0)).round() as u32;
        Self::tempo_from_micros(micros)
    }

    /// A tempo meta event from microseconds per quarter note.
    pub fn tempo_from_micros(micros_per_quarter: u32) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = META_TEMPO;
        let be = micros_per_quarter.to_be_bytes();
        msg.sysex = Some(vec![be[1], be[2], be[3]]);
        msg
    }

    /// A time signature meta event. `denominator_pow` is the log2 of the notated denominator
    /// (2 for a quarter). Metronome clocks default to 24 and notated 32nds per quarter to 8.
    pub fn time_signature(numerator: u8, denominator_pow: u8) -> Self {
        Self::time_signature_full(numerator, denominator_pow, 24, 8)
    }

    pub fn time_signature_full(
        numerator: u8,
        denominator_pow: u8,
        clocks_per_metronome: u8,
        thirty_seconds_per_quarter: u8,
    ) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = META_TIMESIG;
        msg.data2 = numerator;
        msg.data3 = denominator_pow;
        msg.sysex = Some(vec![
            numerator,
            denominator_pow,
            clocks_per_metronome,
            thirty_seconds_per_quarter,
        ]);
        msg
    }

    /// A key signature meta event: `sharps_flats` in `-7..=7`, `minor` for minor mode.
    pub fn key_signature(sharps_flats: i8, minor: bool) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = META_KEYSIG;
        msg.data2 = sharps_flats.max(-7).min(7) as u8;
        msg.data3 = minor as u8;
        msg
    }

    /// A SMPTE offset meta event: hours, minutes, seconds, frames, fractional frames.
    pub fn smpte_offset(hours: u8, minutes: u8, seconds: u8, frames: u8, sub_frames: u8) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = META_SMPTE;
        msg.sysex = Some(vec![hours, minutes, seconds, frames, sub_frames]);
        msg
    }

    /// A channel message built from its raw wire bytes, used by the file reader and the input
    /// driver.
    pub(crate) fn channel_from_raw(status: u8, data1: u8, data2: u8) -> Self {
        let mut msg = Self::new();
        msg.status = status;
        msg.data1 = data1;
        msg.data2 = data2;
        msg
    }

    /// A non-sysex system message built from its raw wire bytes.
    pub(crate) fn system_from_raw(status: u8, data1: u8, data2: u8) -> Self {
        let mut msg = Self::new();
        msg.status = status;
        msg.data1 = data1;
        msg.data2 = data2;
        msg
    }

    /// The `F7` escape event of the file format: an arbitrary byte run, stored as-is.
    pub(crate) fn sysex_escape(payload: Vec<u8>) -> Self {
        let mut msg = Self::new();
        msg.status = SYSEX_END;
        msg.sysex = Some(payload);
        msg
    }

    /// A sequencer-internal beat marker. Never serialized.
    pub fn beat_marker() -> Self {
        let mut msg = Self::new();
        msg.data1 = 1;
        msg
    }

    pub(crate) fn end_of_track() -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = META_END_OF_TRACK;
        msg
    }

    /// A meta event built from its raw file encoding, used by the file reader. The payload bytes
    /// land in the owned buffer; the interpreted bytes of timesig/keysig are mirrored into the
    /// data bytes the same way the builders store them.
    pub(crate) fn meta_from_raw(meta_type: u8, payload: Vec<u8>) -> Self {
        let mut msg = Self::new();
        msg.status = META_EVENT;
        msg.data1 = meta_type;
        match meta_type {
            META_TIMESIG => {
                msg.data2 = payload.first().copied().unwrap_or(DEFAULT_TIMESIG_NUMERATOR);
                msg.data3 = payload.get(1).copied().unwrap_or(2);
                msg.sysex = Some(payload);
            }
            META_KEYSIG => {
                msg.data2 = payload.first().copied().unwrap_or(0);
                msg.data3 = payload.get(1).copied().unwrap_or(0);
            }
            _ => {
                msg.sysex = Some(payload);
            }
        }
        msg
    }

    // ------------------------------------------------------------------------------------------
    // setters
    // ------------------------------------------------------------------------------------------

    pub fn set_note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.status = NOTE_ON | (channel & STATUS_CHANNEL_MASK);
        self.data1 = note & 0x7f;
        self.data2 = velocity & 0x7f;
        self.data3 = 0;
        self.sysex = None;
    }

    /// Sets a note off with the canonical `0x8n` status. (The reader also understands the
    /// `NOTE ON, velocity 0` form; writing that form is a file-writer option.)
    pub fn set_note_off(&mut self, channel: u8, note: u8, velocity: u8) {
        self.status = NOTE_OFF | (channel & STATUS_CHANNEL_MASK);
        self.data1 = note & 0x7f;
        self.data2 = velocity & 0x7f;
        self.data3 = 0;
        self.sysex = None;
    }

    pub fn set_poly_pressure(&mut self, channel: u8, note: u8, pressure: u8) {
        self.status = POLY_PRESSURE | (channel & STATUS_CHANNEL_MASK);
        self.data1 = note & 0x7f;
        self.data2 = pressure & 0x7f;
        self.data3 = 0;
        self.sysex = None;
    }

    pub fn set_control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.status = CONTROL_CHANGE | (channel & STATUS_CHANNEL_MASK);
        self.data1 = controller & 0x7f;
        self.data2 = value & 0x7f;
        self.data3 = 0;
        self.sysex = None;
    }

    pub fn set_program_change(&mut self, channel: u8, program: u8) {
        self.status = PROGRAM_CHANGE | (channel & STATUS_CHANNEL_MASK);
        self.data1 = program & 0x7f;
        self.data2 = 0;
        self.data3 = 0;
        self.sysex = None;
    }

    pub fn set_channel_pressure(&mut self, channel: u8, pressure: u8) {
        self.status = CHANNEL_PRESSURE | (channel & STATUS_CHANNEL_MASK);
        self.data1 = pressure & 0x7f;
        self.data2 = 0;
        self.data3 = 0;
        self.sysex = None;
    }

    pub fn set_pitch_bend(&mut self, channel: u8, amount: i16) {
        let unsigned = (amount.max(-8192).min(8191) + 8192) as u16;
        self.status = PITCH_BEND | (channel & STATUS_CHANNEL_MASK);
        self.data1 = (unsigned & 0x7f) as u8;
        self.data2 = ((unsigned >> 7) & 0x7f) as u8;
        self.data3 = 0;
        self.sysex = None;
    }

    /// Rewrites the channel nibble; only meaningful for channel messages.
    pub fn set_channel(&mut self, channel: u8) {
        self.status = (self.status & STATUS_TYPE_MASK) | (channel & STATUS_CHANNEL_MASK);
    }

    /// Rewrites the status type nibble, keeping the channel; only meaningful for channel
    /// messages.
    pub fn set_type(&mut self, status_type: u8) {
        self.status = (status_type & STATUS_TYPE_MASK) | (self.status & STATUS_CHANNEL_MASK);
    }

    /// Rewrites the note number of a note or poly pressure message.
    pub fn set_note(&mut self, note: u8) {
        self.data1 = note & 0x7f;
    }

    /// Rewrites the velocity of a note message.
    pub fn set_velocity(&mut self, velocity: u8) {
        self.data2 = velocity & 0x7f;
    }

    // ------------------------------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------------------------------

    /// The raw status byte.
    pub fn status(&self) -> u8 {
        self.status
    }

    /// The status type nibble of a channel message (e.g. [`NOTE_ON`]).
    pub fn status_type(&self) -> u8 {
        self.status & STATUS_TYPE_MASK
    }

    /// The channel nibble (0-15, shown to users as 1-16). Only meaningful for channel messages.
    pub fn channel(&self) -> u8 {
        self.status & STATUS_CHANNEL_MASK
    }

    /// The first data byte.
    pub fn data1(&self) -> u8 {
        self.data1
    }

    /// The second data byte.
    pub fn data2(&self) -> u8 {
        self.data2
    }

    /// The third data byte.
    pub fn data3(&self) -> u8 {
        self.data3
    }

    /// The owned variable payload, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        self.sysex.as_deref()
    }

    /// The total message length in bytes, including the status byte. `None` for variable-length
    /// messages (sysex, meta) and for the internal sentinels.
    pub fn length(&self) -> Option<usize> {
        if self.is_internal() {
            return None;
        }
        let len = if self.status & STATUS_TYPE_MASK == 0xf0 {
            SYS_MSG_LEN[(self.status & STATUS_CHANNEL_MASK) as usize]
        } else {
            CHAN_MSG_LEN[(self.status >> 4) as usize]
        };
        if len < 0 {
            None
        } else {
            Some(len as usize)
        }
    }

    /// True for the internal NoOp and BeatMarker sentinels.
    pub fn is_internal(&self) -> bool {
        self.status == 0
    }

    pub fn is_no_op(&self) -> bool {
        self.status == 0 && self.data1 == 0
    }

    pub fn is_beat_marker(&self) -> bool {
        self.status == 0 && self.data1 == 1
    }

    /// True for any voice message (`0x80..=0xEF` status).
    pub fn is_channel_msg(&self) -> bool {
        self.status >= NOTE_OFF && self.status < SYSEX_START
    }

    /// True for a note on with a non-zero velocity. (A `NOTE ON` with velocity zero is a note
    /// off and is reported by [`Message::is_note_off`].)
    pub fn is_note_on(&self) -> bool {
        self.status_type() == NOTE_ON && self.data2 != 0
    }

    /// True for both note off encodings: `NOTE OFF` status, or `NOTE ON` with velocity 0.
    pub fn is_note_off(&self) -> bool {
        self.status_type() == NOTE_OFF || (self.status_type() == NOTE_ON && self.data2 == 0)
    }

    /// True for either a note on or a note off.
    pub fn is_note(&self) -> bool {
        let t = self.status_type();
        t == NOTE_ON || t == NOTE_OFF
    }

    pub fn is_poly_pressure(&self) -> bool {
        self.status_type() == POLY_PRESSURE
    }

    pub fn is_control_change(&self) -> bool {
        self.status_type() == CONTROL_CHANGE
    }

    /// True for a control change of controller 7 (main volume).
    pub fn is_volume_change(&self) -> bool {
        self.is_control_change() && self.data1 == C_MAIN_VOLUME
    }

    /// True for a control change of controller 10 (pan).
    pub fn is_pan_change(&self) -> bool {
        self.is_control_change() && self.data1 == C_PAN
    }

    /// True for a damper (sustain) pedal press, CC 64 with value ≥ 64.
    pub fn is_pedal_on(&self) -> bool {
        self.is_control_change() && self.data1 == C_DAMPER && self.data2 >= 64
    }

    /// True for a damper (sustain) pedal release, CC 64 with value < 64.
    pub fn is_pedal_off(&self) -> bool {
        self.is_control_change() && self.data1 == C_DAMPER && self.data2 < 64
    }

    pub fn is_program_change(&self) -> bool {
        self.status_type() == PROGRAM_CHANGE
    }

    pub fn is_channel_pressure(&self) -> bool {
        self.status_type() == CHANNEL_PRESSURE
    }

    pub fn is_pitch_bend(&self) -> bool {
        self.status_type() == PITCH_BEND
    }

    /// True for any system message (`0xF0..=0xFF`), including sysex and meta.
    pub fn is_system_message(&self) -> bool {
        self.status & STATUS_TYPE_MASK == 0xf0
    }

    pub fn is_sysex(&self) -> bool {
        self.status == SYSEX_START
    }

    /// True for a file meta event (`0xFF` status).
    pub fn is_meta_event(&self) -> bool {
        self.status == META_EVENT
    }

    /// The meta type byte of a meta event.
    pub fn meta_type(&self) -> u8 {
        self.data1
    }

    pub fn is_text_event(&self) -> bool {
        self.is_meta_event() && (META_GENERIC_TEXT..=META_TEXT_LAST).contains(&self.data1)
    }

    pub fn is_track_name(&self) -> bool {
        self.is_meta_event() && self.data1 == META_TRACK_NAME
    }

    pub fn is_marker_text(&self) -> bool {
        self.is_meta_event() && self.data1 == META_MARKER_TEXT
    }

    pub fn is_tempo(&self) -> bool {
        self.is_meta_event() && self.data1 == META_TEMPO
    }

    pub fn is_time_sig(&self) -> bool {
        self.is_meta_event() && self.data1 == META_TIMESIG
    }

    pub fn is_key_sig(&self) -> bool {
        self.is_meta_event() && self.data1 == META_KEYSIG
    }

    pub fn is_smpte_offset(&self) -> bool {
        self.is_meta_event() && self.data1 == META_SMPTE
    }

    /// True for the end-of-track meta event that terminates every track.
    pub fn is_end_of_track(&self) -> bool {
        self.is_meta_event() && self.data1 == META_END_OF_TRACK
    }

    /// The note number of a note or poly pressure message.
    pub fn note(&self) -> u8 {
        self.data1
    }

    /// The velocity of a note message.
    pub fn velocity(&self) -> u8 {
        self.data2
    }

    /// The controller number of a control change.
    pub fn controller(&self) -> u8 {
        self.data1
    }

    /// The controller value of a control change.
    pub fn controller_value(&self) -> u8 {
        self.data2
    }

    /// The program of a program change.
    pub fn program(&self) -> u8 {
        self.data1
    }

    /// The pitch bend amount in `-8192..=8191` (0 is centered).
    pub fn bender_value(&self) -> i16 {
        (((self.data2 as u16) << 7) | self.data1 as u16) as i16 - 8192
    }

    /// The tempo of a tempo meta event, in microseconds per quarter note.
    pub fn tempo_micros(&self) -> Option<u32> {
        if !self.is_tempo() {
            return None;
        }
        let data = self.sysex.as_deref()?;
        if data.len() < 3 {
            return None;
        }
        Some(u32::from_be_bytes([0, data[0], data[1], data[2]]))
    }

    /// The tempo of a tempo meta event, in beats per minute.
    pub fn tempo_bpm(&self) -> Option<f64> {
        let micros = self.tempo_micros()?;
        if micros == 0 {
            return None;
        }
        Some(60_000_000.0 / micros as f64)
    }

    /// The numerator of a time signature meta event.
    pub fn timesig_numerator(&self) -> u8 {
        self.data2
    }

    /// The notated denominator of a time signature meta event (4 for quarter-note beats).
    pub fn timesig_denominator(&self) -> u8 {
        1u8.checked_shl(self.data3 as u32).unwrap_or(0)
    }

    /// The sharps (positive) or flats (negative) of a key signature meta event.
    pub fn keysig_sharps_flats(&self) -> i8 {
        self.data2 as i8
    }

    /// True if a key signature meta event denotes a minor key.
    pub fn keysig_is_minor(&self) -> bool {
        self.data3 != 0
    }

    /// The text of a text meta event as a readable string. The payload holds the exact bytes
    /// from the file (the MIDI file format never specified an encoding), so non-UTF-8 sequences
    /// render with replacement characters here while [`Message::payload`] stays lossless.
    pub fn text(&self) -> Cow<'_, str> {
        match self.sysex.as_deref() {
            Some(bytes) => String::from_utf8_lossy(bytes),
            None => Cow::Borrowed(""),
        }
    }

    /// Parses one wire message from raw bytes, e.g. from an input port callback. `None` when
    /// the bytes are not a complete single message.
    pub fn from_wire_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status < NOTE_OFF {
            return None;
        }
        if status == SYSEX_START {
            if *bytes.last()? != SYSEX_END {
                return None;
            }
            let mut msg = Self::new();
            msg.status = SYSEX_START;
            msg.sysex = Some(bytes.to_vec());
            return Some(msg);
        }
        let length = if status >= 0xf0 {
            SYS_MSG_LEN[(status & 0x0f) as usize]
        } else {
            CHAN_MSG_LEN[(status >> 4) as usize]
        };
        if length < 1 || bytes.len() != length as usize {
            return None;
        }
        let data1 = bytes.get(1).copied().unwrap_or(0);
        let data2 = bytes.get(2).copied().unwrap_or(0);
        Some(Self::channel_from_raw(status, data1, data2))
    }

    /// The bytes this message puts on a wire: the status byte plus its data bytes, or the full
    /// `F0 … F7` buffer for sysex. `None` for meta events and internal sentinels, which are
    /// never transmitted.
    pub fn wire_bytes(&self) -> Option<Vec<u8>> {
        if self.is_meta_event() || self.is_internal() {
            return None;
        }
        if self.is_sysex() {
            return self.sysex.clone();
        }
        let len = self.length()?;
        let mut bytes = Vec::with_capacity(len);
        bytes.push(self.status);
        if len > 1 {
            bytes.push(self.data1);
        }
        if len > 2 {
            bytes.push(self.data2);
        }
        Some(bytes)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_no_op() {
            return write!(f, "NOOP");
        }
        if self.is_beat_marker() {
            return write!(f, "BEAT MARKER");
        }
        if self.is_meta_event() {
            write!(f, "{} ", meta_msg_name(self.data1))?;
            return match self.data1 {
                META_GENERIC_TEXT..=META_TEXT_LAST => write!(f, "'{}'", self.text()),
                META_TEMPO => write!(f, "{:.2} bpm", self.tempo_bpm().unwrap_or(0.0)),
                META_TIMESIG => write!(
                    f,
                    "{}/{}",
                    self.timesig_numerator(),
                    self.timesig_denominator()
                ),
                META_KEYSIG => write!(
                    f,
                    "{}",
                    key_name(self.keysig_sharps_flats(), self.keysig_is_minor())
                ),
                META_SMPTE => {
                    let d = self.payload().unwrap_or(&[]);
                    write!(
                        f,
                        "{:02}:{:02}:{:02}:{:02}.{:02}",
                        d.first().copied().unwrap_or(0),
                        d.get(1).copied().unwrap_or(0),
                        d.get(2).copied().unwrap_or(0),
                        d.get(3).copied().unwrap_or(0),
                        d.get(4).copied().unwrap_or(0)
                    )
                }
                _ => Ok(()),
            };
        }
        if self.is_channel_msg() {
            write!(f, "{} ch={:2}", chan_msg_name(self.status), self.channel() + 1)?;
            return match self.status_type() {
                NOTE_ON | NOTE_OFF => write!(f, " note={:3} vel={:3}", self.data1, self.data2),
                POLY_PRESSURE => write!(f, " note={:3} pres={:3}", self.data1, self.data2),
                CONTROL_CHANGE => write!(f, " ctrl={:3} val={:3}", self.data1, self.data2),
                PROGRAM_CHANGE => write!(f, " prog={:3}", self.data1),
                CHANNEL_PRESSURE => write!(f, " pres={:3}", self.data1),
                PITCH_BEND => write!(f, " val={}", self.bender_value()),
                _ => Ok(()),
            };
        }
        write!(f, "{}", sys_msg_name(self.status))?;
        if self.is_sysex() {
            write!(f, " len={}", self.sysex.as_deref().map(<[u8]>::len).unwrap_or(0))?;
        }
        Ok(())
    }
}

/// A [`Message`] stamped with a [`MidiClockTime`]. Dereferences to the message it carries.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TimedMessage {
    msg: Message,
    time: MidiClockTime,
}

impl TimedMessage {
    pub fn new(time: MidiClockTime, msg: Message) -> Self {
        Self { msg, time }
    }

    pub fn time(&self) -> MidiClockTime {
        self.time
    }

    pub fn set_time(&mut self, time: MidiClockTime) {
        self.time = time;
    }

    /// Moves the message later by `delta` ticks.
    pub fn add_time(&mut self, delta: MidiClockTime) {
        self.time = self.time.saturating_add(delta);
    }

    /// Moves the message earlier by `delta` ticks, saturating at 0.
    pub fn sub_time(&mut self, delta: MidiClockTime) {
        self.time = self.time.saturating_sub(delta);
    }

    /// The message without its time stamp.
    pub fn message(&self) -> &Message {
        &self.msg
    }

    pub fn into_message(self) -> Message {
        self.msg
    }
}

impl From<Message> for TimedMessage {
    fn from(msg: Message) -> Self {
        Self::new(0, msg)
    }
}

impl Deref for TimedMessage {
    type Target = Message;

    fn deref(&self) -> &Self::Target {
        &self.msg
    }
}

impl DerefMut for TimedMessage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.msg
    }
}

impl Display for TimedMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:8} {}", self.time, self.msg)
    }
}

/// The ordering of two events competing for the same position in a track. `Less` means `a` is
/// stored before `b`. The rules, applied in order:
/// 1. NoOps sort last.
/// 2. Lower time sorts first.
/// 3. End-of-track sorts last at equal time.
/// 4. Meta events sort before channel and sysex events at equal time.
/// 5. SysEx sorts after channel events at equal time.
/// 6. Among channel events, lower channel sorts first.
/// 7. Non-note channel events sort before notes.
/// 8. Note off sorts before note on at equal time.
pub fn compare_for_insert(a: &TimedMessage, b: &TimedMessage) -> Ordering {
    match (a.is_no_op(), b.is_no_op()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    match a.time().cmp(&b.time()) {
        Ordering::Equal => {}
        unequal => return unequal,
    }

    match (a.is_end_of_track(), b.is_end_of_track()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    match (a.is_meta_event(), b.is_meta_event()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    match (a.is_sysex(), b.is_sysex()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    if a.is_channel_msg() && b.is_channel_msg() {
        match a.channel().cmp(&b.channel()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (a.is_note(), b.is_note()) {
            (false, false) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        return match (a.is_note_off(), b.is_note_off()) {
            (true, true) | (false, false) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        };
    }

    Ordering::Equal
}

/// Whether `a` and `b` are events of the same kind at the same time, for the replace insertion
/// modes: both NoOps; or notes on the same channel and note number; or control changes on the
/// same channel and controller; or other channel messages of the same type on the same channel;
/// or meta events of the same meta type; or other system messages with the same status.
pub fn is_same_kind(a: &TimedMessage, b: &TimedMessage) -> bool {
    if a.is_no_op() && b.is_no_op() {
        return true;
    }
    if a.time() != b.time() {
        return false;
    }
    if a.is_channel_msg() && b.is_channel_msg() && a.channel() == b.channel() {
        if a.status_type() != b.status_type() {
            return false;
        }
        if a.is_note() && b.is_note() && a.note() != b.note() {
            return false;
        }
        if a.is_control_change() && b.is_control_change() && a.controller() != b.controller() {
            return false;
        }
        return true;
    }
    if a.is_meta_event() && b.is_meta_event() {
        return a.meta_type() == b.meta_type();
    }
    a.status() == b.status() && !a.is_internal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_constructors() {
        let on = Message::note_on(1, 60, 100);
        assert_eq!(0x91, on.status());
        assert!(on.is_note_on());
        assert!(!on.is_note_off());
        assert!(on.is_channel_msg());
        assert_eq!(1, on.channel());
        assert_eq!(60, on.note());
        assert_eq!(100, on.velocity());

        let off = Message::note_off(1, 60, 64);
        assert_eq!(0x81, off.status());
        assert!(off.is_note_off());

        // a note on with velocity zero is a note off
        let onv0 = Message::note_on(1, 60, 0);
        assert!(onv0.is_note_off());
        assert!(!onv0.is_note_on());
    }

    #[test]
    fn bender_value_bias() {
        let centered = Message::pitch_bend(0, 0);
        assert_eq!(0, centered.bender_value());
        assert_eq!(0x00, centered.data1());
        assert_eq!(0x40, centered.data2());

        let max = Message::pitch_bend(0, 8191);
        assert_eq!(8191, max.bender_value());
        let min = Message::pitch_bend(0, -8192);
        assert_eq!(-8192, min.bender_value());
    }

    #[test]
    fn tempo_round_trip() {
        let msg = Message::tempo(120.0);
        assert_eq!(Some(500_000), msg.tempo_micros());
        assert!((msg.tempo_bpm().unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(3, msg.payload().unwrap().len());
    }

    #[test]
    fn timesig_fields() {
        let msg = Message::time_signature(6, 3);
        assert!(msg.is_time_sig());
        assert_eq!(6, msg.timesig_numerator());
        assert_eq!(8, msg.timesig_denominator());
        assert_eq!(&[6, 3, 24, 8], msg.payload().unwrap());
    }

    #[test]
    fn text_without_nul() {
        let msg = Message::track_name("piano");
        assert!(msg.is_track_name());
        assert_eq!(b"piano", msg.payload().unwrap());
        assert_eq!("piano", msg.text().as_ref());
    }

    #[test]
    fn non_utf8_text_keeps_its_bytes() {
        let msg = Message::meta_from_raw(META_TRACK_NAME, vec![0xc3, 0x28, b'x']);
        assert_eq!(&[0xc3, 0x28, b'x'], msg.payload().unwrap());
        // the readable view degrades, the payload does not
        assert!(msg.text().contains('x'));
        assert!(msg.text().contains('\u{fffd}'));
    }

    #[test]
    fn sysex_framing() {
        let msg = Message::system_exclusive(vec![0x7e, 0x7f, 0x09, 0x01]);
        let payload = msg.payload().unwrap();
        assert_eq!(0xf0, payload[0]);
        assert_eq!(0xf7, *payload.last().unwrap());
        assert!(msg.is_sysex());
        assert!(msg.is_system_message());
    }

    #[test]
    fn wire_bytes_skips_meta() {
        assert!(Message::tempo(100.0).wire_bytes().is_none());
        assert!(Message::beat_marker().wire_bytes().is_none());
        assert_eq!(
            vec![0x91, 60, 100],
            Message::note_on(1, 60, 100).wire_bytes().unwrap()
        );
        assert_eq!(
            vec![0xc2, 5],
            Message::program_change(2, 5).wire_bytes().unwrap()
        );
    }

    #[test]
    fn compare_rules() {
        let on = TimedMessage::new(100, Message::note_on(0, 60, 90));
        let off = TimedMessage::new(100, Message::note_off(0, 64, 0));
        let meta = TimedMessage::new(100, Message::tempo(100.0));
        let noop = TimedMessage::new(0, Message::new());
        let later = TimedMessage::new(101, Message::note_on(0, 60, 90));
        let ctrl = TimedMessage::new(100, Message::control_change(0, 7, 100));
        let chan1 = TimedMessage::new(100, Message::note_on(1, 60, 90));

        // noops are largest regardless of time
        assert_eq!(Ordering::Greater, compare_for_insert(&noop, &on));
        // lower time first
        assert_eq!(Ordering::Less, compare_for_insert(&on, &later));
        // meta before channel messages
        assert_eq!(Ordering::Less, compare_for_insert(&meta, &on));
        // lower channel first
        assert_eq!(Ordering::Less, compare_for_insert(&on, &chan1));
        // non-note before note
        assert_eq!(Ordering::Less, compare_for_insert(&ctrl, &on));
        // note off before note on
        assert_eq!(Ordering::Less, compare_for_insert(&off, &on));
    }

    #[test]
    fn same_kind_rules() {
        let a = TimedMessage::new(10, Message::control_change(2, 7, 100));
        let b = TimedMessage::new(10, Message::control_change(2, 7, 30));
        let c = TimedMessage::new(10, Message::control_change(2, 10, 30));
        let d = TimedMessage::new(11, Message::control_change(2, 7, 30));
        assert!(is_same_kind(&a, &b));
        assert!(!is_same_kind(&a, &c)); // different controller
        assert!(!is_same_kind(&a, &d)); // different time

        let t1 = TimedMessage::new(10, Message::tempo(100.0));
        let t2 = TimedMessage::new(10, Message::tempo(80.0));
        let k = TimedMessage::new(10, Message::key_signature(2, false));
        assert!(is_same_kind(&t1, &t2));
        assert!(!is_same_kind(&t1, &k));
    }

    #[test]
    fn display_is_readable() {
        let on = Message::note_on(0, 60, 100);
        let s = format!("{}", on);
        assert!(s.contains("NOTE ON"));
        let t = format!("{}", TimedMessage::new(480, Message::tempo(90.0)));
        assert!(t.contains("480"));
        assert!(t.contains("90.00 bpm"));
    }
}
