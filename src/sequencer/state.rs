use crate::core::constants::{
    C_CHORUS, C_MAIN_VOLUME, C_PAN, C_REVERB, DEFAULT_TEMPO_BPM, DEFAULT_TIMESIG_DENOMINATOR,
    DEFAULT_TIMESIG_NUMERATOR,
};
use crate::core::{MidiClockTime, NoteMatrix, TimedMessage};
use crate::multi_track::MultiTrackIterState;
use crate::notifier::{ConductorItem, Notifier, NotifierEvent, TrackItem, TransportItem};

/// The runtime state of one track: the last seen program, controller values, pitch bend, the
/// track name, and the matrix of sounding notes.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackState {
    /// The program last sent, `None` until one has been.
    pub program: Option<u8>,
    /// The 128 controller values, each `None` until the controller has been seen.
    pub controllers: Vec<Option<u8>>,
    /// The last pitch bend amount (0 is centered).
    pub bender_value: i16,
    /// The track name from the first track name meta event.
    pub track_name: String,
    /// The sounding notes of this track.
    pub matrix: NoteMatrix,
    got_track_name: bool,
}

impl Default for TrackState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackState {
    pub fn new() -> Self {
        Self {
            program: None,
            controllers: vec![None; 128],
            bender_value: 0,
            track_name: String::new(),
            matrix: NoteMatrix::new(),
            got_track_name: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The last main volume (controller 7) value.
    pub fn volume(&self) -> Option<u8> {
        self.controllers[C_MAIN_VOLUME as usize]
    }

    /// The last pan (controller 10) value.
    pub fn pan(&self) -> Option<u8> {
        self.controllers[C_PAN as usize]
    }
}

/// The whole-song runtime state: transport position, conductor values, one [`TrackState`] per
/// track, and the merge iterator's position. The invariant: after processing any event, the
/// state equals what a fresh state reaches by replaying every event with time ≤ the current
/// tick. Wall-clock concerns (tempo scale) are deliberately absent, so replays are
/// deterministic at any playback speed.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerState {
    /// The current position in MIDI ticks.
    pub cur_clock: MidiClockTime,
    /// The current position in (musical) milliseconds.
    pub cur_time_ms: f64,
    /// The current beat within the measure, starting at 0.
    pub cur_beat: u32,
    /// The current measure, starting at 0.
    pub cur_measure: u32,
    /// The tick of the next beat boundary.
    pub next_beat_time: MidiClockTime,
    /// The current tempo in beats per minute.
    pub tempo_bpm: f64,
    pub timesig_numerator: u8,
    pub timesig_denominator: u8,
    /// Sharps (positive) or flats (negative) of the current key signature.
    pub keysig_sharps_flats: i8,
    /// Whether the current key is minor.
    pub keysig_minor: bool,
    /// The last marker text.
    pub marker: String,
    /// One state per track.
    pub track_states: Vec<TrackState>,
    /// The merge iterator's position.
    pub iter_state: MultiTrackIterState,
    clocks_per_beat: u16,
    // anchors for the tick → millisecond conversion, moved at every tempo change so that the
    // mapping stays piecewise linear and monotonic
    ms_anchor_clock: MidiClockTime,
    ms_anchor: f64,
}

impl SequencerState {
    pub fn new(num_tracks: usize, clocks_per_beat: u16) -> Self {
        Self {
            cur_clock: 0,
            cur_time_ms: 0.0,
            cur_beat: 0,
            cur_measure: 0,
            next_beat_time: 0,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            timesig_numerator: DEFAULT_TIMESIG_NUMERATOR,
            timesig_denominator: DEFAULT_TIMESIG_DENOMINATOR,
            keysig_sharps_flats: 0,
            keysig_minor: false,
            marker: String::new(),
            track_states: vec![TrackState::new(); num_tracks],
            iter_state: MultiTrackIterState::new(num_tracks),
            clocks_per_beat: clocks_per_beat.max(1),
            ms_anchor_clock: 0,
            ms_anchor: 0.0,
        }
    }

    /// Back to the defaults: tick 0, 120 bpm, 4/4, C major, no marker, empty track states.
    pub fn reset(&mut self) {
        *self = Self::new(self.track_states.len(), self.clocks_per_beat);
    }

    pub fn num_tracks(&self) -> usize {
        self.track_states.len()
    }

    pub fn clocks_per_beat(&self) -> u16 {
        self.clocks_per_beat
    }

    /// Milliseconds per tick at the current tempo, without any playback speed scaling.
    pub fn ms_per_clock(&self) -> f64 {
        60_000.0 / (self.tempo_bpm * self.clocks_per_beat as f64)
    }

    /// The musical millisecond position of a tick at or after the last tempo change.
    pub fn time_ms_at(&self, clock: MidiClockTime) -> f64 {
        self.ms_anchor + (clock.saturating_sub(self.ms_anchor_clock)) as f64 * self.ms_per_clock()
    }

    /// The tick length of one beat under the current time signature.
    pub fn beat_length(&self) -> MidiClockTime {
        self.clocks_per_beat as MidiClockTime * 4 / self.timesig_denominator.max(1) as MidiClockTime
    }

    /// Applies one event to the state, emitting per-change notifications. This is called for
    /// every event actually emitted while playing (muted events never get here) and for every
    /// event replayed by a seek (with the notifier silenced).
    pub fn process(&mut self, track: usize, msg: &TimedMessage, notifier: Option<&dyn Notifier>) {
        if msg.time() > self.cur_clock {
            self.cur_time_ms = self.time_ms_at(msg.time());
            self.cur_clock = msg.time();
        }
        if msg.is_beat_marker() {
            self.process_beat_marker(msg.time(), notifier);
            return;
        }
        if msg.is_channel_msg() {
            let track_state = match self.track_states.get_mut(track) {
                Some(track_state) => track_state,
                None => return,
            };
            if msg.is_program_change() {
                track_state.program = Some(msg.program());
                notify(notifier, NotifierEvent::Track { track, item: TrackItem::Program });
            } else if msg.is_control_change() {
                track_state.controllers[msg.controller() as usize] = Some(msg.controller_value());
                track_state.matrix.process(msg);
                match msg.controller() {
                    C_MAIN_VOLUME => {
                        notify(notifier, NotifierEvent::Track { track, item: TrackItem::Volume })
                    }
                    C_PAN => notify(notifier, NotifierEvent::Track { track, item: TrackItem::Pan }),
                    C_CHORUS => {
                        notify(notifier, NotifierEvent::Track { track, item: TrackItem::Chorus })
                    }
                    C_REVERB => {
                        notify(notifier, NotifierEvent::Track { track, item: TrackItem::Reverb })
                    }
                    _ => {}
                }
            } else if msg.is_pitch_bend() {
                track_state.bender_value = msg.bender_value();
            } else if msg.is_note() {
                track_state.matrix.process(msg);
                notify(notifier, NotifierEvent::Track { track, item: TrackItem::Note });
            }
            return;
        }
        if msg.is_meta_event() {
            if msg.is_tempo() {
                // move the millisecond anchor so the mapping stays monotonic across the change
                self.ms_anchor = self.time_ms_at(msg.time());
                self.ms_anchor_clock = msg.time();
                if let Some(bpm) = msg.tempo_bpm() {
                    self.tempo_bpm = bpm;
                }
                notify(notifier, NotifierEvent::Conductor(ConductorItem::Tempo));
            } else if msg.is_time_sig() {
                self.timesig_numerator = msg.timesig_numerator().max(1);
                self.timesig_denominator = msg.timesig_denominator().max(1);
                notify(notifier, NotifierEvent::Conductor(ConductorItem::TimeSig));
            } else if msg.is_key_sig() {
                self.keysig_sharps_flats = msg.keysig_sharps_flats();
                self.keysig_minor = msg.keysig_is_minor();
                notify(notifier, NotifierEvent::Conductor(ConductorItem::KeySig));
            } else if msg.is_marker_text() {
                self.marker = msg.text().into_owned();
                notify(notifier, NotifierEvent::Conductor(ConductorItem::Marker));
            } else if msg.is_track_name() {
                if let Some(track_state) = self.track_states.get_mut(track) {
                    if !track_state.got_track_name {
                        track_state.track_name = msg.text().into_owned();
                        track_state.got_track_name = true;
                        notify(notifier, NotifierEvent::Track { track, item: TrackItem::Name });
                    }
                }
            }
        }
    }

    fn process_beat_marker(&mut self, time: MidiClockTime, notifier: Option<&dyn Notifier>) {
        if time == 0 {
            // the downbeat of measure 0; nothing to advance yet
            notify(notifier, NotifierEvent::Transport(TransportItem::Measure));
            notify(notifier, NotifierEvent::Transport(TransportItem::Beat));
        } else {
            self.cur_beat += 1;
            if self.cur_beat >= self.timesig_numerator as u32 {
                self.cur_beat = 0;
                self.cur_measure += 1;
                notify(notifier, NotifierEvent::Transport(TransportItem::Measure));
            }
            notify(notifier, NotifierEvent::Transport(TransportItem::Beat));
        }
        self.next_beat_time = time + self.beat_length();
    }
}

fn notify(notifier: Option<&dyn Notifier>, event: NotifierEvent) {
    if let Some(notifier) = notifier {
        if notifier.is_enabled() {
            notifier.notify(event);
        }
    }
}
