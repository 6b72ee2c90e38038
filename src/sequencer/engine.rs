use crate::core::{Message, MidiClockTime, TimedMessage};
use crate::driver::{OutDriver, PortRegistry};
use crate::error;
use crate::multi_track::MultiTrack;
use crate::notifier::{Notifier, NotifierEvent, TransportItem};
use crate::processor::Processor;
use crate::scheduler::{TickComponent, TickHandle, TickPriority, TickScheduler};
use crate::sequencer::state::SequencerState;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A cached state snapshot is kept every this many measures, so long seeks replay from the
/// nearest snapshot instead of from zero.
pub const MEASURES_PER_WARP: u32 = 4;

/// What happens when playback reaches the end of the song.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PlayMode {
    /// Stop, with an all-notes-off on every port.
    Bounded,
    /// Keep running (beats keep counting), e.g. while waiting for live input.
    Unbounded,
}

/// The channel treatment of one track's processor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Rechannel {
    /// Leave channels as they are.
    Keep,
    /// Force every channel event onto one channel.
    To(u8),
    /// Drop every channel event.
    Drop,
}

/// The per-track transformations applied to every event while playing: mute, solo, velocity
/// scaling, rechannelizing, transposing, and an optional user processor (applied last).
pub struct TrackProcessor {
    /// Drop all channel events of this track.
    pub mute: bool,
    /// When any track is soloed, only soloed tracks keep their channel events.
    pub solo: bool,
    /// Note-on velocity percentage (100 = unchanged); results clamp to 1..=127.
    pub velocity_scale: u16,
    pub rechannel: Rechannel,
    /// Signed semitones added to note numbers; notes leaving 0..=127 are dropped.
    pub transpose: i8,
    /// A user-supplied processor, run after the built-in steps.
    pub extra: Option<Box<dyn Processor>>,
}

impl Default for TrackProcessor {
    fn default() -> Self {
        Self {
            mute: false,
            solo: false,
            velocity_scale: 100,
            rechannel: Rechannel::Keep,
            transpose: 0,
            extra: None,
        }
    }
}

impl TrackProcessor {
    /// Applies the chain; `false` drops the event. Non-channel events only see the user
    /// processor.
    fn process(&mut self, msg: &mut TimedMessage, any_solo: bool) -> bool {
        if msg.is_channel_msg() {
            if self.mute {
                return false;
            }
            if any_solo && !self.solo {
                return false;
            }
            if msg.is_note_on() && self.velocity_scale != 100 {
                let scaled = msg.velocity() as u32 * self.velocity_scale as u32 / 100;
                msg.set_velocity(scaled.max(1).min(127) as u8);
            }
            match self.rechannel {
                Rechannel::Keep => {}
                Rechannel::To(channel) => msg.set_channel(channel),
                Rechannel::Drop => return false,
            }
            if self.transpose != 0 && (msg.is_note() || msg.is_poly_pressure()) {
                let note = msg.note() as i16 + self.transpose as i16;
                if !(0..=127).contains(&note) {
                    return false;
                }
                msg.set_note(note as u8);
            }
        }
        match self.extra.as_mut() {
            Some(processor) => processor.process(msg),
            None => true,
        }
    }
}

/// What a pump pass does with the events it visits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PumpMode {
    /// Live playback: track processors, notifications, output.
    Play,
    /// Seek replay: raw events into the state; optionally chase non-note channel events and
    /// sysex to the ports so the destination synth matches the state.
    Replay { chase: bool },
}

/// One step's pick: the track event under the iterator, or a synthetic beat marker. At a shared
/// tick, master-track events come first, then the beat, then later tracks' events.
enum Step {
    Event,
    Beat(MidiClockTime),
    Exhausted,
}

struct SequencerCore {
    multi_track: MultiTrack,
    state: SequencerState,
    processors: Vec<TrackProcessor>,
    track_ports: Vec<Option<usize>>,
    ports: Vec<Arc<OutDriver>>,
    notifier: Option<Arc<dyn Notifier>>,
    playing: Arc<AtomicBool>,
    tempo_scale: u16,
    play_mode: PlayMode,
    chase_events: bool,
    /// Repeat window in measures: wraps from the end measure back to the start measure.
    repeat: Option<(u32, u32)>,
    warps: Vec<SequencerState>,
    anchor_clock: MidiClockTime,
    anchor_sys_ms: f64,
    /// The ports opened by `play`, closed again by `stop`.
    opened: Vec<Arc<OutDriver>>,
}

impl SequencerCore {
    fn new(
        multi_track: MultiTrack,
        registry: &PortRegistry,
        notifier: Option<Arc<dyn Notifier>>,
        playing: Arc<AtomicBool>,
    ) -> Self {
        let num_tracks = multi_track.num_tracks();
        let clocks_per_beat = multi_track.clocks_per_beat();
        let default_port = if registry.num_outs() > 0 { Some(0) } else { None };
        let mut core = Self {
            state: SequencerState::new(num_tracks, clocks_per_beat),
            multi_track,
            processors: (0..num_tracks).map(|_| TrackProcessor::default()).collect(),
            track_ports: vec![default_port; num_tracks],
            ports: registry.out_drivers().to_vec(),
            notifier,
            playing,
            tempo_scale: 100,
            play_mode: PlayMode::Bounded,
            chase_events: true,
            repeat: None,
            warps: Vec::new(),
            anchor_clock: 0,
            anchor_sys_ms: 0.0,
            opened: Vec::new(),
        };
        core.state.iter_state.go_to_time(&core.multi_track, 0);
        core.rebuild_warps();
        core
    }

    /// Milliseconds of wall clock per MIDI tick, including the playback speed scale.
    fn wall_ms_per_clock(&self) -> f64 {
        self.state.ms_per_clock() * 100.0 / self.tempo_scale as f64
    }

    fn notify(&self, event: NotifierEvent) {
        if let Some(notifier) = self.notifier.as_deref() {
            if notifier.is_enabled() {
                notifier.notify(event);
            }
        }
    }

    /// Picks the next thing at or before `limit`, skipping end-of-track events.
    fn next_step(&mut self, limit: MidiClockTime) -> Step {
        loop {
            let beat_time = self.state.next_beat_time;
            let event = self.state.iter_state.cur_event(&self.multi_track);
            match event {
                Some((track, msg)) => {
                    if msg.is_end_of_track() {
                        self.state.iter_state.advance(&self.multi_track);
                        continue;
                    }
                    let time = msg.time();
                    let beat_first = match time.cmp(&beat_time) {
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Equal => track != 0,
                    };
                    if beat_first {
                        if beat_time > limit {
                            return Step::Exhausted;
                        }
                        return Step::Beat(beat_time);
                    }
                    if time > limit {
                        return Step::Exhausted;
                    }
                    return Step::Event;
                }
                None => {
                    if beat_time > limit {
                        return Step::Exhausted;
                    }
                    return Step::Beat(beat_time);
                }
            }
        }
    }

    /// Processes one event or beat marker. Returns `false` when nothing remains at or before
    /// `limit`.
    fn pump_step(&mut self, limit: MidiClockTime, mode: PumpMode) -> bool {
        match self.next_step(limit) {
            Step::Exhausted => false,
            Step::Beat(beat_time) => {
                let marker = TimedMessage::new(beat_time, Message::beat_marker());
                match mode {
                    PumpMode::Play => {
                        let notifier = self.notifier.clone();
                        self.state.process(0, &marker, notifier.as_deref());
                    }
                    PumpMode::Replay { .. } => self.state.process(0, &marker, None),
                }
                true
            }
            Step::Event => {
                let (track, msg) = match self.state.iter_state.cur_event(&self.multi_track) {
                    Some((track, msg)) => (track, msg.clone()),
                    None => return false,
                };
                self.state.iter_state.advance(&self.multi_track);
                match mode {
                    PumpMode::Play => self.play_event(track, msg),
                    PumpMode::Replay { chase } => self.replay_event(track, msg, chase),
                }
                true
            }
        }
    }

    fn play_event(&mut self, track: usize, msg: TimedMessage) {
        let mut msg = msg;
        let any_solo = self.processors.iter().any(|p| p.solo);
        if !self.processors[track].process(&mut msg, any_solo) {
            return;
        }
        if msg.is_tempo() {
            // re-anchor the wall clock at the change, with the outgoing rate
            self.anchor_sys_ms +=
                (msg.time() - self.anchor_clock) as f64 * self.wall_ms_per_clock();
            self.anchor_clock = msg.time();
        }
        let notifier = self.notifier.clone();
        self.state.process(track, &msg, notifier.as_deref());
        self.output(track, &msg);
    }

    fn replay_event(&mut self, track: usize, msg: TimedMessage, chase: bool) {
        self.state.process(track, &msg, None);
        if chase
            && (msg.is_program_change()
                || (msg.is_control_change() && !msg.is_note())
                || msg.is_pitch_bend()
                || msg.is_sysex())
        {
            self.output(track, &msg);
        }
    }

    fn output(&self, track: usize, msg: &TimedMessage) {
        if let Some(Some(port)) = self.track_ports.get(track) {
            if let Some(driver) = self.ports.get(*port) {
                driver.output(msg);
            }
        }
    }

    /// Recomputes the warp snapshots: the reset state, then one after the downbeat of every
    /// [`MEASURES_PER_WARP`]-th measure.
    fn rebuild_warps(&mut self) {
        let saved = self.state.clone();
        self.state.reset();
        self.state.iter_state.go_to_time(&self.multi_track, 0);
        self.warps = vec![self.state.clone()];
        let end = self.multi_track.end_time();
        while self.pump_step(end, PumpMode::Replay { chase: false }) {
            let measure = self.state.cur_measure;
            if self.state.cur_beat == 0
                && measure > 0
                && measure % MEASURES_PER_WARP == 0
                && self.warps.len() == (measure / MEASURES_PER_WARP) as usize
            {
                self.warps.push(self.state.clone());
            }
        }
        debug!("{} warp positions over {} measures", self.warps.len(), self.state.cur_measure);
        self.state = saved;
    }

    fn chase_wanted(&self) -> bool {
        self.chase_events && !self.ports.is_empty()
    }

    /// Seek to a tick: restart from the nearest warp at or before it, replay events with time
    /// ≤ the target, then settle the position. One `All` notification replaces the per-change
    /// stream.
    fn go_to_time(&mut self, time: MidiClockTime) {
        let chase = self.chase_wanted();
        self.state = match self.warps.iter().rev().find(|w| w.cur_clock <= time) {
            Some(warp) => warp.clone(),
            None => {
                let mut state =
                    SequencerState::new(self.state.num_tracks(), self.state.clocks_per_beat());
                state.iter_state.go_to_time(&self.multi_track, 0);
                state
            }
        };
        while self.pump_step(time, PumpMode::Replay { chase }) {}
        self.state.cur_time_ms = self.state.time_ms_at(time);
        self.state.cur_clock = time;
        self.notify(NotifierEvent::All);
    }

    /// Seek to a measure and beat, counting beats from the nearest warp.
    fn go_to_measure(&mut self, measure: u32, beat: u32) {
        let chase = self.chase_wanted();
        let warp_index = ((measure / MEASURES_PER_WARP) as usize).min(self.warps.len().saturating_sub(1));
        self.state = match self.warps.get(warp_index) {
            Some(warp) => warp.clone(),
            None => {
                let mut state =
                    SequencerState::new(self.state.num_tracks(), self.state.clocks_per_beat());
                state.iter_state.go_to_time(&self.multi_track, 0);
                state
            }
        };
        let end = self.multi_track.end_time();
        while (self.state.cur_measure, self.state.cur_beat) < (measure, beat) {
            if !self.pump_step(end, PumpMode::Replay { chase }) {
                warn!("seek target measure {} is past the end of the song", measure);
                break;
            }
        }
        self.notify(NotifierEvent::All);
    }

    /// The tick time of the next step (event or beat marker), without processing it.
    fn next_step_time(&mut self) -> Option<MidiClockTime> {
        match self.next_step(MidiClockTime::MAX) {
            Step::Exhausted => None,
            Step::Beat(time) => Some(time),
            Step::Event => self
                .state
                .iter_state
                .cur_event(&self.multi_track)
                .map(|(_, msg)| msg.time()),
        }
    }

    /// The clock pump, called about once a millisecond while playing. Each step fires when its
    /// wall-clock time comes due; the anchors move at every tempo change, so the conversion is
    /// always taken at the current tempo.
    fn tick(&mut self, now_ms: u64) {
        if !self.playing.load(Ordering::SeqCst) {
            return;
        }
        while let Some(step_time) = self.next_step_time() {
            let wall = self.anchor_sys_ms
                + step_time.saturating_sub(self.anchor_clock) as f64 * self.wall_ms_per_clock();
            if wall > now_ms as f64 {
                break;
            }
            if !self.pump_step(step_time, PumpMode::Play) {
                break;
            }
        }

        let elapsed = (now_ms as f64 - self.anchor_sys_ms).max(0.0);
        let target = self.anchor_clock + (elapsed / self.wall_ms_per_clock()) as MidiClockTime;

        if let Some((repeat_start, repeat_end)) = self.repeat {
            if self.state.cur_measure >= repeat_end {
                debug!("repeat wrap to measure {}", repeat_start);
                self.go_to_measure(repeat_start, 0);
                self.anchor_clock = self.state.cur_clock;
                self.anchor_sys_ms = now_ms as f64;
                return;
            }
        }

        let song_end = self.multi_track.end_time();
        if self.play_mode == PlayMode::Bounded && target >= song_end {
            self.playing.store(false, Ordering::SeqCst);
            self.all_sounds_off();
            self.state.cur_time_ms = self.state.time_ms_at(song_end);
            self.state.cur_clock = song_end;
            self.notify(NotifierEvent::Transport(TransportItem::Stop));
            debug!("end of song reached, stopped");
            return;
        }

        if target > self.state.cur_clock {
            self.state.cur_time_ms = self.state.time_ms_at(target);
            self.state.cur_clock = target;
        }
    }

    fn used_ports(&self) -> Vec<Arc<OutDriver>> {
        let mut seen = vec![false; self.ports.len()];
        for port in self.track_ports.iter().flatten() {
            if let Some(flag) = seen.get_mut(*port) {
                *flag = true;
            }
        }
        self.ports
            .iter()
            .enumerate()
            .filter(|(index, _)| seen[*index])
            .map(|(_, driver)| Arc::clone(driver))
            .collect()
    }

    fn all_sounds_off(&self) {
        for driver in self.used_ports() {
            driver.all_notes_off_all_channels();
        }
    }
}

impl TickComponent for SequencerCore {
    fn tick(&mut self, now_ms: u64) {
        SequencerCore::tick(self, now_ms);
    }
}

/// The playback engine: owns a [`MultiTrack`], runs it through per-track processors onto output
/// ports on the tick thread, keeps the [`SequencerState`] in sync, and reports happenings to a
/// [`Notifier`].
///
/// Threading follows a stop-modify-resume discipline: transport controls and track settings
/// work any time, but seeking and editing the multitrack require the sequencer to be stopped
/// and return an error otherwise.
pub struct Sequencer {
    core: Arc<Mutex<SequencerCore>>,
    scheduler: TickScheduler,
    playing: Arc<AtomicBool>,
    handle: Mutex<Option<TickHandle>>,
}

impl Sequencer {
    /// Builds a sequencer for a song. Every track initially plays to out port 0 of the registry
    /// (or nowhere when the registry has no out ports).
    pub fn new(
        multi_track: MultiTrack,
        registry: &PortRegistry,
        notifier: Option<Arc<dyn Notifier>>,
        scheduler: TickScheduler,
    ) -> Self {
        let playing = Arc::new(AtomicBool::new(false));
        let core = SequencerCore::new(multi_track, registry, notifier, Arc::clone(&playing));
        Self {
            core: Arc::new(Mutex::new(core)),
            scheduler,
            playing,
            handle: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SequencerCore> {
        self.core.lock().expect("sequencer poisoned")
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Starts playback from the current position: opens the output ports, anchors the clock and
    /// registers with the tick scheduler.
    pub fn play(&self) -> crate::Result<()> {
        {
            let mut core = self.lock();
            if self.playing.load(Ordering::SeqCst) {
                return Ok(());
            }
            let used = core.used_ports();
            for (index, driver) in used.iter().enumerate() {
                if let Err(e) = driver.open() {
                    for opened in &used[..index] {
                        opened.close();
                    }
                    return Err(e);
                }
            }
            core.opened = used;
            core.anchor_clock = core.state.cur_clock;
            core.anchor_sys_ms = self.scheduler.now_ms() as f64;
            self.playing.store(true, Ordering::SeqCst);
            core.notify(NotifierEvent::Transport(TransportItem::Start));
        }
        let mut handle = self.handle.lock().expect("sequencer poisoned");
        if handle.is_none() {
            let component: Arc<Mutex<dyn TickComponent>> = self.core.clone();
            *handle = Some(self.scheduler.register(TickPriority::Sequencer, component));
        }
        Ok(())
    }

    /// Stops playback cooperatively: the current tick pass drains, every used port receives an
    /// all-notes-off, and the scheduler registration is dropped.
    pub fn stop(&self) {
        let was_playing = self.playing.swap(false, Ordering::SeqCst);
        {
            let mut core = self.lock();
            if was_playing {
                core.all_sounds_off();
                core.notify(NotifierEvent::Transport(TransportItem::Stop));
            }
            for driver in core.opened.drain(..) {
                driver.close();
            }
        }
        let handle = self.handle.lock().expect("sequencer poisoned").take();
        if let Some(handle) = handle {
            self.scheduler.unregister(handle);
        }
    }

    /// Rewinds to tick 0. Errors while playing.
    pub fn go_to_zero(&self) -> crate::Result<()> {
        self.go_to_time(0)
    }

    /// Seeks to a tick, replaying state (and chasing program/controller/sysex messages to the
    /// ports) on the way. Errors while playing.
    pub fn go_to_time(&self, time: MidiClockTime) -> crate::Result<()> {
        if self.is_playing() {
            return Err(error::SequencerPlayingSnafu.build().into());
        }
        self.lock().go_to_time(time);
        Ok(())
    }

    /// Seeks to a measure and beat (both starting at 0). Errors while playing.
    pub fn go_to_measure(&self, measure: u32, beat: u32) -> crate::Result<()> {
        if self.is_playing() {
            return Err(error::SequencerPlayingSnafu.build().into());
        }
        self.lock().go_to_measure(measure, beat);
        Ok(())
    }

    /// Edits the song under the stop-modify-resume discipline: errors while playing, otherwise
    /// applies `edit` to the multitrack, then resizes the runtime structures, rebuilds the warp
    /// snapshots and rewinds to zero.
    pub fn edit<T>(&self, edit: impl FnOnce(&mut MultiTrack) -> T) -> crate::Result<T> {
        if self.is_playing() {
            return Err(error::SequencerPlayingSnafu.build().into());
        }
        let mut core = self.lock();
        let result = edit(&mut core.multi_track);

        let num_tracks = core.multi_track.num_tracks();
        let clocks_per_beat = core.multi_track.clocks_per_beat();
        core.processors
            .resize_with(num_tracks, TrackProcessor::default);
        let default_port = if core.ports.is_empty() { None } else { Some(0) };
        core.track_ports.resize(num_tracks, default_port);
        core.state = SequencerState::new(num_tracks, clocks_per_beat);
        let SequencerCore {
            multi_track, state, ..
        } = &mut *core;
        state.iter_state.go_to_time(multi_track, 0);
        core.rebuild_warps();
        core.notify(NotifierEvent::All);
        Ok(result)
    }

    /// Reads the song without editing it.
    pub fn inspect<T>(&self, f: impl FnOnce(&MultiTrack) -> T) -> T {
        f(&self.lock().multi_track)
    }

    /// A snapshot of the runtime state.
    pub fn state(&self) -> SequencerState {
        self.lock().state.clone()
    }

    pub fn current_clock(&self) -> MidiClockTime {
        self.lock().state.cur_clock
    }

    pub fn current_time_ms(&self) -> f64 {
        self.lock().state.cur_time_ms
    }

    pub fn current_measure(&self) -> u32 {
        self.lock().state.cur_measure
    }

    pub fn current_beat(&self) -> u32 {
        self.lock().state.cur_beat
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.lock().state.tempo_bpm
    }

    /// The playback speed percentage (100 = normal, 200 = double speed).
    pub fn tempo_scale(&self) -> u16 {
        self.lock().tempo_scale
    }

    /// Changes the playback speed, re-anchoring the clock so the position does not jump.
    pub fn set_tempo_scale(&self, percent: u16) {
        let mut core = self.lock();
        core.anchor_clock = core.state.cur_clock;
        core.anchor_sys_ms = self.scheduler.now_ms() as f64;
        core.tempo_scale = percent.max(1);
    }

    pub fn set_play_mode(&self, mode: PlayMode) {
        self.lock().play_mode = mode;
    }

    /// Whether seeks send program/controller/sysex chase messages to the ports.
    pub fn set_chase_events(&self, enabled: bool) {
        self.lock().chase_events = enabled;
    }

    /// Sets (or clears) the repeat window in measures; on reaching `end` playback wraps to
    /// `start`.
    pub fn set_repeat_play(&self, window: Option<(u32, u32)>) {
        self.lock().repeat = match window {
            Some((start, end)) if end > start => Some((start, end)),
            Some(_) => None,
            None => None,
        };
    }

    pub fn num_tracks(&self) -> usize {
        self.lock().multi_track.num_tracks()
    }

    /// The end of the song in ticks.
    pub fn song_end_time(&self) -> MidiClockTime {
        self.lock().multi_track.end_time()
    }

    /// The number of measures in the song, counted with the time signature history.
    pub fn num_measures(&self) -> u32 {
        let mut core = self.lock();
        let saved = core.state.clone();
        let end = core.multi_track.end_time();
        core.state = match core.warps.last() {
            Some(warp) => warp.clone(),
            None => saved.clone(),
        };
        while core.pump_step(end, PumpMode::Replay { chase: false }) {}
        // a measure that starts exactly at the end of the song is not counted
        let measures = if core.state.cur_beat == 0 && core.state.cur_clock >= end {
            core.state.cur_measure
        } else {
            core.state.cur_measure + 1
        };
        core.state = saved;
        measures
    }

    pub fn set_track_mute(&self, track: usize, mute: bool) -> crate::Result<()> {
        self.with_processor(track, |p| p.mute = mute)
    }

    pub fn set_track_solo(&self, track: usize, solo: bool) -> crate::Result<()> {
        self.with_processor(track, |p| p.solo = solo)
    }

    pub fn set_track_velocity_scale(&self, track: usize, percent: u16) -> crate::Result<()> {
        self.with_processor(track, |p| p.velocity_scale = percent)
    }

    pub fn set_track_transpose(&self, track: usize, semitones: i8) -> crate::Result<()> {
        self.with_processor(track, |p| p.transpose = semitones)
    }

    pub fn set_track_rechannel(&self, track: usize, rechannel: Rechannel) -> crate::Result<()> {
        self.with_processor(track, |p| p.rechannel = rechannel)
    }

    /// Installs a user processor run after the built-in per-track steps.
    pub fn set_track_processor(
        &self,
        track: usize,
        processor: Option<Box<dyn Processor>>,
    ) -> crate::Result<()> {
        self.with_processor(track, |p| p.extra = processor)
    }

    fn with_processor(
        &self,
        track: usize,
        f: impl FnOnce(&mut TrackProcessor),
    ) -> crate::Result<()> {
        let mut core = self.lock();
        match core.processors.get_mut(track) {
            Some(processor) => {
                f(processor);
                Ok(())
            }
            None => Err(error::TrackIndexSnafu { index: track }.build().into()),
        }
    }

    /// Routes a track to an out port of the registry, or to nowhere.
    pub fn set_track_out_port(&self, track: usize, port: Option<usize>) -> crate::Result<()> {
        let mut core = self.lock();
        if let Some(port) = port {
            if port >= core.ports.len() {
                return Err(error::PortIndexSnafu { index: port }.build().into());
            }
        }
        match core.track_ports.get_mut(track) {
            Some(slot) => {
                *slot = port;
                Ok(())
            }
            None => Err(error::TrackIndexSnafu { index: track }.build().into()),
        }
    }

    /// The name a track got from its first track-name meta event.
    pub fn track_name(&self, track: usize) -> Option<String> {
        self.lock()
            .state
            .track_states
            .get(track)
            .map(|s| s.track_name.clone())
    }

    /// The program last seen on a track.
    pub fn track_program(&self, track: usize) -> Option<u8> {
        self.lock().state.track_states.get(track).and_then(|s| s.program)
    }

    /// The volume (controller 7) last seen on a track.
    pub fn track_volume(&self, track: usize) -> Option<u8> {
        self.lock().state.track_states.get(track).and_then(|s| s.volume())
    }

    /// The pan (controller 10) last seen on a track.
    pub fn track_pan(&self, track: usize) -> Option<u8> {
        self.lock().state.track_states.get(track).and_then(|s| s.pan())
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}
