/*!
The `track` module provides the [`Track`]: an ordered sequence of [`TimedMessage`]s with editing
operations that preserve the track invariants.

Invariants:
1. The last event is always an end-of-track meta. A new track gets one at time 0; editing may
   move it later but never remove it.
2. Event times are non-decreasing.
3. Events with equal times are ordered by [`compare_for_insert`].
!*/

use crate::core::{
    compare_for_insert, is_same_kind, Message, MidiClockTime, NoteMatrix, TimedMessage,
    TIME_INFINITE,
};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// What to do when an event of the same kind already exists at the insertion time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InsertMode {
    /// Always add the event, duplicating if needed.
    Insert,
    /// Replace a same-kind event; fail if none is present.
    Replace,
    /// Replace a same-kind event if present, else insert.
    InsertOrReplace,
    /// As [`InsertMode::InsertOrReplace`], except notes are always added.
    InsertOrReplaceButNote,
}

impl Default for InsertMode {
    fn default() -> Self {
        InsertMode::InsertOrReplace
    }
}

/// How [`Track::find_event_number`] matches a candidate event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FindMode {
    /// Bitwise equality, including the payload.
    Equal,
    /// Same kind, see [`is_same_kind`].
    SameKind,
    /// Any event with the same time.
    Time,
}

/// The derived classification of a track's contents, computed on demand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TrackKind {
    /// No events besides the end-of-track.
    Empty,
    /// Conductor meta events (tempo, time signature, key signature…) and no channel events.
    Main,
    /// Only text meta events (probably lyrics).
    Text,
    /// A normal channel track; all channel events share the channel.
    Chan(u8),
    /// A single-channel track that also carries conductor meta events.
    IrregChan(u8),
    /// Channel events on more than one channel.
    MixedChan,
    /// Only ordinary sysex events.
    Sysex,
    /// Reset sysex (GM, GS or XG reset).
    ResetSysex,
    /// Both ordinary and reset sysex events.
    BothSysex,
    /// None of the above.
    Unknown,
}

const GM_RESET: &[u8] = &[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7];
const GS_RESET: &[u8] = &[0xf0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7f, 0x00, 0x41, 0xf7];
const XG_RESET: &[u8] = &[0xf0, 0x43, 0x10, 0x4c, 0x00, 0x00, 0x7e, 0x00, 0xf7];

/// An ordered sequence of timed MIDI messages, terminated by an end-of-track meta event.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Track {
    events: Vec<TimedMessage>,
    default_insert_mode: InsertMode,
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}

impl Track {
    /// A new track containing only the end-of-track event, at time 0.
    pub fn new() -> Self {
        Self::with_end_time(0)
    }

    /// A new track containing only the end-of-track event, at the given time.
    pub fn with_end_time(end: MidiClockTime) -> Self {
        Self {
            events: vec![TimedMessage::new(end, Message::end_of_track())],
            default_insert_mode: InsertMode::default(),
        }
    }

    /// Removes every event and resets the end-of-track to time 0.
    pub fn clear(&mut self) {
        self.events.clear();
        self.events
            .push(TimedMessage::new(0, Message::end_of_track()));
    }

    /// True when the track holds nothing but the end-of-track event.
    pub fn is_empty(&self) -> bool {
        self.events.len() == 1
    }

    /// The number of events, including the end-of-track.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Iterator over the events, in order, ending with the end-of-track.
    pub fn events(&self) -> impl Iterator<Item = &TimedMessage> {
        self.events.iter()
    }

    pub fn event(&self, index: usize) -> Option<&TimedMessage> {
        self.events.get(index)
    }

    /// The insertion policy used when `insert_event` is called without an explicit mode.
    pub fn default_insert_mode(&self) -> InsertMode {
        self.default_insert_mode
    }

    pub fn set_default_insert_mode(&mut self, mode: InsertMode) {
        self.default_insert_mode = mode;
    }

    /// The time of the end-of-track event.
    pub fn end_time(&self) -> MidiClockTime {
        self.events
            .last()
            .map(TimedMessage::time)
            .unwrap_or_default()
    }

    /// Moves the end-of-track to `end`. Fails (returning `false`, with no mutation) if any other
    /// event lies past `end`.
    pub fn set_end_time(&mut self, end: MidiClockTime) -> bool {
        if self.events.len() > 1 {
            let last_musical = self.events[self.events.len() - 2].time();
            if last_musical > end {
                return false;
            }
        }
        let last = self.events.len() - 1;
        self.events[last].set_time(end);
        true
    }

    /// Pulls the end-of-track back to the time of the last musical event.
    pub fn shrink_end_time(&mut self) {
        let end = self.last_event_time();
        let last = self.events.len() - 1;
        self.events[last].set_time(end);
    }

    /// The time of the last event before the end-of-track, or 0 for an empty track.
    pub fn last_event_time(&self) -> MidiClockTime {
        if self.events.len() > 1 {
            self.events[self.events.len() - 2].time()
        } else {
            0
        }
    }

    /// Rewrites the channel of every channel event in the track.
    pub fn set_channel(&mut self, channel: u8) {
        for ev in &mut self.events {
            if ev.is_channel_msg() {
                ev.set_channel(channel);
            }
        }
    }

    /// The channel of a [`TrackKind::Chan`] or [`TrackKind::IrregChan`] track.
    pub fn channel(&self) -> Option<u8> {
        match self.kind() {
            TrackKind::Chan(ch) | TrackKind::IrregChan(ch) => Some(ch),
            _ => None,
        }
    }

    /// Classifies the contents of the track. This is a full scan, computed on demand.
    pub fn kind(&self) -> TrackKind {
        let mut main_meta = false;
        let mut text_meta = false;
        let mut other = false;
        let mut channels = [false; 16];
        let mut plain_sysex = false;
        let mut reset_sysex = false;
        for ev in &self.events {
            if ev.is_end_of_track() {
                continue;
            }
            if ev.is_channel_msg() {
                channels[ev.channel() as usize] = true;
            } else if ev.is_tempo() || ev.is_time_sig() || ev.is_key_sig() || ev.is_marker_text()
                || ev.is_smpte_offset()
            {
                main_meta = true;
            } else if ev.is_text_event() {
                text_meta = true;
            } else if ev.is_sysex() {
                let payload = ev.payload().unwrap_or(&[]);
                if payload == GM_RESET || payload == GS_RESET || payload == XG_RESET {
                    reset_sysex = true;
                } else {
                    plain_sysex = true;
                }
            } else if !ev.is_meta_event() {
                other = true;
            }
        }
        let chan_count = channels.iter().filter(|&&c| c).count();
        match chan_count {
            0 => {
                if plain_sysex || reset_sysex {
                    match (plain_sysex, reset_sysex) {
                        (true, true) => TrackKind::BothSysex,
                        (true, false) => TrackKind::Sysex,
                        _ => TrackKind::ResetSysex,
                    }
                } else if other {
                    TrackKind::Unknown
                } else if main_meta {
                    TrackKind::Main
                } else if text_meta {
                    TrackKind::Text
                } else if self.is_empty() {
                    TrackKind::Empty
                } else {
                    TrackKind::Unknown
                }
            }
            1 => {
                let ch = channels.iter().position(|&c| c).unwrap_or(0) as u8;
                if main_meta {
                    TrackKind::IrregChan(ch)
                } else {
                    TrackKind::Chan(ch)
                }
            }
            _ => TrackKind::MixedChan,
        }
    }

    // ------------------------------------------------------------------------------------------
    // searching
    // ------------------------------------------------------------------------------------------

    /// Binary search (deferred detection) for the first event with time ≥ `time`. Returns `None`
    /// when `time` is past the end of the track; otherwise the index and whether an event with
    /// exactly that time exists.
    pub fn find_time(&self, time: MidiClockTime) -> Option<(usize, bool)> {
        if time > self.end_time() {
            return None;
        }
        let index = self.lower_bound(time);
        Some((index, self.events[index].time() == time))
    }

    /// The index of the first event with time ≥ `time`. The end-of-track event guarantees a hit
    /// for any `time` ≤ the end time.
    fn lower_bound(&self, time: MidiClockTime) -> usize {
        let mut min = 0usize;
        let mut max = self.events.len() - 1;
        while min < max {
            let mid = min + (max - min) / 2;
            if self.events[mid].time() < time {
                min = mid + 1;
            } else {
                max = mid;
            }
        }
        min
    }

    /// Finds the index of an event matching `msg` under the given [`FindMode`]: the search lands
    /// on the first event with the message's time, then scans while times are equal.
    pub fn find_event_number(&self, msg: &TimedMessage, mode: FindMode) -> Option<usize> {
        let (mut index, exact) = self.find_time(msg.time())?;
        if !exact {
            return None;
        }
        if mode == FindMode::Time {
            return Some(index);
        }
        while index < self.events.len() && self.events[index].time() == msg.time() {
            let found = match mode {
                FindMode::Equal => self.events[index] == *msg,
                FindMode::SameKind => is_same_kind(&self.events[index], msg),
                FindMode::Time => unreachable!(),
            };
            if found {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// The tick distance from a note on to its matching note off (same channel and note, first
    /// note off after the note on). Returns `TIME_INFINITE` when the note is never released,
    /// `None` when `msg` is not a note on found in the track.
    pub fn note_length(&self, msg: &TimedMessage) -> Option<MidiClockTime> {
        if !msg.is_note_on() {
            return None;
        }
        let start = self.find_event_number(msg, FindMode::Equal)?;
        for ev in &self.events[start + 1..] {
            if ev.is_note_off() && ev.channel() == msg.channel() && ev.note() == msg.note() {
                return Some(ev.time() - msg.time());
            }
        }
        Some(TIME_INFINITE)
    }

    // ------------------------------------------------------------------------------------------
    // inserting and deleting
    // ------------------------------------------------------------------------------------------

    /// Appends an event without the temporal check, advancing the end-of-track if needed. The
    /// file loader uses this because it already feeds events in order; inserting out-of-order
    /// events through here breaks the track invariants.
    pub fn push_event(&mut self, msg: TimedMessage) {
        if msg.is_end_of_track() || msg.is_internal() {
            return;
        }
        if msg.time() > self.end_time() {
            let last = self.events.len() - 1;
            self.events[last].set_time(msg.time());
        }
        let last = self.events.len() - 1;
        self.events.insert(last, msg);
    }

    /// Inserts an event keeping the track ordered, applying `mode` (or the track default) for
    /// same-kind events at the same time. The end-of-track is advanced when the event lies past
    /// it. Returns `false` without mutating when the insert is rejected: end-of-track events
    /// and internal sentinels cannot be inserted, and [`InsertMode::Replace`] fails when there
    /// is nothing to replace.
    pub fn insert_event(&mut self, msg: TimedMessage, mode: Option<InsertMode>) -> bool {
        if msg.is_end_of_track() || msg.is_internal() {
            return false;
        }
        let mode = mode.unwrap_or(self.default_insert_mode);
        if msg.time() > self.end_time() {
            let last = self.events.len() - 1;
            self.events[last].set_time(msg.time());
        }
        let start = self.lower_bound(msg.time());
        match mode {
            InsertMode::Insert => {
                self.insert_sorted(start, msg);
                true
            }
            InsertMode::Replace => match self.scan_same_kind(start, &msg) {
                Some(found) => {
                    self.events[found] = msg;
                    true
                }
                None => false,
            },
            InsertMode::InsertOrReplace | InsertMode::InsertOrReplaceButNote => {
                let replaceable = mode == InsertMode::InsertOrReplace || !msg.is_note();
                match self.scan_same_kind(start, &msg) {
                    Some(found) if replaceable => {
                        self.events[found] = msg;
                        true
                    }
                    _ => {
                        self.insert_sorted(start, msg);
                        true
                    }
                }
            }
        }
    }

    fn insert_sorted(&mut self, mut index: usize, msg: TimedMessage) {
        while index < self.events.len()
            && compare_for_insert(&msg, &self.events[index]) == Ordering::Greater
        {
            index += 1;
        }
        self.events.insert(index, msg);
    }

    fn scan_same_kind(&self, mut index: usize, msg: &TimedMessage) -> Option<usize> {
        while index < self.events.len() && self.events[index].time() == msg.time() {
            if is_same_kind(&self.events[index], msg) {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// Inserts a note on together with its note off at `msg.time() + length`. In the replace
    /// modes, an existing note on of the same kind is removed first, along with its matching
    /// note off.
    pub fn insert_note(
        &mut self,
        msg: TimedMessage,
        length: MidiClockTime,
        mode: Option<InsertMode>,
    ) -> bool {
        if !msg.is_note_on() {
            return false;
        }
        let mut off = msg.clone();
        off.set_note_off(msg.channel(), msg.note(), 0);
        off.set_time(msg.time() + length);

        let mode = mode.unwrap_or(self.default_insert_mode);
        match mode {
            InsertMode::Insert | InsertMode::InsertOrReplaceButNote => {
                self.insert_event(msg, Some(InsertMode::Insert));
                self.insert_event(off, Some(InsertMode::Insert));
                true
            }
            InsertMode::Replace | InsertMode::InsertOrReplace => {
                let found = self.find_event_number(&msg, FindMode::SameKind);
                if let Some(index) = found {
                    let old = self.events.remove(index);
                    let mut scan = index;
                    while scan < self.events.len() {
                        let ev = &self.events[scan];
                        if ev.is_note_off()
                            && ev.channel() == old.channel()
                            && ev.note() == old.note()
                        {
                            self.events.remove(scan);
                            break;
                        }
                        scan += 1;
                    }
                } else if mode == InsertMode::Replace {
                    return false;
                }
                self.insert_event(msg, Some(InsertMode::Insert));
                self.insert_event(off, Some(InsertMode::Insert));
                true
            }
        }
    }

    /// Deletes an exact match of `msg` (bitwise, including payload). Refuses to delete the
    /// end-of-track.
    pub fn delete_event(&mut self, msg: &TimedMessage) -> bool {
        if msg.is_end_of_track() {
            return false;
        }
        match self.find_event_number(msg, FindMode::Equal) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Deletes a note on and its matching note off.
    pub fn delete_note(&mut self, msg: &TimedMessage) -> bool {
        if !msg.is_note_on() {
            return false;
        }
        match self.find_event_number(msg, FindMode::Equal) {
            Some(index) => {
                self.events.remove(index);
                let mut scan = index;
                while scan < self.events.len() {
                    let ev = &self.events[scan];
                    if ev.is_note_off() && ev.channel() == msg.channel() && ev.note() == msg.note()
                    {
                        self.events.remove(scan);
                        break;
                    }
                    scan += 1;
                }
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------------------------
    // interval edits
    // ------------------------------------------------------------------------------------------

    /// Truncates everything sounding across tick `t`: sounding notes get their note off moved to
    /// `t`, a held pedal gets its release moved to `t`, and a non-zero pitch bend is zeroed at
    /// `t` (subsequent bend messages up to and including the next bend-zero are removed).
    /// Events with time exactly `t` are untouched.
    pub fn close_open_events(&mut self, t: MidiClockTime) {
        if t == 0 || t >= self.end_time() {
            return;
        }

        // state strictly before t
        let mut matrix = NoteMatrix::new();
        let mut bender = [0i16; 16];
        for ev in &self.events {
            if ev.time() >= t {
                break;
            }
            matrix.process(ev);
            if ev.is_pitch_bend() {
                bender[ev.channel() as usize] = ev.bender_value();
            }
        }

        let sounding: Vec<(u8, u8)> = (0u8..16)
            .flat_map(|ch| {
                matrix
                    .sounding_notes(ch)
                    .map(move |(note, _)| (ch, note))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (ch, note) in sounding {
            let mut closed_at_t = false;
            let mut pending: Option<usize> = None;
            for (i, ev) in self.events.iter().enumerate() {
                if ev.time() < t {
                    continue;
                }
                if ev.is_note_off() && ev.channel() == ch && ev.note() == note {
                    if ev.time() == t {
                        closed_at_t = true;
                    } else {
                        pending = Some(i);
                    }
                    break;
                }
            }
            if closed_at_t {
                continue;
            }
            if let Some(index) = pending {
                self.events.remove(index);
            }
            let off = TimedMessage::new(t, Message::note_off(ch, note, 0));
            self.insert_event(off, Some(InsertMode::Insert));
        }

        for ch in 0..16u8 {
            if !matrix.hold_pedal(ch) {
                continue;
            }
            let mut released_at_t = false;
            let mut pending: Option<usize> = None;
            for (i, ev) in self.events.iter().enumerate() {
                if ev.time() < t {
                    continue;
                }
                if ev.is_pedal_off() && ev.channel() == ch {
                    if ev.time() == t {
                        released_at_t = true;
                    } else {
                        pending = Some(i);
                    }
                    break;
                }
            }
            if released_at_t {
                continue;
            }
            if let Some(index) = pending {
                self.events.remove(index);
            }
            let off = TimedMessage::new(t, Message::control_change(ch, 0x40, 0));
            self.insert_event(off, Some(InsertMode::Insert));
        }

        for ch in 0..16u8 {
            if bender[ch as usize] == 0 {
                continue;
            }
            let mut index = self.lower_bound(t);
            while index < self.events.len() {
                let ev = &self.events[index];
                if ev.is_pitch_bend() && ev.channel() == ch {
                    let value = ev.bender_value();
                    self.events.remove(index);
                    if value == 0 {
                        break;
                    }
                } else {
                    index += 1;
                }
            }
            let zero = TimedMessage::new(t, Message::pitch_bend(ch, 0));
            self.insert_event(zero, Some(InsertMode::Insert));
        }
    }

    /// Makes room for `length` ticks at `start`, shifting every event at or after `start`, then
    /// overlays a copy of `src` (translated by `start`). Open events are closed at both edges.
    pub fn insert_interval(&mut self, start: MidiClockTime, length: MidiClockTime, src: Option<&Track>) {
        if length == 0 {
            return;
        }
        self.close_open_events(start);
        if let Some((index, _)) = self.find_time(start) {
            for ev in &mut self.events[index..] {
                ev.add_time(length);
            }
        }
        if let Some(src) = src {
            for ev in src.events() {
                if ev.is_end_of_track() {
                    continue;
                }
                if ev.time() >= length {
                    break;
                }
                let mut msg = ev.clone();
                msg.add_time(start);
                self.insert_event(msg, None);
            }
        }
        self.close_open_events(start + length);
    }

    /// A deep copy of the events in `[start, end)` translated to origin 0, with open events
    /// closed at both edges. Zero-length artifacts are excluded: note offs, pedal offs and
    /// bend-zeros sitting exactly at `start`, and note ons, pedal ons and non-zero bends
    /// sitting exactly at `end`.
    pub fn make_interval(&self, start: MidiClockTime, end: MidiClockTime) -> Track {
        let mut interval = Track::new();
        let end = end.min(self.end_time());
        if end <= start {
            return interval;
        }
        interval.set_end_time(end - start);

        let mut work = self.clone();
        work.close_open_events(start);
        work.close_open_events(end);

        for ev in work.events() {
            if ev.is_end_of_track() || ev.time() < start {
                continue;
            }
            if ev.time() > end {
                break;
            }
            if ev.time() == start
                && (ev.is_note_off()
                    || ev.is_pedal_off()
                    || (ev.is_pitch_bend() && ev.bender_value() == 0))
            {
                continue;
            }
            if ev.time() == end
                && (ev.is_note_on()
                    || ev.is_pedal_on()
                    || (ev.is_pitch_bend() && ev.bender_value() != 0))
            {
                continue;
            }
            let mut msg = ev.clone();
            msg.sub_time(start);
            interval.insert_event(msg, Some(InsertMode::Insert));
        }
        interval
    }

    /// Removes the events in `[start, end)` and closes the gap, shifting later events earlier by
    /// `end - start`.
    pub fn delete_interval(&mut self, start: MidiClockTime, end: MidiClockTime) {
        let end = end.min(self.end_time());
        if end <= start {
            return;
        }
        self.clear_interval(start, end);
        let index = self.lower_bound(end);
        for ev in &mut self.events[index..] {
            ev.sub_time(end - start);
        }
    }

    /// Removes the events in `[start, end)` leaving the gap in place. Open events are closed at
    /// both edges; note offs, pedal offs and bend-zeros sitting exactly at `end` are removed
    /// too.
    pub fn clear_interval(&mut self, start: MidiClockTime, end: MidiClockTime) {
        let end = end.min(self.end_time());
        if end <= start {
            return;
        }
        self.close_open_events(start);
        self.close_open_events(end);

        let mut index = self.lower_bound(start);
        while index < self.events.len()
            && self.events[index].time() == start
            && (self.events[index].is_note_off()
                || self.events[index].is_pedal_off()
                || (self.events[index].is_pitch_bend()
                    && self.events[index].bender_value() == 0))
        {
            index += 1;
        }
        while index < self.events.len() && self.events[index].time() < end {
            self.events.remove(index);
        }
        while index < self.events.len()
            && self.events[index].time() == end
            && !self.events[index].is_end_of_track()
        {
            let ev = &self.events[index];
            if ev.is_note_off()
                || ev.is_pedal_off()
                || (ev.is_pitch_bend() && ev.bender_value() == 0)
            {
                self.events.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Replaces the events in `[start, start + length)` with a translated copy of `src`.
    pub fn replace_interval(&mut self, start: MidiClockTime, length: MidiClockTime, src: &Track) {
        if length == 0 {
            return;
        }
        self.clear_interval(start, start + length);
        for ev in src.events() {
            if ev.is_end_of_track() {
                continue;
            }
            if ev.time() >= length {
                break;
            }
            let mut msg = ev.clone();
            msg.add_time(start);
            self.insert_event(msg, None);
        }
        self.close_open_events(start + length);
    }

    /// Asserts invariants 1-3 hold; only used by tests and debug assertions.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert!(!self.events.is_empty());
        assert!(self.events.last().unwrap().is_end_of_track());
        for pair in self.events.windows(2) {
            assert!(pair[0].time() <= pair[1].time());
            if pair[0].time() == pair[1].time() {
                assert_ne!(
                    Ordering::Greater,
                    compare_for_insert(&pair[0], &pair[1]),
                    "events out of compare_for_insert order: {} / {}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for ev in &self.events {
            writeln!(f, "{}", ev)?;
        }
        Ok(())
    }
}
