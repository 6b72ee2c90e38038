/*!
The `multi_track` module provides the [`MultiTrack`], an ordered collection of [`Track`]s sharing
a ticks-per-beat resolution, and the [`MultiTrackIterator`], a merge-sorted time-ordered stream
over all of a multitrack's events.
!*/

use crate::core::constants::DEFAULT_CLOCKS_PER_BEAT;
use crate::core::{MidiClockTime, TimedMessage};
use crate::track::{InsertMode, Track};
use std::fmt::{Display, Formatter};

/// An ordered collection of tracks sharing a ticks-per-beat resolution. By convention track 0 is
/// the "master" track, holding tempo, time signature, key signature and markers.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MultiTrack {
    tracks: Vec<Track>,
    clocks_per_beat: u16,
}

impl Default for MultiTrack {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MultiTrack {
    /// A multitrack with `num_tracks` empty tracks and the default 120 ticks per beat.
    pub fn new(num_tracks: usize) -> Self {
        Self::with_clocks_per_beat(num_tracks, DEFAULT_CLOCKS_PER_BEAT)
    }

    pub fn with_clocks_per_beat(num_tracks: usize, clocks_per_beat: u16) -> Self {
        Self {
            tracks: vec![Track::new(); num_tracks],
            clocks_per_beat: clocks_per_beat.max(1),
        }
    }

    /// The number of MIDI ticks in a quarter note.
    pub fn clocks_per_beat(&self) -> u16 {
        self.clocks_per_beat
    }

    pub fn set_clocks_per_beat(&mut self, clocks_per_beat: u16) {
        self.clocks_per_beat = clocks_per_beat.max(1);
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// The number of tracks holding at least one musical event.
    pub fn num_tracks_with_events(&self) -> usize {
        self.tracks.iter().filter(|t| !t.is_empty()).count()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Iterator over the tracks in index order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// The largest end-of-track time across all tracks.
    pub fn end_time(&self) -> MidiClockTime {
        self.tracks
            .iter()
            .map(Track::end_time)
            .max()
            .unwrap_or_default()
    }

    /// Sets the default insertion policy of every track.
    pub fn set_default_insert_mode(&mut self, mode: InsertMode) {
        for track in &mut self.tracks {
            track.set_default_insert_mode(mode);
        }
    }

    /// Removes all tracks.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Empties every track, keeping the track count; when `keep_end` is set the end-of-track
    /// times are preserved.
    pub fn clear_tracks(&mut self, keep_end: bool) {
        for track in &mut self.tracks {
            let end = track.end_time();
            track.clear();
            if keep_end {
                track.set_end_time(end);
            }
        }
    }

    /// Inserts an empty track at `index` (or appends with `None`). Fails when `index` is out of
    /// range.
    pub fn insert_track(&mut self, index: Option<usize>) -> bool {
        let at = index.unwrap_or(self.tracks.len());
        if at > self.tracks.len() {
            return false;
        }
        self.tracks.insert(at, Track::new());
        true
    }

    /// Removes the track at `index`.
    pub fn delete_track(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        self.tracks.remove(index);
        true
    }

    /// Moves the track at `from` so that it ends up at index `to`.
    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return false;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        true
    }

    // ------------------------------------------------------------------------------------------
    // rectangle edits: a time range crossed with a track range
    // ------------------------------------------------------------------------------------------

    /// Copies `[start, end)` of tracks `[track_start, track_end)` into a new multitrack whose
    /// tracks are translated to origin 0.
    pub fn edit_copy(
        &self,
        start: MidiClockTime,
        end: MidiClockTime,
        track_start: usize,
        track_end: usize,
    ) -> MultiTrack {
        let track_end = track_end.min(self.tracks.len());
        let mut copy = MultiTrack::with_clocks_per_beat(0, self.clocks_per_beat);
        for index in track_start..track_end {
            copy.tracks.push(self.tracks[index].make_interval(start, end));
        }
        copy
    }

    /// Copies then deletes `[start, end)` of tracks `[track_start, track_end)`; later events in
    /// the affected tracks shift earlier.
    pub fn edit_cut(
        &mut self,
        start: MidiClockTime,
        end: MidiClockTime,
        track_start: usize,
        track_end: usize,
    ) -> MultiTrack {
        let copy = self.edit_copy(start, end, track_start, track_end);
        let track_end = track_end.min(self.tracks.len());
        for index in track_start..track_end {
            self.tracks[index].delete_interval(start, end);
        }
        copy
    }

    /// Erases `[start, end)` of tracks `[track_start, track_end)` leaving the gap in place.
    pub fn edit_clear(
        &mut self,
        start: MidiClockTime,
        end: MidiClockTime,
        track_start: usize,
        track_end: usize,
    ) {
        let track_end = track_end.min(self.tracks.len());
        for index in track_start..track_end {
            self.tracks[index].clear_interval(start, end);
        }
    }

    /// Opens a `length`-tick gap at `start` in tracks `[track_start, track_end)` and overlays
    /// the matching tracks of `src` (when given): source track 0 lands on `track_start` and so
    /// on.
    pub fn edit_insert(
        &mut self,
        start: MidiClockTime,
        length: MidiClockTime,
        track_start: usize,
        track_end: usize,
        src: Option<&MultiTrack>,
    ) {
        let track_end = track_end.min(self.tracks.len());
        for index in track_start..track_end {
            let src_track = src.and_then(|s| s.track(index - track_start));
            self.tracks[index].insert_interval(start, length, src_track);
        }
    }

    /// Replaces `[start, start + length)` in tracks `[track_start, track_end)` with the matching
    /// tracks of `src`.
    pub fn edit_replace(
        &mut self,
        start: MidiClockTime,
        length: MidiClockTime,
        track_start: usize,
        track_end: usize,
        src: &MultiTrack,
    ) {
        let track_end = track_end.min(self.tracks.len());
        for index in track_start..track_end {
            if let Some(src_track) = src.track(index - track_start) {
                self.tracks[index].replace_interval(start, length, src_track);
            }
        }
    }

    /// An iterator over all events of all tracks, in time order.
    pub fn iter(&self) -> MultiTrackIterator<'_> {
        MultiTrackIterator::new(self)
    }
}

impl Display for MultiTrack {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, track) in self.tracks.iter().enumerate() {
            writeln!(f, "track {} ({} events)", index, track.len())?;
            Display::fmt(track, f)?;
        }
        Ok(())
    }
}

/// The detachable position of a [`MultiTrackIterator`]: the index of the next unvisited event on
/// each track, and which track owns the current (least-time) event. Sequencer state snapshots
/// store one of these, so a seek can resume a replay without raw references into the tracks.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct MultiTrackIterState {
    next_event: Vec<usize>,
    cur_track: Option<usize>,
}

impl MultiTrackIterState {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            next_event: vec![0; num_tracks],
            cur_track: None,
        }
    }

    /// The track owning the current event, if any event remains.
    pub fn cur_event_track(&self) -> Option<usize> {
        self.cur_track
    }

    /// Resets all per-track positions to the first event with time ≥ `time`.
    pub fn go_to_time(&mut self, multi_track: &MultiTrack, time: MidiClockTime) {
        self.next_event.clear();
        self.next_event.resize(multi_track.num_tracks(), 0);
        for (index, track) in multi_track.tracks().enumerate() {
            self.next_event[index] = match track.find_time(time) {
                Some((event, _)) => event,
                None => track.len(),
            };
        }
        self.select_min(multi_track);
    }

    /// The time of the current event.
    pub fn cur_event_time(&self, multi_track: &MultiTrack) -> Option<MidiClockTime> {
        let track = self.cur_track?;
        let event = self.next_event[track];
        multi_track.track(track)?.event(event).map(TimedMessage::time)
    }

    /// The current event and the track it lives on.
    pub fn cur_event<'a>(
        &self,
        multi_track: &'a MultiTrack,
    ) -> Option<(usize, &'a TimedMessage)> {
        let track = self.cur_track?;
        let event = self.next_event[track];
        multi_track.track(track)?.event(event).map(|msg| (track, msg))
    }

    /// Consumes the current event and re-selects the next least-time track. Returns `false` when
    /// all tracks are exhausted.
    pub fn advance(&mut self, multi_track: &MultiTrack) -> bool {
        let track = match self.cur_track {
            Some(track) => track,
            None => return false,
        };
        self.next_event[track] += 1;
        self.select_min(multi_track);
        self.cur_track.is_some()
    }

    /// Skips to the next event of one track without visiting the other tracks.
    pub fn advance_on_track(&mut self, multi_track: &MultiTrack, track: usize) -> bool {
        if track >= self.next_event.len() {
            return false;
        }
        let len = match multi_track.track(track) {
            Some(t) => t.len(),
            None => return false,
        };
        if self.next_event[track] >= len {
            return false;
        }
        self.next_event[track] += 1;
        self.select_min(multi_track);
        true
    }

    /// Picks the track whose next event has the least time; ties break toward the lower track
    /// index. O(number of tracks), which stays cheap for the handful of tracks in a song.
    fn select_min(&mut self, multi_track: &MultiTrack) {
        let mut best: Option<(usize, MidiClockTime)> = None;
        for (track, &event) in self.next_event.iter().enumerate() {
            let time = match multi_track.track(track).and_then(|t| t.event(event)) {
                Some(msg) => msg.time(),
                None => continue,
            };
            match best {
                Some((_, best_time)) if best_time <= time => {}
                _ => best = Some((track, time)),
            }
        }
        self.cur_track = best.map(|(track, _)| track);
    }
}

/// A merge-sorted, time-ordered iterator over all events of a [`MultiTrack`]. At equal times,
/// events come out in ascending track index order.
pub struct MultiTrackIterator<'a> {
    multi_track: &'a MultiTrack,
    state: MultiTrackIterState,
}

impl<'a> MultiTrackIterator<'a> {
    pub fn new(multi_track: &'a MultiTrack) -> Self {
        let mut state = MultiTrackIterState::new(multi_track.num_tracks());
        state.go_to_time(multi_track, 0);
        Self { multi_track, state }
    }

    /// The multitrack being iterated.
    pub fn multi_track(&self) -> &'a MultiTrack {
        self.multi_track
    }

    /// The detachable iterator position.
    pub fn state(&self) -> &MultiTrackIterState {
        &self.state
    }

    pub fn set_state(&mut self, state: MultiTrackIterState) {
        self.state = state;
    }

    /// Resets per-track positions to the first event with time ≥ `time`.
    pub fn go_to_time(&mut self, time: MidiClockTime) {
        self.state.go_to_time(self.multi_track, time);
    }

    /// The time of the current event.
    pub fn cur_event_time(&self) -> Option<MidiClockTime> {
        self.state.cur_event_time(self.multi_track)
    }

    /// The current event and its track index.
    pub fn cur_event(&self) -> Option<(usize, &'a TimedMessage)> {
        self.state.cur_event(self.multi_track)
    }

    /// Consumes the current event. Returns `false` when the multitrack is exhausted.
    pub fn advance(&mut self) -> bool {
        self.state.advance(self.multi_track)
    }

    /// Skips to the next event of `track` without visiting other tracks.
    pub fn advance_on_track(&mut self, track: usize) -> bool {
        self.state.advance_on_track(self.multi_track, track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;
    use crate::track::InsertMode;

    fn note_on(time: MidiClockTime, ch: u8, note: u8) -> TimedMessage {
        TimedMessage::new(time, Message::note_on(ch, note, 100))
    }

    #[test]
    fn track_management() {
        let mut multi = MultiTrack::new(2);
        assert_eq!(2, multi.num_tracks());
        assert!(multi.insert_track(Some(1)));
        assert_eq!(3, multi.num_tracks());
        assert!(multi.delete_track(2));
        assert!(!multi.delete_track(7));
        assert_eq!(2, multi.num_tracks());

        multi
            .track_mut(1)
            .unwrap()
            .insert_event(note_on(0, 0, 60), None);
        assert!(multi.move_track(1, 0));
        assert!(!multi.track(0).unwrap().is_empty());
        assert_eq!(1, multi.num_tracks_with_events());
    }

    #[test]
    fn end_time_is_max_of_tracks() {
        let mut multi = MultiTrack::new(2);
        multi.track_mut(0).unwrap().set_end_time(100);
        multi.track_mut(1).unwrap().set_end_time(400);
        assert_eq!(400, multi.end_time());
    }

    #[test]
    fn iterator_merges_in_time_order() {
        let mut multi = MultiTrack::new(2);
        multi
            .track_mut(0)
            .unwrap()
            .insert_event(note_on(100, 0, 60), None);
        multi
            .track_mut(1)
            .unwrap()
            .insert_event(note_on(50, 1, 62), None);
        let mut times = Vec::new();
        let mut iter = multi.iter();
        while let Some((_, msg)) = iter.cur_event() {
            times.push(msg.time());
            if !iter.advance() {
                break;
            }
        }
        // track 1's note and end-of-track at 50, then track 0's pair at 100
        assert_eq!(vec![50, 50, 100, 100], times);
    }

    #[test]
    fn iterator_breaks_ties_by_track_index() {
        // both tracks hold a note on at the same time; track order decides
        let mut multi = MultiTrack::new(2);
        multi
            .track_mut(0)
            .unwrap()
            .insert_event(note_on(100, 0, 60), None);
        multi
            .track_mut(1)
            .unwrap()
            .insert_event(note_on(100, 1, 60), None);
        let mut iter = multi.iter();
        let mut note_tracks = Vec::new();
        while let Some((track, msg)) = iter.cur_event() {
            if msg.is_note_on() {
                note_tracks.push((track, msg.channel()));
            }
            if !iter.advance() {
                break;
            }
        }
        assert_eq!(vec![(0, 0), (1, 1)], note_tracks);
    }

    #[test]
    fn go_to_time_skips_earlier_events() {
        let mut multi = MultiTrack::new(1);
        multi
            .track_mut(0)
            .unwrap()
            .insert_event(note_on(0, 0, 60), None);
        multi
            .track_mut(0)
            .unwrap()
            .insert_event(note_on(100, 0, 62), Some(InsertMode::Insert));
        let mut iter = multi.iter();
        iter.go_to_time(50);
        let (_, msg) = iter.cur_event().unwrap();
        assert_eq!(100, msg.time());
        assert_eq!(62, msg.note());
    }

    #[test]
    fn advance_on_track_ignores_other_tracks() {
        let mut multi = MultiTrack::new(2);
        multi
            .track_mut(0)
            .unwrap()
            .insert_event(note_on(0, 0, 60), None);
        multi
            .track_mut(1)
            .unwrap()
            .insert_event(note_on(10, 1, 62), None);
        let mut iter = multi.iter();
        assert!(iter.advance_on_track(1));
        // track 1 is now past its note; the current event is still track 0's note
        let (track, msg) = iter.cur_event().unwrap();
        assert_eq!(0, track);
        assert_eq!(60, msg.note());
    }

    #[test]
    fn edit_copy_and_replace() {
        let mut multi = MultiTrack::new(2);
        multi
            .track_mut(1)
            .unwrap()
            .insert_note(note_on(100, 1, 60), 50, None);
        multi.track_mut(1).unwrap().set_end_time(400);

        let copy = multi.edit_copy(100, 200, 1, 2);
        assert_eq!(1, copy.num_tracks());
        assert_eq!(
            1,
            copy.track(0)
                .unwrap()
                .events()
                .filter(|e| e.is_note_on())
                .count()
        );

        let mut dest = MultiTrack::new(1);
        dest.track_mut(0).unwrap().set_end_time(400);
        dest.edit_replace(200, 100, 0, 1, &copy);
        let on = dest
            .track(0)
            .unwrap()
            .events()
            .find(|e| e.is_note_on())
            .unwrap();
        assert_eq!(200, on.time());
    }

    #[test]
    fn edit_cut_shifts_later_events() {
        let mut multi = MultiTrack::new(1);
        multi
            .track_mut(0)
            .unwrap()
            .insert_note(note_on(300, 0, 72), 50, None);
        multi.track_mut(0).unwrap().set_end_time(400);
        multi.edit_cut(0, 100, 0, 1);
        let on = multi
            .track(0)
            .unwrap()
            .events()
            .find(|e| e.is_note_on())
            .unwrap();
        assert_eq!(200, on.time());
        assert_eq!(300, multi.track(0).unwrap().end_time());
    }

    #[test]
    fn edit_clear_keeps_gap() {
        let mut multi = MultiTrack::new(1);
        multi
            .track_mut(0)
            .unwrap()
            .insert_note(note_on(100, 0, 72), 50, None);
        multi.track_mut(0).unwrap().set_end_time(400);
        multi.edit_clear(0, 200, 0, 1);
        assert!(multi.track(0).unwrap().events().all(|e| !e.is_note()));
        assert_eq!(400, multi.track(0).unwrap().end_time());
    }
}
