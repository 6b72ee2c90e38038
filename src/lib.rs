/*!
A real-time MIDI sequencing library: load, edit and play back multi-track MIDI songs through
pluggable MIDI ports, with synchronization events delivered to the host application.

The pieces, bottom up:

- [`core`]: the [`Message`]/[`TimedMessage`] data model, the note matrix, and the constants and
  length tables of the MIDI protocol.
- [`Track`] and [`MultiTrack`]: ordered event sequences with editing operations that keep the
  track invariants, plus the merge-sorted [`MultiTrackIterator`].
- [`file`]: the Standard MIDI File codec (formats 0 and 1, running status, variable-length
  quantities).
- [`Sequencer`]: the playback engine with per-track mute/solo/transpose, tempo scaling, seeking
  with chase, and warp snapshots for fast jumps, driven by the [`TickScheduler`].
- [`driver`]: the [`driver::MidiPort`] capability for OS backends, output drivers with reliable
  all-notes-off, input drivers with a bounded queue, and MIDI thru.
- [`Notifier`]: the envelope and capability used to tell a GUI (or console) what happened.
- [`Smpte`]: conversions among sample counts, SMPTE times and milliseconds.

```
use midi_sequencer::{Message, MultiTrack, TimedMessage};

let mut song = MultiTrack::new(2);
song.track_mut(0)
    .unwrap()
    .insert_event(TimedMessage::new(0, Message::tempo(96.0)), None);
song.track_mut(1).unwrap().insert_note(
    TimedMessage::new(0, Message::note_on(0, 60, 100)),
    120,
    None,
);
let mut bytes = Vec::new();
midi_sequencer::file::write(&song, &Default::default(), &mut bytes).unwrap();
```
!*/

#[macro_use]
mod error;

mod byte_iter;
mod multi_track;
mod notifier;
mod processor;
mod scheduler;
mod sequencer;
mod smpte;
mod track;

pub mod core;
pub mod driver;
pub mod file;

pub use crate::core::{
    compare_for_insert, is_same_kind, Message, MidiClockTime, NoteMatrix, TimedMessage,
    TIME_INFINITE,
};
pub use error::{Error, Result};
pub use multi_track::{MultiTrack, MultiTrackIterState, MultiTrackIterator};
pub use notifier::{
    ConductorItem, Notifier, NotifierEvent, RecorderItem, TextNotifier, TrackItem, TransportItem,
};
pub use processor::{Printer, Processor, ProcessorChain, Rechannelizer, Transposer};
pub use scheduler::{TickComponent, TickHandle, TickPriority, TickScheduler};
pub use sequencer::{
    PlayMode, Rechannel, Sequencer, SequencerState, TrackProcessor, TrackState, MEASURES_PER_WARP,
};
pub use smpte::{SampleRate, Smpte, SmpteRate};
pub use track::{FindMode, InsertMode, Track, TrackKind};
