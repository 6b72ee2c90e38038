/*!
The `sequencer` module plays a [`MultiTrack`](crate::MultiTrack) through MIDI ports in real
time: per-track runtime state, the per-track processor settings (mute, solo, transpose…), the
tempo clock, seeking with state chase, and the tick-driven playback pump.
!*/

mod engine;
mod state;

pub use engine::{PlayMode, Rechannel, Sequencer, TrackProcessor, MEASURES_PER_WARP};
pub use state::{SequencerState, TrackState};
