/*!
The `core` module is for types and concepts that are *not* strictly related to MIDI *files*.
These types and concepts are used for realtime MIDI as well.
!*/

pub mod constants;
mod matrix;
mod message;
pub(crate) mod vlq;

pub use matrix::NoteMatrix;
pub use message::{
    compare_for_insert, is_same_kind, Message, MidiClockTime, TimedMessage, TIME_INFINITE,
};
