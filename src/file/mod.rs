/*!
The `file` module is for types and concepts strictly related to MIDI *files*: the chunked
container format, its header, and the codec between Standard MIDI Files and the in-memory
[`MultiTrack`](crate::MultiTrack).
!*/

mod encoder;
mod header;
mod reader;
mod writer;

pub use header::{Division, Format, Header};
pub use reader::{load, read};
pub use writer::{save, write, NoteOffWriteMode, WriteSettings};
