/*!
The `notifier` module carries sequencer happenings to a host application: a GUI refreshing its
transport display, a console front end printing a line, etc. The sequencer calls
[`Notifier::notify`] from the tick thread, so implementations must never block; they queue or
post to their own event loop as needed.
!*/

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::sync::Mutex;

/// What changed in the conductor (master track) state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConductorItem {
    Tempo,
    TimeSig,
    KeySig,
    Marker,
}

/// What happened to the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportItem {
    Start,
    Stop,
    /// A new measure began.
    Measure,
    /// A beat boundary passed.
    Beat,
    /// A count-in started.
    CountIn,
}

/// What changed in a track's state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TrackItem {
    /// The track got its name.
    Name,
    Program,
    Note,
    Volume,
    Pan,
    /// Chorus depth.
    Chorus,
    /// Reverb depth.
    Reverb,
}

/// What happened to a recorder. Recording itself is outside this library; the envelope slot is
/// here for hosts that implement one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecorderItem {
    Reset,
    Start,
    Stop,
}

/// The envelope handed to a [`Notifier`]: a (group, subgroup, item) triple.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NotifierEvent {
    /// Everything may have changed; the host should refresh completely.
    All,
    /// A conductor (tempo, time signature, key signature, marker) change.
    Conductor(ConductorItem),
    /// A transport change.
    Transport(TransportItem),
    /// A change of one track's state.
    Track {
        /// The track index.
        track: usize,
        item: TrackItem,
    },
    /// A recorder change.
    Recorder(RecorderItem),
    /// A host-defined event.
    User {
        subgroup: u16,
        item: u16,
    },
}

impl Display for NotifierEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierEvent::All => write!(f, "GUI refresh"),
            NotifierEvent::Conductor(item) => write!(f, "conductor {:?}", item),
            NotifierEvent::Transport(item) => write!(f, "transport {:?}", item),
            NotifierEvent::Track { track, item } => write!(f, "track {} {:?}", track, item),
            NotifierEvent::Recorder(item) => write!(f, "recorder {:?}", item),
            NotifierEvent::User { subgroup, item } => write!(f, "user {} {}", subgroup, item),
        }
    }
}

/// The capability the sequencer needs for telling a host what happened. `notify` runs on the
/// tick thread and must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotifierEvent);

    /// Implementations with an on/off switch can override this; the sequencer skips `notify`
    /// calls while it returns `false`.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// A notifier that prints one line per event, for console front ends and tests. Defaults to
/// standard output.
pub struct TextNotifier<W: Write + Send> {
    out: Mutex<W>,
}

impl Default for TextNotifier<std::io::Stdout> {
    fn default() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TextNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> Notifier for TextNotifier<W> {
    fn notify(&self, event: NotifierEvent) {
        if let Ok(mut out) = self.out.lock() {
            // a full pipe is the host's problem, never stall the tick thread
            let _ = writeln!(out, "{}", event);
        }
    }
}
