/*!
The `driver` module is the port-agnostic boundary between the library and the operating system's
MIDI plumbing. Backends implement the [`MidiPort`] capability; the [`OutDriver`] adds reference
counted opening, busy-retry, note tracking and a reliable all-notes-off on top of an output
port, the [`InDriver`] adds filtering, MIDI thru and a bounded queue on top of an input port,
and the [`PortRegistry`] owns the lot and hands out shared driver handles.

Threading: `OutDriver` state is serialized by one mutex (the tick thread outputs, any thread may
call `all_notes_off`). The `InDriver` callback runs on whatever thread the backend chooses and
touches nothing but the mutex-guarded queue state.
!*/

use crate::core::constants::{C_DAMPER, MTC, RT_ACTIVE_SENSE};
use crate::core::{Message, NoteMatrix, TimedMessage};
use crate::error;
use crate::processor::Processor;
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How often [`OutDriver::output`] retries a busy port, sleeping 1 ms between attempts, before
/// dropping the message.
pub const MAX_RETRIES: u32 = 100;

/// The capacity of an input driver's queue. When it is full the oldest message is discarded.
pub const IN_QUEUE_CAPACITY: usize = 256;

/// What went wrong inside a port backend.
#[derive(Debug)]
pub enum PortError {
    /// The port cannot accept data right now; the caller may retry.
    Busy,
    /// A hard failure, described by the backend.
    Failed(String),
}

impl Display for PortError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PortError::Busy => write!(f, "port busy"),
            PortError::Failed(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for PortError {}

/// The callback an input port feeds: a millisecond timestamp and the raw bytes of one message.
pub type InputCallback = Box<dyn FnMut(u64, &[u8]) + Send>;

/// The capability the library requires of a MIDI port backend. Implementations wrap an OS API
/// (or a test double); they are enumerated and owned by a [`PortRegistry`].
pub trait MidiPort: Send {
    /// The port name shown to users.
    fn name(&self) -> String;

    fn open(&mut self) -> Result<(), PortError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Sends one complete wire message.
    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError>;

    /// Input backends deliver incoming bytes through this callback, from a thread of their
    /// choosing. Output-only backends can keep the default no-op.
    fn set_input_callback(&mut self, callback: InputCallback) {
        let _ = callback;
    }
}

struct OutShared {
    port: Box<dyn MidiPort>,
    open_count: u32,
    processor: Option<Box<dyn Processor>>,
    matrix: NoteMatrix,
    track_notes: bool,
    thru_channel: Option<u8>,
}

/// An output port wrapper. Many sequencers may share one driver: `open`/`close` are reference
/// counted, and all state is behind one lock so the tick thread and user threads interleave
/// safely.
pub struct OutDriver {
    id: usize,
    shared: Mutex<OutShared>,
}

impl OutDriver {
    pub fn new(id: usize, port: Box<dyn MidiPort>) -> Self {
        Self {
            id,
            shared: Mutex::new(OutShared {
                port,
                open_count: 0,
                processor: None,
                matrix: NoteMatrix::new(),
                track_notes: true,
                thru_channel: None,
            }),
        }
    }

    /// The registry id of the underlying port.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> String {
        self.lock().port.name()
    }

    fn lock(&self) -> MutexGuard<'_, OutShared> {
        self.shared.lock().expect("out driver poisoned")
    }

    /// Opens the port. Only the first of the nested opens touches the backend.
    pub fn open(&self) -> crate::Result<()> {
        let mut shared = self.lock();
        if shared.open_count == 0 {
            let name = shared.port.name();
            shared.port.open().map_err(|e| {
                error::PortSnafu {
                    port: name,
                    action: "open",
                    description: e.to_string(),
                }
                .build()
            })?;
            shared.matrix.clear();
            debug!("out port '{}' opened", shared.port.name());
        }
        shared.open_count += 1;
        Ok(())
    }

    /// Closes the port once every nested `open` has been matched.
    pub fn close(&self) {
        let mut shared = self.lock();
        match shared.open_count {
            0 => warn!("close of an out port that is not open"),
            1 => {
                shared.open_count = 0;
                shared.port.close();
                debug!("out port '{}' closed", shared.port.name());
            }
            _ => shared.open_count -= 1,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().open_count > 0
    }

    /// Whether `all_notes_off` sends explicit note offs from the note matrix rather than a
    /// single "all notes off" control change.
    pub fn set_note_tracking(&self, enabled: bool) {
        let mut shared = self.lock();
        shared.track_notes = enabled;
        if !enabled {
            shared.matrix.clear();
        }
    }

    /// Installs (or removes) a processor applied to every outgoing message.
    pub fn set_processor(&self, processor: Option<Box<dyn Processor>>) {
        self.lock().processor = processor;
    }

    /// The channel incoming thru messages are redirected to; `None` is omni (keep the original
    /// channel).
    pub fn set_thru_channel(&self, channel: Option<u8>) {
        self.lock().thru_channel = channel.map(|c| c & 0x0f);
    }

    /// Sends one message: through the out-processor, into the note matrix, then onto the wire.
    /// A busy port is retried for up to [`MAX_RETRIES`] milliseconds; after that the message is
    /// dropped with an error log, per the realtime contract. Meta events and internal sentinels
    /// are ignored.
    pub fn output(&self, msg: &TimedMessage) {
        let mut shared = self.lock();
        let mut msg = msg.clone();
        if let Some(processor) = shared.processor.as_mut() {
            if !processor.process(&mut msg) {
                return;
            }
        }
        let bytes = match msg.wire_bytes() {
            Some(bytes) => bytes,
            None => return,
        };
        if shared.track_notes {
            shared.matrix.process(&msg);
        }
        for attempt in 0..=MAX_RETRIES {
            match shared.port.send(&bytes) {
                Ok(()) => return,
                Err(PortError::Busy) if attempt < MAX_RETRIES => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    error!(
                        "dropped message on out port '{}' after {} attempts: {}",
                        shared.port.name(),
                        attempt + 1,
                        e
                    );
                    return;
                }
            }
        }
    }

    /// Rechannelizes per the thru channel and sends. Called by the input driver's thru path.
    pub fn midi_thru(&self, msg: &TimedMessage) {
        let thru_channel = self.lock().thru_channel;
        let mut msg = msg.clone();
        if let Some(channel) = thru_channel {
            if msg.is_channel_msg() {
                msg.set_channel(channel);
            }
        }
        self.output(&msg);
    }

    /// Silences one channel. With note tracking, every sounding note gets an explicit note off
    /// followed by a damper-off; otherwise a single CC 123 does the job.
    pub fn all_notes_off(&self, channel: u8) {
        let mut shared = self.lock();
        Self::all_notes_off_locked(&mut shared, channel);
    }

    /// Silences all 16 channels.
    pub fn all_notes_off_all_channels(&self) {
        let mut shared = self.lock();
        for channel in 0..16 {
            Self::all_notes_off_locked(&mut shared, channel);
        }
    }

    fn all_notes_off_locked(shared: &mut OutShared, channel: u8) {
        let channel = channel & 0x0f;
        if shared.track_notes {
            let sounding: Vec<(u8, u8)> = shared.matrix.sounding_notes(channel).collect();
            for (note, count) in sounding {
                for _ in 0..count {
                    let off = Message::note_off(channel, note, 0);
                    Self::send_raw(shared, &off);
                }
            }
            let damper_off = Message::control_change(channel, C_DAMPER, 0);
            Self::send_raw(shared, &damper_off);
            shared.matrix.clear_channel(channel as usize);
        } else {
            let off = Message::all_notes_off(channel);
            Self::send_raw(shared, &off);
        }
    }

    fn send_raw(shared: &mut OutShared, msg: &Message) {
        let bytes = match msg.wire_bytes() {
            Some(bytes) => bytes,
            None => return,
        };
        for attempt in 0..=MAX_RETRIES {
            match shared.port.send(&bytes) {
                Ok(()) => return,
                Err(PortError::Busy) if attempt < MAX_RETRIES => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    error!("dropped message on out port '{}': {}", shared.port.name(), e);
                    return;
                }
            }
        }
    }

    /// The note matrix, for tests and diagnostics.
    pub fn matrix(&self) -> NoteMatrix {
        self.lock().matrix.clone()
    }
}

/// Which incoming message types the input driver discards before queueing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct IgnoreMask {
    pub sysex: bool,
    /// MIDI time code quarter frames.
    pub time_code: bool,
    pub active_sense: bool,
}

impl Default for IgnoreMask {
    fn default() -> Self {
        Self {
            sysex: true,
            time_code: true,
            active_sense: true,
        }
    }
}

impl IgnoreMask {
    fn ignores(&self, msg: &Message) -> bool {
        (self.sysex && msg.is_sysex())
            || (self.time_code && msg.status() == MTC)
            || (self.active_sense && msg.status() == RT_ACTIVE_SENSE)
    }
}

/// One received message: the parsed message, the backend's millisecond timestamp and the id of
/// the port it arrived on.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMessage {
    pub msg: Message,
    pub timestamp_ms: u64,
    pub port: usize,
}

struct InShared {
    queue: VecDeque<RawMessage>,
    ignore: IgnoreMask,
    thru_out: Option<Arc<OutDriver>>,
    thru_channel: Option<u8>,
}

impl InShared {
    /// The backend callback body. Runs on the backend's thread; touches only this state.
    fn receive(&mut self, port: usize, timestamp_ms: u64, bytes: &[u8]) {
        let msg = match Message::from_wire_bytes(bytes) {
            Some(msg) => msg,
            None => {
                warn!("unparseable {} byte message from in port {}", bytes.len(), port);
                return;
            }
        };
        if self.ignore.ignores(&msg) {
            return;
        }
        if let Some(out) = self.thru_out.as_ref() {
            let matches = match self.thru_channel {
                None => true,
                Some(channel) => msg.is_channel_msg() && msg.channel() == channel,
            };
            if matches {
                out.midi_thru(&TimedMessage::new(0, msg));
                return;
            }
        }
        if self.queue.len() == IN_QUEUE_CAPACITY {
            // bounded per the realtime contract: the oldest entry goes, silently
            self.queue.pop_front();
        }
        self.queue.push_back(RawMessage {
            msg,
            timestamp_ms,
            port,
        });
    }
}

/// A locked view of an input driver's queue. Holding this guard keeps the backend callback out.
pub struct InQueue<'a> {
    guard: MutexGuard<'a, InShared>,
}

impl<'a> InQueue<'a> {
    /// Pops the oldest received message.
    pub fn input(&mut self) -> Option<RawMessage> {
        self.guard.queue.pop_front()
    }

    /// Reads the `n`-th queued message (0 = oldest) without consuming it.
    pub fn peek(&self, n: usize) -> Option<&RawMessage> {
        self.guard.queue.get(n)
    }

    pub fn len(&self) -> usize {
        self.guard.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.queue.is_empty()
    }
}

/// An input port wrapper: the backend callback filters by the ignore mask, optionally forwards
/// thru, and feeds a bounded queue read by [`InDriver::lock`].
pub struct InDriver {
    id: usize,
    port: Mutex<Box<dyn MidiPort>>,
    open_count: Mutex<u32>,
    shared: Arc<Mutex<InShared>>,
}

impl InDriver {
    pub fn new(id: usize, port: Box<dyn MidiPort>) -> Self {
        Self {
            id,
            port: Mutex::new(port),
            open_count: Mutex::new(0),
            shared: Arc::new(Mutex::new(InShared {
                queue: VecDeque::with_capacity(IN_QUEUE_CAPACITY),
                ignore: IgnoreMask::default(),
                thru_out: None,
                thru_channel: None,
            })),
        }
    }

    /// The registry id of the underlying port.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> String {
        self.port.lock().expect("in driver poisoned").name()
    }

    /// Opens the port and installs the queue-feeding callback.
    pub fn open(&self) -> crate::Result<()> {
        let mut port = self.port.lock().expect("in driver poisoned");
        let mut open_count = self.open_count.lock().expect("in driver poisoned");
        if *open_count == 0 {
            let shared = Arc::clone(&self.shared);
            let id = self.id;
            port.set_input_callback(Box::new(move |timestamp_ms, bytes| {
                if let Ok(mut shared) = shared.lock() {
                    shared.receive(id, timestamp_ms, bytes);
                }
            }));
            let name = port.name();
            port.open().map_err(|e| {
                error::PortSnafu {
                    port: name,
                    action: "open",
                    description: e.to_string(),
                }
                .build()
            })?;
            debug!("in port '{}' opened", port.name());
        }
        *open_count += 1;
        Ok(())
    }

    pub fn close(&self) {
        let mut port = self.port.lock().expect("in driver poisoned");
        let mut open_count = self.open_count.lock().expect("in driver poisoned");
        match *open_count {
            0 => warn!("close of an in port that is not open"),
            1 => {
                *open_count = 0;
                port.close();
                debug!("in port '{}' closed", port.name());
            }
            _ => *open_count -= 1,
        }
    }

    pub fn is_open(&self) -> bool {
        *self.open_count.lock().expect("in driver poisoned") > 0
    }

    pub fn set_ignore_mask(&self, mask: IgnoreMask) {
        self.shared.lock().expect("in driver poisoned").ignore = mask;
    }

    /// Turns MIDI thru on (with the destination driver) or off. With a thru channel of `None`
    /// every incoming message is forwarded; otherwise only matching channel messages are.
    pub fn set_thru(&self, out: Option<Arc<OutDriver>>, channel: Option<u8>) {
        let mut shared = self.shared.lock().expect("in driver poisoned");
        shared.thru_out = out;
        shared.thru_channel = channel.map(|c| c & 0x0f);
    }

    /// Locks the receive queue for reading. The guard exposes `input` and `peek`.
    pub fn lock(&self) -> InQueue<'_> {
        InQueue {
            guard: self.shared.lock().expect("in driver poisoned"),
        }
    }
}

/// The explicit enumeration of the application's MIDI ports, passed to every sequencer. Ids are
/// assigned in registration order, separately for the out and in directions.
#[derive(Default)]
pub struct PortRegistry {
    outs: Vec<Arc<OutDriver>>,
    ins: Vec<Arc<InDriver>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an output backend in a driver and returns its id.
    pub fn register_out(&mut self, port: Box<dyn MidiPort>) -> usize {
        let id = self.outs.len();
        self.outs.push(Arc::new(OutDriver::new(id, port)));
        id
    }

    /// Wraps an input backend in a driver and returns its id.
    pub fn register_in(&mut self, port: Box<dyn MidiPort>) -> usize {
        let id = self.ins.len();
        self.ins.push(Arc::new(InDriver::new(id, port)));
        id
    }

    pub fn num_outs(&self) -> usize {
        self.outs.len()
    }

    pub fn num_ins(&self) -> usize {
        self.ins.len()
    }

    pub fn out_driver(&self, id: usize) -> Option<Arc<OutDriver>> {
        self.outs.get(id).cloned()
    }

    pub fn in_driver(&self, id: usize) -> Option<Arc<InDriver>> {
        self.ins.get(id).cloned()
    }

    /// All out drivers, in id order.
    pub fn out_drivers(&self) -> &[Arc<OutDriver>] {
        &self.outs
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    #[test]
    fn open_close_is_reference_counted() {
        let port = MockPort::new();
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.open().unwrap();
        driver.close();
        assert!(driver.is_open());
        assert!(port.state.lock().unwrap().open);
        driver.close();
        assert!(!driver.is_open());
        assert!(!port.state.lock().unwrap().open);
    }

    #[test]
    fn open_failure_surfaces() {
        let port = MockPort::new();
        port.state.lock().unwrap().fail_open = true;
        let driver = OutDriver::new(0, Box::new(port));
        let err = driver.open().unwrap_err();
        assert!(format!("{}", err).contains("backend said no"));
    }

    #[test]
    fn output_serializes_and_retries() {
        let port = MockPort::new();
        port.state.lock().unwrap().busy_sends = 3;
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.output(&TimedMessage::new(0, Message::note_on(1, 60, 100)));
        assert_eq!(vec![vec![0x91, 60, 100]], port.sent());
    }

    #[test]
    fn meta_events_never_reach_the_wire() {
        let port = MockPort::new();
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.output(&TimedMessage::new(0, Message::tempo(100.0)));
        driver.output(&TimedMessage::new(0, Message::beat_marker()));
        assert!(port.sent().is_empty());
    }

    #[test]
    fn all_notes_off_with_tracking_empties_matrix() {
        let port = MockPort::new();
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.output(&TimedMessage::new(0, Message::note_on(0, 60, 100)));
        driver.output(&TimedMessage::new(0, Message::note_on(0, 64, 100)));
        driver.output(&TimedMessage::new(0, Message::control_change(0, C_DAMPER, 127)));
        assert_eq!(2, driver.matrix().total_count());
        assert!(driver.matrix().hold_pedal(0));

        driver.all_notes_off_all_channels();
        assert_eq!(0, driver.matrix().total_count());
        assert!((0..16).all(|c| !driver.matrix().hold_pedal(c)));

        let sent = port.sent();
        // the two note offs followed by a damper off for channel 0
        assert!(sent.contains(&vec![0x80, 60, 0]));
        assert!(sent.contains(&vec![0x80, 64, 0]));
        assert!(sent.contains(&vec![0xb0, C_DAMPER, 0]));
    }

    #[test]
    fn all_notes_off_without_tracking_sends_cc123() {
        let port = MockPort::new();
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.set_note_tracking(false);
        driver.all_notes_off(5);
        assert_eq!(vec![vec![0xb5, 123, 0]], port.sent());
    }

    #[test]
    fn thru_rechannelizes() {
        let port = MockPort::new();
        let driver = OutDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        driver.set_thru_channel(Some(9));
        driver.midi_thru(&TimedMessage::new(0, Message::note_on(2, 60, 100)));
        assert_eq!(vec![vec![0x99, 60, 100]], port.sent());
    }

    #[test]
    fn in_driver_queues_messages() {
        let port = MockPort::new();
        let driver = InDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        port.inject(1, &[0x90, 60, 100]);
        port.inject(2, &[0x80, 60, 0]);

        let mut queue = driver.lock();
        assert_eq!(2, queue.len());
        assert_eq!(60, queue.peek(0).unwrap().msg.note());
        let first = queue.input().unwrap();
        assert!(first.msg.is_note_on());
        assert_eq!(1, first.timestamp_ms);
        assert_eq!(0, first.port);
        let second = queue.input().unwrap();
        assert!(second.msg.is_note_off());
        assert!(queue.input().is_none());
    }

    #[test]
    fn ignore_mask_filters() {
        let port = MockPort::new();
        let driver = InDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        // active sensing and MTC are ignored by default
        port.inject(0, &[0xfe]);
        port.inject(0, &[0xf1, 0x01]);
        port.inject(0, &[0x90, 60, 100]);
        assert_eq!(1, driver.lock().len());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let port = MockPort::new();
        let driver = InDriver::new(0, Box::new(port.clone()));
        driver.open().unwrap();
        for i in 0..(IN_QUEUE_CAPACITY + 10) {
            port.inject(i as u64, &[0x90, 60, 100]);
        }
        let queue = driver.lock();
        assert_eq!(IN_QUEUE_CAPACITY, queue.len());
        assert_eq!(10, queue.peek(0).unwrap().timestamp_ms);
    }

    #[test]
    fn thru_bypasses_queue() {
        let out_port = MockPort::new();
        let mut registry = PortRegistry::new();
        let out_id = registry.register_out(Box::new(out_port.clone()));
        let out = registry.out_driver(out_id).unwrap();
        out.open().unwrap();

        let in_port = MockPort::new();
        let in_id = registry.register_in(Box::new(in_port.clone()));
        let input = registry.in_driver(in_id).unwrap();
        input.open().unwrap();
        input.set_thru(Some(out), Some(3));

        // channel 3 goes thru, channel 5 queues
        in_port.inject(0, &[0x93, 60, 100]);
        in_port.inject(0, &[0x95, 62, 100]);
        assert_eq!(vec![vec![0x93, 60, 100]], out_port.sent());
        let queue = input.lock();
        assert_eq!(1, queue.len());
        assert_eq!(5, queue.peek(0).unwrap().msg.channel());
    }
}
