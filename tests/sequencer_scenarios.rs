mod utils;

use midi_sequencer::driver::{MidiPort, PortError, PortRegistry};
use midi_sequencer::{
    InsertMode, Message, MidiClockTime, MultiTrack, Notifier, NotifierEvent, Sequencer,
    TickScheduler, TimedMessage, TransportItem,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use utils::enable_logging;

/// A loopback output port collecting everything sent to it.
#[derive(Clone, Default)]
struct LoopPort {
    open: Arc<Mutex<bool>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl LoopPort {
    fn new() -> Self {
        Self::default()
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

impl MidiPort for LoopPort {
    fn name(&self) -> String {
        "loopback".to_string()
    }

    fn open(&mut self) -> Result<(), PortError> {
        *self.open.lock().unwrap() = true;
        Ok(())
    }

    fn close(&mut self) {
        *self.open.lock().unwrap() = false;
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct CollectingNotifier {
    events: Mutex<Vec<NotifierEvent>>,
}

impl CollectingNotifier {
    fn events(&self) -> Vec<NotifierEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, event: NotifierEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn note_on(time: MidiClockTime, ch: u8, note: u8) -> TimedMessage {
    TimedMessage::new(time, Message::note_on(ch, note, 100))
}

#[test]
fn tempo_change_affects_ms_mapping() {
    // 120 bpm for the first beat, 60 bpm afterwards: tick 240 sits at 500 + 1000 ms
    enable_logging();
    let mut song = MultiTrack::new(1);
    let track = song.track_mut(0).unwrap();
    track.insert_event(TimedMessage::new(0, Message::tempo(120.0)), None);
    track.insert_event(TimedMessage::new(120, Message::tempo(60.0)), None);
    track.set_end_time(480);

    let registry = PortRegistry::new();
    let sequencer = Sequencer::new(song, &registry, None, TickScheduler::new());
    sequencer.go_to_time(240).unwrap();
    assert!((sequencer.current_time_ms() - 1500.0).abs() < 1e-6);
    assert!((sequencer.tempo_bpm() - 60.0).abs() < 1e-6);
}

#[test]
fn iterator_tie_breaks_by_track_index() {
    // both tracks hold a note on at tick 100; track order decides
    enable_logging();
    let mut song = MultiTrack::new(2);
    song.track_mut(0)
        .unwrap()
        .insert_event(note_on(100, 0, 60), None);
    song.track_mut(1)
        .unwrap()
        .insert_event(note_on(100, 1, 60), None);

    let mut iter = song.iter();
    let mut seen = Vec::new();
    while let Some((track, msg)) = iter.cur_event() {
        if msg.is_note_on() {
            seen.push((track, msg.channel()));
        }
        if !iter.advance() {
            break;
        }
    }
    assert_eq!(vec![(0, 0), (1, 1)], seen);
}

#[test]
fn close_open_events_at_100() {
    enable_logging();
    let mut track = midi_sequencer::Track::new();
    track.insert_event(note_on(50, 0, 60), None);
    track.insert_event(
        TimedMessage::new(200, Message::note_off(0, 60, 0)),
        Some(InsertMode::Insert),
    );
    track.set_end_time(300);

    track.close_open_events(100);
    let events: Vec<&TimedMessage> = track.events().collect();
    assert_eq!(3, events.len());
    assert!(events[0].is_note_on());
    assert_eq!(50, events[0].time());
    assert!(events[1].is_note_off());
    assert_eq!(100, events[1].time());
}

#[test]
fn seek_chase_reaches_the_synth() {
    // program change at 0, note at 1000: seeking to 500 must have sent the program change
    enable_logging();
    let mut song = MultiTrack::new(1);
    let track = song.track_mut(0).unwrap();
    track.insert_event(TimedMessage::new(0, Message::program_change(0, 5)), None);
    track.insert_note(note_on(1000, 0, 60), 100, None);

    let port = LoopPort::new();
    let mut registry = PortRegistry::new();
    registry.register_out(Box::new(port.clone()));
    let sequencer = Sequencer::new(song, &registry, None, TickScheduler::new());

    sequencer.go_to_time(500).unwrap();
    assert!(port.sent().contains(&vec![0xc0, 5]));
    assert!(port.sent().iter().all(|bytes| bytes[0] & 0xf0 != 0x90));
}

#[test]
fn play_through_a_short_song() {
    enable_logging();
    let mut song = MultiTrack::new(2);
    song.track_mut(0)
        .unwrap()
        .insert_event(TimedMessage::new(0, Message::tempo(600.0)), None);
    song.track_mut(1)
        .unwrap()
        .insert_note(note_on(0, 0, 60), 60, None);
    // one beat at 600 bpm is 100 ms; the song is two beats long
    song.track_mut(1).unwrap().set_end_time(240);

    let port = LoopPort::new();
    let mut registry = PortRegistry::new();
    registry.register_out(Box::new(port.clone()));
    let notifier = Arc::new(CollectingNotifier::default());
    let scheduler = TickScheduler::new();
    let sequencer = Sequencer::new(
        song,
        &registry,
        Some(notifier.clone() as Arc<dyn Notifier>),
        scheduler.clone(),
    );

    sequencer.play().unwrap();
    assert!(sequencer.is_playing());

    // wait for the bounded end of the song (400 ms of music), generously
    for _ in 0..200 {
        if !sequencer.is_playing() {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!sequencer.is_playing(), "the song should stop by itself");
    sequencer.stop();

    let sent = port.sent();
    assert!(sent.contains(&vec![0x90, 60, 100]));
    assert!(sent.contains(&vec![0x80, 60, 0]));

    let events = notifier.events();
    assert!(events.contains(&NotifierEvent::Transport(TransportItem::Start)));
    assert!(events.contains(&NotifierEvent::Transport(TransportItem::Beat)));
    assert!(events.contains(&NotifierEvent::Transport(TransportItem::Stop)));
    assert!(!scheduler.is_running());
}

#[test]
fn stopping_silences_sounding_notes() {
    enable_logging();
    let mut song = MultiTrack::new(1);
    // a note that stays sounding for a long time
    song.track_mut(0)
        .unwrap()
        .insert_note(note_on(0, 3, 72), 100_000, None);

    let port = LoopPort::new();
    let mut registry = PortRegistry::new();
    registry.register_out(Box::new(port.clone()));
    let sequencer = Sequencer::new(song, &registry, None, TickScheduler::new());

    sequencer.play().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    sequencer.stop();

    let sent = port.sent();
    assert!(sent.contains(&vec![0x93, 72, 100]));
    // the driver's matrix produced an explicit note off for the sounding note
    assert!(sent.contains(&vec![0x83, 72, 0]));
}
