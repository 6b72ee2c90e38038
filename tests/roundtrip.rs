mod utils;

use midi_sequencer::file::{self, Format, NoteOffWriteMode, WriteSettings};
use midi_sequencer::{InsertMode, Message, MidiClockTime, MultiTrack, TimedMessage};
use std::io::Cursor;
use tempfile::tempdir;
use utils::enable_logging;

fn note_on(time: MidiClockTime, ch: u8, note: u8, vel: u8) -> TimedMessage {
    TimedMessage::new(time, Message::note_on(ch, note, vel))
}

/// A song exercising every event family the codec handles.
fn busy_song() -> MultiTrack {
    let mut multi = MultiTrack::new(3);
    let master = multi.track_mut(0).unwrap();
    master.insert_event(TimedMessage::new(0, Message::tempo(96.0)), None);
    master.insert_event(TimedMessage::new(0, Message::time_signature(6, 3)), None);
    master.insert_event(TimedMessage::new(0, Message::key_signature(-2, true)), None);
    master.insert_event(TimedMessage::new(0, Message::track_name("master")), None);
    master.insert_event(TimedMessage::new(480, Message::marker_text("chorus")), None);
    master.insert_event(
        TimedMessage::new(960, Message::smpte_offset(1, 2, 3, 4, 5)),
        None,
    );

    let keys = multi.track_mut(1).unwrap();
    keys.insert_event(TimedMessage::new(0, Message::track_name("keys")), None);
    keys.insert_event(TimedMessage::new(0, Message::program_change(0, 4)), None);
    keys.insert_event(TimedMessage::new(0, Message::volume_change(0, 101)), None);
    for (i, note) in [60u8, 64, 67, 72].iter().enumerate() {
        keys.insert_note(
            note_on(i as MidiClockTime * 120, 0, *note, 90),
            100,
            Some(InsertMode::Insert),
        );
    }
    keys.insert_event(TimedMessage::new(240, Message::pitch_bend(0, 2000)), None);
    keys.insert_event(TimedMessage::new(300, Message::pitch_bend(0, 0)), None);

    let gadgets = multi.track_mut(2).unwrap();
    gadgets.insert_event(
        TimedMessage::new(0, Message::system_exclusive(vec![0x7e, 0x7f, 0x09, 0x01])),
        None,
    );
    gadgets.insert_note(note_on(120, 9, 40, 120), 30, None);
    multi
}

#[test]
fn format_1_round_trip_is_identity() {
    enable_logging();
    let song = busy_song();
    let mut bytes = Vec::new();
    file::write(&song, &WriteSettings::default(), &mut bytes).unwrap();
    let reloaded = file::read(Cursor::new(bytes)).unwrap();
    assert_eq!(song, reloaded);
}

#[test]
fn round_trip_through_a_real_file() {
    enable_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("busy_song.mid");
    let song = busy_song();
    file::save(&song, &WriteSettings::default(), &path).unwrap();
    let reloaded = file::load(&path).unwrap();
    assert_eq!(song, reloaded);
}

#[test]
fn insert_note_and_round_trip() {
    // two tracks, one note of 120 ticks at time 0 on track 1
    enable_logging();
    let mut song = MultiTrack::new(2);
    song.track_mut(1)
        .unwrap()
        .insert_note(note_on(0, 0, 60, 100), 120, None);

    let mut bytes = Vec::new();
    file::write(&song, &WriteSettings::default(), &mut bytes).unwrap();
    let reloaded = file::read(Cursor::new(bytes)).unwrap();

    let track = reloaded.track(1).unwrap();
    assert_eq!(3, track.len()); // note on, note off, end of track
    let on = track.event(0).unwrap();
    assert!(on.is_note_on());
    assert_eq!((0, 0, 60, 100), (on.time(), on.channel(), on.note(), on.velocity()));
    let off = track.event(1).unwrap();
    assert!(off.is_note_off());
    assert_eq!((120, 0, 60, 0), (off.time(), off.channel(), off.note(), off.velocity()));
}

#[test]
fn format_0_compacts_by_channel() {
    enable_logging();
    let song = busy_song();
    let settings = WriteSettings {
        format: Format::Single,
        ..WriteSettings::default()
    };
    let mut bytes = Vec::new();
    file::write(&song, &settings, &mut bytes).unwrap();
    let reloaded = file::read(Cursor::new(bytes)).unwrap();

    assert_eq!(17, reloaded.num_tracks());
    // non-channel events all land on track 0
    let master = reloaded.track(0).unwrap();
    assert!(master.events().any(|e| e.is_tempo()));
    assert!(master.events().any(|e| e.is_sysex()));
    // channel events land on channel + 1
    assert!(reloaded.track(1).unwrap().events().any(|e| e.is_note_on()));
    assert!(reloaded.track(10).unwrap().events().any(|e| e.is_note_on()));
    // every channel event kept its channel
    for (index, track) in reloaded.tracks().enumerate().skip(1) {
        for ev in track.events() {
            if ev.is_channel_msg() {
                assert_eq!(index as u8 - 1, ev.channel());
            }
        }
    }
}

#[test]
fn note_off_encoding_choices_read_identically() {
    enable_logging();
    let song = busy_song();
    let mut canonical = Vec::new();
    file::write(&song, &WriteSettings::default(), &mut canonical).unwrap();
    let mut compat = Vec::new();
    file::write(
        &song,
        &WriteSettings {
            note_off_mode: NoteOffWriteMode::NoteOnV0,
            ..WriteSettings::default()
        },
        &mut compat,
    )
    .unwrap();
    let a = file::read(Cursor::new(canonical)).unwrap();
    let b = file::read(Cursor::new(compat)).unwrap();
    for (track_a, track_b) in a.tracks().zip(b.tracks()) {
        assert_eq!(track_a.len(), track_b.len());
        for (ev_a, ev_b) in track_a.events().zip(track_b.events()) {
            assert_eq!(ev_a.time(), ev_b.time());
            assert_eq!(ev_a.is_note_off(), ev_b.is_note_off());
            if ev_a.is_note_off() {
                assert_eq!(ev_a.note(), ev_b.note());
            }
        }
    }
}

#[test]
fn running_status_streams_read_back() {
    // a run of same-status events followed by a different status
    enable_logging();
    let mut song = MultiTrack::new(1);
    let track = song.track_mut(0).unwrap();
    for i in 0..8u8 {
        track.insert_event(
            note_on(i as MidiClockTime * 10, 2, 60 + i, 80),
            Some(InsertMode::Insert),
        );
    }
    track.insert_event(
        TimedMessage::new(100, Message::program_change(2, 19)),
        None,
    );
    track.insert_event(
        note_on(110, 2, 72, 80),
        Some(InsertMode::Insert),
    );

    let mut bytes = Vec::new();
    file::write(&song, &WriteSettings::default(), &mut bytes).unwrap();
    let reloaded = file::read(Cursor::new(bytes)).unwrap();
    assert_eq!(song, reloaded);
}

#[test]
fn empty_tracks_survive_unless_stripped() {
    enable_logging();
    let mut song = MultiTrack::new(4);
    song.track_mut(2)
        .unwrap()
        .insert_note(note_on(0, 0, 60, 100), 120, None);

    let mut plain = Vec::new();
    file::write(&song, &WriteSettings::default(), &mut plain).unwrap();
    assert_eq!(4, file::read(Cursor::new(plain)).unwrap().num_tracks());

    let mut stripped = Vec::new();
    file::write(
        &song,
        &WriteSettings {
            strip_empty_tracks: true,
            ..WriteSettings::default()
        },
        &mut stripped,
    )
    .unwrap();
    assert_eq!(1, file::read(Cursor::new(stripped)).unwrap().num_tracks());
}
