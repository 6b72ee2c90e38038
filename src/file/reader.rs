use crate::byte_iter::ByteIter;
use crate::core::constants::{
    CHAN_MSG_LEN, DEFAULT_CLOCKS_PER_BEAT, META_END_OF_TRACK, META_EVENT, SYSEX_END, SYSEX_START,
    SYS_MSG_LEN,
};
use crate::core::{Message, MidiClockTime, TimedMessage};
use crate::error::LibResult;
use crate::file::header::{Division, Format, Header};
use crate::multi_track::MultiTrack;
use log::{debug, trace, warn};
use snafu::ResultExt;
use std::io::Read;
use std::path::Path;

/// Reads a Standard MIDI File into a [`MultiTrack`]. For a format 0 file the single track is
/// split: channel events land on tracks 1..=16 by channel and everything else on track 0.
/// Formats 1 and 2 map tracks one-to-one. A malformed file aborts the parse and the partial
/// multitrack is discarded.
pub fn read<R: Read>(r: R) -> crate::Result<MultiTrack> {
    let iter = ByteIter::new(r.bytes()).context(io!())?;
    Ok(read_inner(iter)?)
}

/// Reads a Standard MIDI File from a path. See [`read`].
pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<MultiTrack> {
    Ok(read_inner(ByteIter::new_file(path).context(io!())?)?)
}

fn read_inner<R: Read>(mut iter: ByteIter<R>) -> LibResult<MultiTrack> {
    trace!("parsing header chunk");
    let header = Header::parse(&mut iter)?;
    let clocks_per_beat = match header.division() {
        Division::ClocksPerQuarter(ticks) => ticks,
        Division::Smpte { .. } => {
            warn!("SMPTE division is not interpreted, keeping the default resolution");
            DEFAULT_CLOCKS_PER_BEAT
        }
    };

    let mut multi_track = match header.format() {
        // a format 0 file is split by channel into a fixed 17 track layout
        Format::Single => MultiTrack::with_clocks_per_beat(17, clocks_per_beat),
        Format::Multi | Format::Sequential => {
            MultiTrack::with_clocks_per_beat(header.num_tracks() as usize, clocks_per_beat)
        }
    };

    let mut track_index = 0usize;
    while !iter.is_end() {
        if track_index >= header.num_tracks() as usize {
            break;
        }
        let tag = iter.read4().context(io!())?;
        if &tag == b"MTrk" {
            trace!("parsing track chunk {} of {}", track_index, header.num_tracks());
            parse_track(&mut iter, header.format(), track_index, &mut multi_track)?;
            track_index += 1;
        } else {
            // unknown chunk, skip its payload
            let length = iter.read_u32().context(io!())?;
            debug!(
                "skipping unknown chunk '{}' of {} bytes",
                String::from_utf8_lossy(&tag),
                length
            );
            iter.skip_n(length as u64).context(io!())?;
        }
    }
    if track_index < header.num_tracks() as usize {
        warn!(
            "header names {} tracks but the file holds {}",
            header.num_tracks(),
            track_index
        );
    }
    Ok(multi_track)
}

fn parse_track<R: Read>(
    iter: &mut ByteIter<R>,
    format: Format,
    track_index: usize,
    multi_track: &mut MultiTrack,
) -> LibResult<()> {
    let chunk_length = iter.read_u32().context(io!())?;
    iter.set_size_limit(chunk_length as u64);

    let mut time: MidiClockTime = 0;
    let mut running_status: Option<u8> = None;
    loop {
        if iter.is_end() {
            invalid_file!("end of track bytes reached before the end-of-track event");
        }
        let delta_time = iter.read_vlq_u32().context(io!())?;
        time += delta_time as MidiClockTime;
        trace!("delta_time {}", delta_time);

        let first = iter.peek_or_die().context(io!())?;
        if first < 0x80 {
            // a data byte at event position reuses the previous channel status
            let status = match running_status {
                Some(status) => status,
                None => invalid_file!("data byte {:#04x} with no running status", first),
            };
            let msg = parse_channel_data(iter, status)?;
            push(multi_track, format, track_index, TimedMessage::new(time, msg));
            continue;
        }

        match first {
            META_EVENT => {
                // our default keeps running status across meta events disabled
                running_status = None;
                iter.read_expect(META_EVENT).context(io!())?;
                let meta_type = iter.read_or_die().context(io!())?;
                let length = iter.read_vlq_u32().context(io!())?;
                let payload = iter.read_n(length as usize).context(io!())?;
                if meta_type == META_END_OF_TRACK {
                    debug!("end of track event");
                    finish_track(multi_track, format, track_index, time);
                    if !iter.is_end() {
                        invalid_file!("end-of-track event before the end of the track bytes");
                    }
                    break;
                }
                let msg = Message::meta_from_raw(meta_type, payload);
                push(multi_track, format, track_index, TimedMessage::new(time, msg));
            }
            SYSEX_START => {
                running_status = None;
                iter.read_expect(SYSEX_START).context(io!())?;
                let length = iter.read_vlq_u32().context(io!())?;
                let mut payload = iter.read_n(length as usize).context(io!())?;
                payload.insert(0, SYSEX_START);
                if payload.last() != Some(&SYSEX_END) {
                    warn!("sysex payload without a terminating F7");
                }
                let msg = Message::system_exclusive(payload);
                push(multi_track, format, track_index, TimedMessage::new(time, msg));
            }
            SYSEX_END => {
                // the "escape" event: an arbitrary run of bytes
                running_status = None;
                iter.read_expect(SYSEX_END).context(io!())?;
                let length = iter.read_vlq_u32().context(io!())?;
                let payload = iter.read_n(length as usize).context(io!())?;
                let msg = Message::sysex_escape(payload);
                push(multi_track, format, track_index, TimedMessage::new(time, msg));
            }
            status if status >= 0xf0 => {
                // any other system message interrupts running status
                running_status = None;
                let length = SYS_MSG_LEN[(status & 0x0f) as usize];
                if length < 0 {
                    invalid_file!("undefined system status {:#04x}", status);
                }
                iter.read_expect(status).context(io!())?;
                let data1 = if length > 1 {
                    iter.read_or_die().context(io!())?
                } else {
                    0
                };
                let data2 = if length > 2 {
                    iter.read_or_die().context(io!())?
                } else {
                    0
                };
                let msg = Message::system_from_raw(status, data1, data2);
                push(multi_track, format, track_index, TimedMessage::new(time, msg));
            }
            status => {
                iter.read_expect(status).context(io!())?;
                running_status = Some(status);
                let msg = parse_channel_data(iter, status)?;
                push(multi_track, format, track_index, TimedMessage::new(time, msg));
            }
        }
    }
    iter.clear_size_limit();
    Ok(())
}

/// Reads the data bytes of a channel message whose status byte is already known.
fn parse_channel_data<R: Read>(iter: &mut ByteIter<R>, status: u8) -> LibResult<Message> {
    let length = CHAN_MSG_LEN[(status >> 4) as usize];
    if length < 2 {
        invalid_file!("invalid channel status {:#04x}", status);
    }
    let data1 = iter.read_or_die().context(io!())?;
    let data2 = if length > 2 {
        iter.read_or_die().context(io!())?
    } else {
        0
    };
    Ok(Message::channel_from_raw(status, data1, data2))
}

/// Routes an event to its destination track: identity for format 1, by channel for format 0.
fn push(multi_track: &mut MultiTrack, format: Format, track_index: usize, msg: TimedMessage) {
    let destination = match format {
        Format::Single => {
            if msg.is_channel_msg() {
                msg.channel() as usize + 1
            } else {
                0
            }
        }
        Format::Multi | Format::Sequential => track_index,
    };
    if let Some(track) = multi_track.track_mut(destination) {
        track.push_event(msg);
    }
}

/// Closes a parsed file track: sets the end time of the destination track(s).
fn finish_track(multi_track: &mut MultiTrack, format: Format, track_index: usize, end: MidiClockTime) {
    match format {
        Format::Single => {
            for index in 0..multi_track.num_tracks() {
                if let Some(track) = multi_track.track_mut(index) {
                    track.set_end_time(end.max(track.last_event_time()));
                }
            }
        }
        Format::Multi | Format::Sequential => {
            if let Some(track) = multi_track.track_mut(track_index) {
                track.set_end_time(end.max(track.last_event_time()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = tag.to_vec();
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn header_chunk(format: u16, num_tracks: u16, division: u16) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&format.to_be_bytes());
        payload.extend_from_slice(&num_tracks.to_be_bytes());
        payload.extend_from_slice(&division.to_be_bytes());
        chunk(b"MThd", &payload)
    }

    #[test]
    fn read_simple_format_1() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0x90, 60, 100, // note on at 0
            0x78, 0x80, 60, 0, // note off at 120
            0x00, 0xff, 0x2f, 0x00, // end of track
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));

        let multi = read(std::io::Cursor::new(file)).unwrap();
        assert_eq!(1, multi.num_tracks());
        assert_eq!(120, multi.clocks_per_beat());
        let track = multi.track(0).unwrap();
        assert_eq!(3, track.len());
        assert!(track.event(0).unwrap().is_note_on());
        assert_eq!(0, track.event(0).unwrap().time());
        assert!(track.event(1).unwrap().is_note_off());
        assert_eq!(120, track.event(1).unwrap().time());
        assert_eq!(120, track.end_time());
    }

    #[test]
    fn running_status_reuses_channel_status() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0x91, 60, 100, // note on, channel 1
            0x10, 62, 100, // running status note on
            0x10, 64, 100, // running status note on
            0x00, 0xff, 0x2f, 0x00,
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));

        let multi = read(std::io::Cursor::new(file)).unwrap();
        let track = multi.track(0).unwrap();
        let notes: Vec<(MidiClockTime, u8)> = track
            .events()
            .filter(|e| e.is_note_on())
            .map(|e| (e.time(), e.note()))
            .collect();
        assert_eq!(vec![(0, 60), (0x10, 62), (0x20, 64)], notes);
        assert!(track.events().filter(|e| e.is_note_on()).all(|e| e.channel() == 1));
    }

    #[test]
    fn data_byte_without_running_status_is_an_error() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![0x00, 60, 100, 0x00, 0xff, 0x2f, 0x00];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        assert!(read(std::io::Cursor::new(file)).is_err());
    }

    #[test]
    fn meta_resets_running_status() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0x90, 60, 100, // note on
            0x00, 0xff, 0x06, 0x02, b'h', b'i', // marker meta
            0x00, 62, 100, // running status across the meta: rejected
            0x00, 0xff, 0x2f, 0x00,
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        assert!(read(std::io::Cursor::new(file)).is_err());
    }

    #[test]
    fn format_0_splits_by_channel() {
        // a tempo meta and a note on channel 2 (0-based)
        let mut file = header_chunk(0, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20, // tempo 500000
            0x00, 0x92, 60, 100, // note on channel 2
            0x78, 0x82, 60, 0, // note off
            0x00, 0xff, 0x2f, 0x00,
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));

        let multi = read(std::io::Cursor::new(file)).unwrap();
        assert_eq!(17, multi.num_tracks());
        assert!(multi.track(0).unwrap().events().any(|e| e.is_tempo()));
        assert!(multi.track(3).unwrap().events().any(|e| e.is_note_on()));
        assert!(multi.track(1).unwrap().is_empty());
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let mut file = header_chunk(1, 1, 120);
        file.extend_from_slice(&chunk(b"XFIH", &[1, 2, 3, 4, 5]));
        let track: Vec<u8> = vec![0x00, 0x90, 60, 100, 0x00, 0xff, 0x2f, 0x00];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        let multi = read(std::io::Cursor::new(file)).unwrap();
        assert_eq!(1, multi.num_tracks());
        assert!(!multi.track(0).unwrap().is_empty());
    }

    #[test]
    fn sysex_event_is_framed() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0xf0, 0x05, 0x7e, 0x7f, 0x09, 0x01, 0xf7, // GM reset
            0x00, 0xff, 0x2f, 0x00,
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        let multi = read(std::io::Cursor::new(file)).unwrap();
        let sysex = multi.track(0).unwrap().event(0).unwrap();
        assert!(sysex.is_sysex());
        assert_eq!(
            &[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7],
            sysex.payload().unwrap()
        );
    }

    #[test]
    fn note_on_velocity_zero_reads_as_note_off() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![
            0x00, 0x90, 60, 100, //
            0x78, 0x90, 60, 0, // running-status style note off
            0x00, 0xff, 0x2f, 0x00,
        ];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        let multi = read(std::io::Cursor::new(file)).unwrap();
        let track = multi.track(0).unwrap();
        assert!(track.event(1).unwrap().is_note_off());
    }

    #[test]
    fn truncated_file_is_an_error() {
        let mut file = header_chunk(1, 1, 120);
        let track: Vec<u8> = vec![0x00, 0x90, 60];
        file.extend_from_slice(&chunk(b"MTrk", &track));
        assert!(read(std::io::Cursor::new(file)).is_err());
    }
}
