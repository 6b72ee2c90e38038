use crate::core::constants::{META_EVENT, META_KEYSIG, NOTE_OFF, NOTE_ON, SYSEX_END, SYSEX_START};
use crate::core::vlq::encode_u32;
use crate::core::{MidiClockTime, TimedMessage};
use crate::error::LibResult;
use crate::file::writer::NoteOffWriteMode;
use log::trace;
use std::convert::TryFrom;

/// Lays one track's event stream down as the body of an `MTrk` chunk. The encoder keeps the two
/// pieces of serializer state the format demands: the time of the previous event (each event is
/// prefixed by a variable-length delta, not an absolute tick) and the channel status a running
/// status data run is riding on. It also applies the configured note-off encoding, so a
/// `NOTE ON` run can swallow its note offs when [`NoteOffWriteMode::NoteOnV0`] is chosen.
///
/// The body buffer is owned here because the chunk's length word can only be written once the
/// whole track has been encoded.
pub(crate) struct TrackEncoder {
    body: Vec<u8>,
    use_running_status: bool,
    note_off_mode: NoteOffWriteMode,
    running_status: Option<u8>,
    prev_time: MidiClockTime,
}

impl TrackEncoder {
    pub(crate) fn new(use_running_status: bool, note_off_mode: NoteOffWriteMode) -> Self {
        Self {
            body: Vec::new(),
            use_running_status,
            note_off_mode,
            running_status: None,
            prev_time: 0,
        }
    }

    /// Encodes one event. Events must arrive in track order; the caller skips the internal
    /// sentinels, which have no file representation.
    pub(crate) fn put(&mut self, event: &TimedMessage) -> LibResult<()> {
        trace!("encoding {}", event);
        let delta = u32::try_from(event.time() - self.prev_time)
            .map_err(|_| invalid_file_e!("delta time too large at tick {}", event.time()))?;
        self.prev_time = event.time();
        self.body.extend(encode_u32(delta));

        if event.is_meta_event() {
            return self.put_meta(event);
        }
        if event.is_sysex() {
            // stored with the full F0 … F7 framing, encoded as F0 <len> <bytes after F0>
            let payload = event.payload().unwrap_or(&[]);
            let rest = payload.strip_prefix(&[SYSEX_START]).unwrap_or(payload);
            self.put_system_status(SYSEX_START);
            self.put_length(rest.len())?;
            self.body.extend_from_slice(rest);
            return Ok(());
        }
        if event.status() == SYSEX_END {
            // the "escape" event: an arbitrary run of bytes
            let payload = event.payload().unwrap_or(&[]);
            self.put_system_status(SYSEX_END);
            self.put_length(payload.len())?;
            self.body.extend_from_slice(payload);
            return Ok(());
        }
        if event.is_channel_msg() {
            let (status, data1, data2) = match self.note_off_mode {
                NoteOffWriteMode::NoteOnV0 if event.status_type() == NOTE_OFF => {
                    (NOTE_ON | event.channel(), event.note(), 0)
                }
                _ => (event.status(), event.data1(), event.data2()),
            };
            self.put_channel_status(status);
            self.body.push(data1);
            if event.length().unwrap_or(3) > 2 {
                self.body.push(data2);
            }
            return Ok(());
        }
        // a non-sysex system message
        self.put_system_status(event.status());
        if let Some(length) = event.length() {
            if length > 1 {
                self.body.push(event.data1());
            }
            if length > 2 {
                self.body.push(event.data2());
            }
        }
        Ok(())
    }

    fn put_meta(&mut self, event: &TimedMessage) -> LibResult<()> {
        // a meta event ends any data run
        self.running_status = None;
        self.body.push(META_EVENT);
        self.body.push(event.meta_type());
        let keysig_data;
        let payload: &[u8] = match event.meta_type() {
            // keysig data lives in the data bytes, everything else in the owned buffer
            META_KEYSIG => {
                keysig_data = [event.data2(), event.data3()];
                &keysig_data
            }
            _ => event.payload().unwrap_or(&[]),
        };
        self.put_length(payload.len())?;
        self.body.extend_from_slice(payload);
        Ok(())
    }

    /// A channel status byte: omitted when the data run already rides on the same status.
    fn put_channel_status(&mut self, status: u8) {
        if self.use_running_status {
            if self.running_status == Some(status) {
                return;
            }
            self.running_status = Some(status);
        }
        self.body.push(status);
    }

    /// Any system status (sysex, escape, common, realtime) interrupts running status.
    fn put_system_status(&mut self, status: u8) {
        self.running_status = None;
        self.body.push(status);
    }

    fn put_length(&mut self, length: usize) -> LibResult<()> {
        let length =
            u32::try_from(length).map_err(|_| invalid_file_e!("event payload too large"))?;
        self.body.extend(encode_u32(length));
        Ok(())
    }

    /// The finished chunk body with its length word.
    pub(crate) fn finish(self) -> LibResult<(u32, Vec<u8>)> {
        let length = u32::try_from(self.body.len())
            .map_err(|_| crate::error::TrackTooLongSnafu { site: site!() }.build())?;
        Ok((length, self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;

    fn encode(events: &[TimedMessage], running_status: bool, mode: NoteOffWriteMode) -> Vec<u8> {
        let mut encoder = TrackEncoder::new(running_status, mode);
        for event in events {
            encoder.put(event).unwrap();
        }
        encoder.finish().unwrap().1
    }

    #[test]
    fn deltas_are_relative_and_variable_length() {
        let events = vec![
            TimedMessage::new(0, Message::note_on(0, 60, 100)),
            TimedMessage::new(200, Message::note_on(0, 62, 100)),
        ];
        let body = encode(&events, false, NoteOffWriteMode::NoteOff);
        assert_eq!(
            vec![0x00, 0x90, 60, 100, 0x81, 0x48, 0x90, 62, 100],
            body
        );
    }

    #[test]
    fn running_status_omits_repeated_statuses() {
        let events = vec![
            TimedMessage::new(0, Message::note_on(2, 60, 100)),
            TimedMessage::new(0, Message::note_on(2, 64, 100)),
            TimedMessage::new(0, Message::program_change(2, 7)),
            TimedMessage::new(0, Message::note_on(2, 67, 100)),
        ];
        let body = encode(&events, true, NoteOffWriteMode::NoteOff);
        assert_eq!(
            vec![
                0x00, 0x92, 60, 100, //
                0x00, 64, 100, // status omitted
                0x00, 0xc2, 7, // new status
                0x00, 0x92, 67, 100, // and back
            ],
            body
        );
    }

    #[test]
    fn meta_interrupts_a_data_run() {
        let events = vec![
            TimedMessage::new(0, Message::note_on(0, 60, 100)),
            TimedMessage::new(0, Message::marker_text("a")),
            TimedMessage::new(0, Message::note_on(0, 62, 100)),
        ];
        let body = encode(&events, true, NoteOffWriteMode::NoteOff);
        assert_eq!(
            vec![
                0x00, 0x90, 60, 100, //
                0x00, 0xff, 0x06, 0x01, b'a', //
                0x00, 0x90, 62, 100, // the status byte must reappear
            ],
            body
        );
    }

    #[test]
    fn note_off_modes_choose_the_wire_status() {
        let events = vec![
            TimedMessage::new(0, Message::note_on(0, 60, 100)),
            TimedMessage::new(10, Message::note_off(0, 60, 64)),
        ];
        let canonical = encode(&events, true, NoteOffWriteMode::NoteOff);
        assert_eq!(vec![0x00, 0x90, 60, 100, 0x0a, 0x80, 60, 64], canonical);

        // the compatibility form turns the note off into NOTE ON velocity 0, which then rides
        // the running status of the preceding note on
        let compat = encode(&events, true, NoteOffWriteMode::NoteOnV0);
        assert_eq!(vec![0x00, 0x90, 60, 100, 0x0a, 60, 0], compat);
    }

    #[test]
    fn sysex_reframes_under_its_length() {
        let events = vec![TimedMessage::new(
            0,
            Message::system_exclusive(vec![0x7e, 0x7f, 0x09, 0x01]),
        )];
        let body = encode(&events, true, NoteOffWriteMode::NoteOff);
        assert_eq!(
            vec![0x00, 0xf0, 0x05, 0x7e, 0x7f, 0x09, 0x01, 0xf7],
            body
        );
    }

    #[test]
    fn keysig_encodes_from_the_data_bytes() {
        let events = vec![TimedMessage::new(0, Message::key_signature(-2, true))];
        let body = encode(&events, true, NoteOffWriteMode::NoteOff);
        assert_eq!(vec![0x00, 0xff, 0x59, 0x02, 0xfe, 0x01], body);
    }

    #[test]
    fn finish_reports_the_body_length() {
        let mut encoder = TrackEncoder::new(true, NoteOffWriteMode::NoteOff);
        encoder
            .put(&TimedMessage::new(0, Message::end_of_track()))
            .unwrap();
        let (length, body) = encoder.finish().unwrap();
        assert_eq!(length as usize, body.len());
        assert_eq!(vec![0x00, 0xff, 0x2f, 0x00], body);
    }
}
