/*!
Status bytes, controller numbers, meta event types and length tables used throughout the crate.
!*/

/// To extract the channel number from a status byte. The right-most four bits of a channel
/// message status byte are the channel number.
pub(crate) const STATUS_CHANNEL_MASK: u8 = 0b0000_1111;

/// Message type mask. The left-most four bits of a status byte are the message type.
pub(crate) const STATUS_TYPE_MASK: u8 = 0b1111_0000;

/// `0x80`: `Note Off`.
pub const NOTE_OFF: u8 = 0x80;

/// `0x90`: `Note On` (a velocity of 0 means `Note Off`).
pub const NOTE_ON: u8 = 0x90;

/// `0xA0`: `Polyphonic key pressure/Aftertouch`.
pub const POLY_PRESSURE: u8 = 0xa0;

/// `0xB0`: `Control change`, or a `Channel Mode` message when the controller number is in
/// `0x78..=0x7f`.
pub const CONTROL_CHANGE: u8 = 0xb0;

/// `0xC0`: `Program change`.
pub const PROGRAM_CHANGE: u8 = 0xc0;

/// `0xD0`: `Channel pressure/Aftertouch`.
pub const CHANNEL_PRESSURE: u8 = 0xd0;

/// `0xE0`: `Pitch bend change`.
pub const PITCH_BEND: u8 = 0xe0;

/// `0xF0`: Start of a System Exclusive message. In a file: `F0 <length> <bytes>`.
pub const SYSEX_START: u8 = 0xf0;

/// `0xF1`: MIDI Time Code quarter frame.
pub const MTC: u8 = 0xf1;

/// `0xF2`: Song Position pointer.
pub const SONG_POSITION: u8 = 0xf2;

/// `0xF3`: Song Select.
pub const SONG_SELECT: u8 = 0xf3;

/// `0xF6`: Tune request.
pub const TUNE_REQUEST: u8 = 0xf6;

/// `0xF7`: End of a System Exclusive message. In a file this is also the "escape" event:
/// `F7 <length> <bytes>`.
pub const SYSEX_END: u8 = 0xf7;

/// `0xF8`: Real time timing clock.
pub const RT_TIMING_CLOCK: u8 = 0xf8;

/// `0xFA`: Real time sequencer start.
pub const RT_START: u8 = 0xfa;

/// `0xFB`: Real time sequencer continue.
pub const RT_CONTINUE: u8 = 0xfb;

/// `0xFC`: Real time sequencer stop.
pub const RT_STOP: u8 = 0xfc;

/// `0xFE`: Active sensing.
pub const RT_ACTIVE_SENSE: u8 = 0xfe;

/// `0xFF`: In a file, a meta event: `FF <type> <length> <bytes>`. Never sent on a wire by this
/// library (on a wire `0xFF` would be a reset).
pub const META_EVENT: u8 = 0xff;

// Controller numbers the sequencer interprets.

/// Bank select (coarse).
pub const C_GM_BANK: u8 = 0x00;

/// Main volume.
pub const C_MAIN_VOLUME: u8 = 0x07;

/// Pan.
pub const C_PAN: u8 = 0x0a;

/// Chorus depth.
pub const C_CHORUS: u8 = 0x5d;

/// Reverb (effects) depth.
pub const C_REVERB: u8 = 0x5b;

/// Hold pedal (sustain, damper).
pub const C_DAMPER: u8 = 0x40;

/// Channel mode: all notes off.
pub const C_ALL_NOTES_OFF: u8 = 0x7b;

/// Channel mode: all sound off.
pub const C_ALL_SOUND_OFF: u8 = 0x78;

// Meta event types.

/// `FF 00 02 ssss`: Sequence number.
pub const META_SEQUENCE_NUMBER: u8 = 0x00;

/// `FF 01 len text`: Generic text.
pub const META_GENERIC_TEXT: u8 = 0x01;

/// `FF 02 len text`: Copyright.
pub const META_COPYRIGHT: u8 = 0x02;

/// `FF 03 len text`: Sequence or track name.
pub const META_TRACK_NAME: u8 = 0x03;

/// `FF 04 len text`: Instrument name.
pub const META_INSTRUMENT_NAME: u8 = 0x04;

/// `FF 05 len text`: Lyric.
pub const META_LYRIC_TEXT: u8 = 0x05;

/// `FF 06 len text`: Marker.
pub const META_MARKER_TEXT: u8 = 0x06;

/// `FF 07 len text`: Cue point.
pub const META_CUE_TEXT: u8 = 0x07;

/// `FF 08 len text`: Program name.
pub const META_PROGRAM_NAME: u8 = 0x08;

/// `FF 09 len text`: Device name.
pub const META_DEVICE_NAME: u8 = 0x09;

/// `FF 0F len text`: Last of the reserved text meta types.
pub const META_TEXT_LAST: u8 = 0x0f;

/// `FF 20 01 cc`: MIDI channel prefix.
pub const META_CHANNEL_PREFIX: u8 = 0x20;

/// `FF 21 01 pp`: Output cable (port).
pub const META_OUTPUT_CABLE: u8 = 0x21;

/// `FF 2F 00`: End of track. Every track ends with one of these.
pub const META_END_OF_TRACK: u8 = 0x2f;

/// `FF 51 03 tttttt`: Tempo, microseconds per quarter note, big-endian 24 bits.
pub const META_TEMPO: u8 = 0x51;

/// `FF 54 05 hr mn se fr ff`: SMPTE offset.
pub const META_SMPTE: u8 = 0x54;

/// `FF 58 04 nn dd cc bb`: Time signature. `dd` is a negative power of two.
pub const META_TIMESIG: u8 = 0x58;

/// `FF 59 02 sf mi`: Key signature, sharps/flats (signed) and major/minor.
pub const META_KEYSIG: u8 = 0x59;

/// `FF 7F len data`: Sequencer specific.
pub const META_SEQUENCER_SPECIFIC: u8 = 0x7f;

/// Total length, including the status byte, of a channel message, indexed by the status byte's
/// high nibble. `-1` marks the system slot (`0xF0`) whose length is found in [`SYS_MSG_LEN`].
/// Entries `0x0..=0x7` are data bytes, not statuses, and are unreachable for a valid message.
pub(crate) const CHAN_MSG_LEN: [i8; 16] = [
    0, 0, 0, 0, 0, 0, 0, 0, // 0x00 - 0x70 are not statuses
    3, // 0x80 note off
    3, // 0x90 note on
    3, // 0xa0 poly pressure
    3, // 0xb0 control change
    2, // 0xc0 program change
    2, // 0xd0 channel pressure
    3, // 0xe0 pitch bend
    -1, // 0xf0 system (see SYS_MSG_LEN)
];

/// Total length of a system message indexed by `status & 0x0F`. `-1` marks variable length
/// (sysex, meta) or an undefined status.
pub(crate) const SYS_MSG_LEN: [i8; 16] = [
    -1, // 0xf0 sysex start, variable
    2,  // 0xf1 MTC
    3,  // 0xf2 song position
    2,  // 0xf3 song select
    -1, // 0xf4 undefined
    -1, // 0xf5 undefined
    1,  // 0xf6 tune request
    -1, // 0xf7 sysex end, variable
    1,  // 0xf8 timing clock
    -1, // 0xf9 undefined
    1,  // 0xfa start
    1,  // 0xfb continue
    1,  // 0xfc stop
    -1, // 0xfd undefined
    1,  // 0xfe active sense
    -1, // 0xff meta, variable
];

/// White keys of the chromatic scale, by note number modulo 12.
pub(crate) const NOTE_IS_WHITE: [bool; 12] = [
    true, false, true, false, true, true, false, true, false, true, false, true,
];

/// Returns **true** if the MIDI number of the note denotes a white key.
pub fn is_note_white(note: u8) -> bool {
    NOTE_IS_WHITE[(note % 12) as usize]
}

/// Returns **true** if the MIDI number of the note denotes a black key.
pub fn is_note_black(note: u8) -> bool {
    !is_note_white(note)
}

/// MIDI note number to standard octave conversion (note 60, middle C, is octave 4).
pub fn note_octave(note: u8) -> i8 {
    (note / 12) as i8 - 1
}

/// Returns a readable name for the given channel message status.
pub(crate) fn chan_msg_name(status: u8) -> &'static str {
    match status & STATUS_TYPE_MASK {
        NOTE_OFF => "NOTE OFF",
        NOTE_ON => "NOTE ON ",
        POLY_PRESSURE => "POLY PR ",
        CONTROL_CHANGE => "CTRL CHG",
        PROGRAM_CHANGE => "PROG CHG",
        CHANNEL_PRESSURE => "CHAN PR ",
        PITCH_BEND => "BENDER  ",
        _ => "unknown ",
    }
}

/// Returns a readable name for the given system message status.
pub(crate) fn sys_msg_name(status: u8) -> &'static str {
    match status {
        SYSEX_START => "SYSEX   ",
        MTC => "MTC     ",
        SONG_POSITION => "SONG POS",
        SONG_SELECT => "SONG SEL",
        TUNE_REQUEST => "TUNE REQ",
        SYSEX_END => "SYSEX END",
        RT_TIMING_CLOCK => "CLOCK   ",
        RT_START => "START   ",
        RT_CONTINUE => "CONTINUE",
        RT_STOP => "STOP    ",
        RT_ACTIVE_SENSE => "SENSE   ",
        _ => "unknown ",
    }
}

/// Returns a readable name for the given meta message type.
pub(crate) fn meta_msg_name(meta_type: u8) -> &'static str {
    match meta_type {
        META_SEQUENCE_NUMBER => "SEQ NUM ",
        META_GENERIC_TEXT..=META_TEXT_LAST => "TEXT    ",
        META_CHANNEL_PREFIX => "CH PREFIX",
        META_OUTPUT_CABLE => "CABLE   ",
        META_END_OF_TRACK => "END TRK ",
        META_TEMPO => "TEMPO   ",
        META_SMPTE => "SMPTE   ",
        META_TIMESIG => "TIMESIG ",
        META_KEYSIG => "KEYSIG  ",
        META_SEQUENCER_SPECIFIC => "SEQ SPEC",
        _ => "META    ",
    }
}

/// Converts a MIDI key signature into a readable form, e.g. `Bb m` for two flats, minor.
pub(crate) fn key_name(sharps_flats: i8, minor: bool) -> String {
    const MAJOR: [&str; 15] = [
        "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
    ];
    const MINOR: [&str; 15] = [
        "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
    ];
    let index = (sharps_flats.max(-7).min(7) + 7) as usize;
    let key = if minor { MINOR[index] } else { MAJOR[index] };
    format!("{} {}", key, if minor { "m" } else { "M" })
}

/// Default time signature numerator when no timesig meta has been seen.
pub const DEFAULT_TIMESIG_NUMERATOR: u8 = 4;

/// Default time signature denominator when no timesig meta has been seen.
pub const DEFAULT_TIMESIG_DENOMINATOR: u8 = 4;

/// Default musical tempo in beats per minute.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Default number of MIDI ticks per quarter note.
pub const DEFAULT_CLOCKS_PER_BEAT: u16 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_tables() {
        assert_eq!(3, CHAN_MSG_LEN[(NOTE_ON >> 4) as usize]);
        assert_eq!(2, CHAN_MSG_LEN[(PROGRAM_CHANGE >> 4) as usize]);
        assert_eq!(-1, CHAN_MSG_LEN[(SYSEX_START >> 4) as usize]);
        assert_eq!(3, SYS_MSG_LEN[(SONG_POSITION & 0x0f) as usize]);
        assert_eq!(1, SYS_MSG_LEN[(TUNE_REQUEST & 0x0f) as usize]);
        assert_eq!(-1, SYS_MSG_LEN[(META_EVENT & 0x0f) as usize]);
    }

    #[test]
    fn white_and_black_keys() {
        assert!(is_note_white(60)); // C
        assert!(is_note_black(61)); // C#
        assert!(is_note_white(71)); // B
        assert_eq!(4, note_octave(60));
        assert_eq!(-1, note_octave(0));
    }

    #[test]
    fn key_names() {
        assert_eq!("C M", key_name(0, false));
        assert_eq!("A m", key_name(0, true));
        assert_eq!("Bb M", key_name(-2, false));
        assert_eq!("F# M", key_name(6, false));
    }
}
