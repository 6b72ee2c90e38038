use crate::core::constants::{C_ALL_NOTES_OFF, C_ALL_SOUND_OFF};
use crate::core::message::Message;

/// Bookkeeping of which notes are sounding: a per-channel, per-note count of outstanding note
/// ons minus note offs, a per-channel total, and a per-channel "damper pedal held" flag. The
/// output driver uses it to turn everything off reliably, the sequencer state uses it to answer
/// "what is sounding at tick t".
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct NoteMatrix {
    note_count: [[u8; 128]; 16],
    channel_count: [u16; 16],
    total_count: u32,
    hold_pedal: [bool; 16],
}

impl Default for NoteMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteMatrix {
    pub fn new() -> Self {
        Self {
            note_count: [[0; 128]; 16],
            channel_count: [0; 16],
            total_count: 0,
            hold_pedal: [false; 16],
        }
    }

    /// Forgets all sounding notes and pedal states.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Updates the matrix from a channel message. Note ons and offs adjust the counts, CC 64
    /// toggles the pedal flag, and the "all notes off" / "all sound off" channel modes clear
    /// the channel. Returns `true` if the message changed the matrix.
    pub fn process(&mut self, msg: &Message) -> bool {
        if !msg.is_channel_msg() {
            return false;
        }
        let channel = msg.channel() as usize;
        if msg.is_note_on() {
            self.increment(channel, msg.note() as usize);
            true
        } else if msg.is_note_off() {
            self.decrement(channel, msg.note() as usize)
        } else if msg.is_pedal_on() {
            self.hold_pedal[channel] = true;
            true
        } else if msg.is_pedal_off() {
            self.hold_pedal[channel] = false;
            true
        } else if msg.is_control_change()
            && (msg.controller() == C_ALL_NOTES_OFF || msg.controller() == C_ALL_SOUND_OFF)
        {
            self.clear_channel(channel);
            true
        } else {
            false
        }
    }

    fn increment(&mut self, channel: usize, note: usize) {
        self.note_count[channel][note] = self.note_count[channel][note].saturating_add(1);
        self.channel_count[channel] += 1;
        self.total_count += 1;
    }

    fn decrement(&mut self, channel: usize, note: usize) -> bool {
        if self.note_count[channel][note] == 0 {
            return false;
        }
        self.note_count[channel][note] -= 1;
        self.channel_count[channel] -= 1;
        self.total_count -= 1;
        true
    }

    /// Zeroes the counts and the pedal flag of one channel.
    pub fn clear_channel(&mut self, channel: usize) {
        let channel = channel & 0x0f;
        self.total_count -= u32::from(self.channel_count[channel]);
        self.channel_count[channel] = 0;
        self.note_count[channel] = [0; 128];
        self.hold_pedal[channel] = false;
    }

    /// How many note ons are outstanding for one note on one channel.
    pub fn note_count(&self, channel: u8, note: u8) -> u8 {
        self.note_count[(channel & 0x0f) as usize][(note & 0x7f) as usize]
    }

    /// How many notes are sounding on one channel.
    pub fn channel_count(&self, channel: u8) -> u16 {
        self.channel_count[(channel & 0x0f) as usize]
    }

    /// How many notes are sounding in total.
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    /// Whether the damper pedal is held on a channel.
    pub fn hold_pedal(&self, channel: u8) -> bool {
        self.hold_pedal[(channel & 0x0f) as usize]
    }

    /// The lowest sounding note on a channel.
    pub fn min_note(&self, channel: u8) -> Option<u8> {
        let counts = &self.note_count[(channel & 0x0f) as usize];
        counts.iter().position(|&c| c > 0).map(|i| i as u8)
    }

    /// The highest sounding note on a channel.
    pub fn max_note(&self, channel: u8) -> Option<u8> {
        let counts = &self.note_count[(channel & 0x0f) as usize];
        counts.iter().rposition(|&c| c > 0).map(|i| i as u8)
    }

    /// Iterates the sounding notes of a channel: `(note, count)` pairs with a non-zero count.
    pub fn sounding_notes(&self, channel: u8) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.note_count[(channel & 0x0f) as usize]
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(note, &count)| (note as u8, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_notes() {
        let mut matrix = NoteMatrix::new();
        matrix.process(&Message::note_on(0, 60, 100));
        matrix.process(&Message::note_on(0, 64, 100));
        matrix.process(&Message::note_on(1, 60, 100));
        assert_eq!(1, matrix.note_count(0, 60));
        assert_eq!(2, matrix.channel_count(0));
        assert_eq!(3, matrix.total_count());
        assert_eq!(Some(60), matrix.min_note(0));
        assert_eq!(Some(64), matrix.max_note(0));

        matrix.process(&Message::note_off(0, 60, 0));
        assert_eq!(0, matrix.note_count(0, 60));
        assert_eq!(2, matrix.total_count());

        // an unmatched note off does nothing
        assert!(!matrix.process(&Message::note_off(0, 61, 0)));
        assert_eq!(2, matrix.total_count());
    }

    #[test]
    fn note_on_velocity_zero_is_an_off() {
        let mut matrix = NoteMatrix::new();
        matrix.process(&Message::note_on(3, 72, 80));
        matrix.process(&Message::note_on(3, 72, 0));
        assert_eq!(0, matrix.total_count());
    }

    #[test]
    fn pedal_flag() {
        let mut matrix = NoteMatrix::new();
        matrix.process(&Message::control_change(2, 0x40, 127));
        assert!(matrix.hold_pedal(2));
        matrix.process(&Message::control_change(2, 0x40, 0));
        assert!(!matrix.hold_pedal(2));
    }

    #[test]
    fn all_notes_off_clears_channel() {
        let mut matrix = NoteMatrix::new();
        matrix.process(&Message::note_on(5, 60, 100));
        matrix.process(&Message::note_on(5, 62, 100));
        matrix.process(&Message::note_on(6, 60, 100));
        matrix.process(&Message::control_change(5, 0x40, 127));
        matrix.process(&Message::all_notes_off(5));
        assert_eq!(0, matrix.channel_count(5));
        assert!(!matrix.hold_pedal(5));
        assert_eq!(1, matrix.total_count());
    }
}
