/*!
The `processor` module defines the capability of transforming (or swallowing) messages on their
way through the library, plus the stock transformers: a transposer, a rechannelizer and a
printer. The sequencer's per-track chain and the output driver's out-processor both take any
[`Processor`].
!*/

use crate::core::TimedMessage;
use log::info;

/// The message-transforming capability. Implementations mutate the message in place; returning
/// `false` swallows it.
pub trait Processor: Send {
    fn process(&mut self, msg: &mut TimedMessage) -> bool;
}

/// Runs messages through a sequence of processors, stopping (and dropping the message) at the
/// first one that swallows it.
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<Box<dyn Processor>>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, processor: Box<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl Processor for ProcessorChain {
    fn process(&mut self, msg: &mut TimedMessage) -> bool {
        self.processors.iter_mut().all(|p| p.process(msg))
    }
}

/// Transposes note and poly pressure messages by a per-channel amount of semitones. Notes
/// transposed out of the 0..=127 range are dropped.
pub struct Transposer {
    amount: [i8; 16],
}

impl Default for Transposer {
    fn default() -> Self {
        Self { amount: [0; 16] }
    }
}

impl Transposer {
    pub fn new(semitones: i8) -> Self {
        Self {
            amount: [semitones; 16],
        }
    }

    pub fn set_channel_transpose(&mut self, channel: u8, semitones: i8) {
        self.amount[(channel & 0x0f) as usize] = semitones;
    }

    pub fn set_all_transpose(&mut self, semitones: i8) {
        self.amount = [semitones; 16];
    }

    pub fn transpose(&self, channel: u8) -> i8 {
        self.amount[(channel & 0x0f) as usize]
    }
}

impl Processor for Transposer {
    fn process(&mut self, msg: &mut TimedMessage) -> bool {
        if !(msg.is_note() || msg.is_poly_pressure()) {
            return true;
        }
        let amount = self.amount[msg.channel() as usize];
        let note = msg.note() as i16 + amount as i16;
        if !(0..=127).contains(&note) {
            return false;
        }
        msg.set_note(note as u8);
        true
    }
}

/// Remaps the channel of channel messages. A target of `None` drops the message.
pub struct Rechannelizer {
    map: [Option<u8>; 16],
}

impl Default for Rechannelizer {
    fn default() -> Self {
        let mut map = [None; 16];
        for (channel, target) in map.iter_mut().enumerate() {
            *target = Some(channel as u8);
        }
        Self { map }
    }
}

impl Rechannelizer {
    /// The identity mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every source channel to one destination; `None` drops all channel messages.
    pub fn set_all_rechan(&mut self, target: Option<u8>) {
        self.map = [target.map(|t| t & 0x0f); 16];
    }

    pub fn set_rechan(&mut self, channel: u8, target: Option<u8>) {
        self.map[(channel & 0x0f) as usize] = target.map(|t| t & 0x0f);
    }

    pub fn rechan(&self, channel: u8) -> Option<u8> {
        self.map[(channel & 0x0f) as usize]
    }
}

impl Processor for Rechannelizer {
    fn process(&mut self, msg: &mut TimedMessage) -> bool {
        if !msg.is_channel_msg() {
            return true;
        }
        match self.map[msg.channel() as usize] {
            Some(target) => {
                msg.set_channel(target);
                true
            }
            None => false,
        }
    }
}

/// Logs every message that passes through, then lets it continue. Handy while debugging a
/// processor chain.
#[derive(Default)]
pub struct Printer {
    prefix: String,
}

impl Printer {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Processor for Printer {
    fn process(&mut self, msg: &mut TimedMessage) -> bool {
        info!("{}{}", self.prefix, msg);
        true
    }
}
