use crate::byte_iter::ByteIter;
use crate::error::LibResult;
use snafu::ResultExt;
use std::convert::TryFrom;
use std::io::Read;

/// The format word of the `MThd` chunk.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Format {
    /// 0: the file contains a single multi-channel track.
    Single = 0,
    /// 1: the file contains one or more simultaneous tracks of a sequence.
    Multi = 1,
    /// 2: the file contains one or more sequentially independent single-track patterns. This
    /// library reads such a file as if it were format 1 and never writes one.
    Sequential = 2,
}

impl Default for Format {
    fn default() -> Self {
        Format::Multi
    }
}

impl Format {
    pub(crate) fn from_u16(value: u16) -> LibResult<Self> {
        match value {
            0 => Ok(Format::Single),
            1 => Ok(Format::Multi),
            2 => Ok(Format::Sequential),
            _ => invalid_file_r!("unrecognized file format {}", value),
        }
    }
}

impl TryFrom<u16> for Format {
    type Error = crate::Error;

    fn try_from(value: u16) -> crate::Result<Self> {
        Ok(Self::from_u16(value)?)
    }
}

const DIVISION_TYPE_BIT: u16 = 0b1000_0000_0000_0000;

/// The `<division>` word of the header chunk, specifying the meaning of delta times.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Division {
    /// Bit 15 clear: bits 14..0 are the number of delta-time ticks making up a quarter note.
    ClocksPerQuarter(u16),
    /// Bit 15 set: SMPTE-based time. The first byte holds one of the negative values -24, -25,
    /// -29 or -30 (frames per second, two's complement), the second the resolution within a
    /// frame. Parsed and carried, but not interpreted by the sequencer.
    Smpte {
        /// The raw frames-per-second byte, stored as its positive magnitude (24, 25, 29, 30).
        frames_per_second: u8,
        /// Subdivisions of a frame.
        resolution: u8,
    },
}

impl Default for Division {
    fn default() -> Self {
        Division::ClocksPerQuarter(crate::core::constants::DEFAULT_CLOCKS_PER_BEAT)
    }
}

impl Division {
    pub(crate) fn from_u16(value: u16) -> LibResult<Self> {
        if value & DIVISION_TYPE_BIT == DIVISION_TYPE_BIT {
            let fps = (value >> 8) as u8;
            Ok(Division::Smpte {
                frames_per_second: (fps as i8).unsigned_abs(),
                resolution: (value & 0x00ff) as u8,
            })
        } else if value == 0 {
            invalid_file_r!("division may not be zero")
        } else {
            Ok(Division::ClocksPerQuarter(value))
        }
    }

    pub(crate) fn to_u16(self) -> u16 {
        match self {
            Division::ClocksPerQuarter(ticks) => ticks & !DIVISION_TYPE_BIT,
            Division::Smpte {
                frames_per_second,
                resolution,
            } => {
                let fps = (-(frames_per_second as i8)) as u8;
                ((fps as u16) << 8) | resolution as u16
            }
        }
    }
}

/// The parsed payload of an `MThd` chunk: exactly six bytes holding format, track count and
/// division.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Header {
    format: Format,
    num_tracks: u16,
    division: Division,
}

impl Header {
    pub(crate) fn parse<R: Read>(iter: &mut ByteIter<R>) -> LibResult<Self> {
        iter.expect_tag("MThd").context(io!())?;
        let chunk_length = iter.read_u32().context(io!())?;
        // header chunk length is always 6
        if chunk_length != 6 {
            invalid_file!("header chunk length {}, expected 6", chunk_length);
        }
        let format_word = iter.read_u16().context(io!())?;
        let num_tracks = iter.read_u16().context(io!())?;
        let division_data = iter.read_u16().context(io!())?;
        Ok(Self {
            format: Format::from_u16(format_word)?,
            num_tracks,
            division: Division::from_u16(division_data)?,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn num_tracks(&self) -> u16 {
        self.num_tracks
    }

    pub fn division(&self) -> Division {
        self.division
    }
}
