use crate::error::LibResult;
use crate::file::encoder::TrackEncoder;
use crate::file::header::{Division, Format};
use crate::multi_track::MultiTrack;
use crate::track::Track;
use snafu::ResultExt;
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The on-wire encoding used for note offs when writing a file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NoteOffWriteMode {
    /// The canonical `0x8n` status.
    NoteOff,
    /// `NOTE ON` with velocity 0, which compresses well under running status. The reader accepts
    /// both encodings regardless of this setting.
    NoteOnV0,
}

impl Default for NoteOffWriteMode {
    fn default() -> Self {
        NoteOffWriteMode::NoteOff
    }
}

/// Options for [`write`] and [`save`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WriteSettings {
    /// Format 0 collapses every track into a single one; format 1 writes tracks one-to-one.
    /// Format 2 is never written.
    pub format: Format,
    /// Whether to compress consecutive same-status channel events with running status.
    pub running_status: bool,
    /// Whether format 1 output omits tracks with no musical events.
    pub strip_empty_tracks: bool,
    /// See [`NoteOffWriteMode`].
    pub note_off_mode: NoteOffWriteMode,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            format: Format::Multi,
            running_status: true,
            strip_empty_tracks: false,
            note_off_mode: NoteOffWriteMode::default(),
        }
    }
}

/// Writes a [`MultiTrack`] as a Standard MIDI File.
pub fn write<W: Write>(
    multi_track: &MultiTrack,
    settings: &WriteSettings,
    w: W,
) -> crate::Result<()> {
    Ok(write_inner(multi_track, settings, w)?)
}

/// Writes a [`MultiTrack`] to a file on disk. See [`write`].
pub fn save<P: AsRef<Path>>(
    multi_track: &MultiTrack,
    settings: &WriteSettings,
    path: P,
) -> crate::Result<()> {
    let file = File::create(path.as_ref()).context(wr!())?;
    let mut buf = BufWriter::new(file);
    write(multi_track, settings, &mut buf)?;
    buf.flush().context(wr!())?;
    Ok(())
}

fn write_inner<W: Write>(
    multi_track: &MultiTrack,
    settings: &WriteSettings,
    mut w: W,
) -> LibResult<()> {
    let merged;
    let tracks: Vec<&Track> = match settings.format {
        Format::Single => {
            merged = merge_tracks(multi_track);
            vec![&merged]
        }
        Format::Multi => {
            if settings.strip_empty_tracks {
                multi_track.tracks().filter(|t| !t.is_empty()).collect()
            } else {
                multi_track.tracks().collect()
            }
        }
        Format::Sequential => invalid_file!("format 2 files are never written"),
    };

    // MThd
    w.write_all(b"MThd").context(wr!())?;
    w.write_all(&6u32.to_be_bytes()).context(wr!())?;
    w.write_all(&(settings.format as u16).to_be_bytes())
        .context(wr!())?;
    let num_tracks =
        u16::try_from(tracks.len()).map_err(|_| invalid_file_e!("too many tracks"))?;
    w.write_all(&num_tracks.to_be_bytes()).context(wr!())?;
    let division = Division::ClocksPerQuarter(multi_track.clocks_per_beat());
    w.write_all(&division.to_u16().to_be_bytes()).context(wr!())?;

    for track in tracks {
        write_track(track, settings, &mut w)?;
    }
    Ok(())
}

/// Collapses every track into one, preserving the global event order and the largest end time.
fn merge_tracks(multi_track: &MultiTrack) -> Track {
    let mut merged = Track::new();
    let mut iter = multi_track.iter();
    while let Some((_, msg)) = iter.cur_event() {
        if !msg.is_end_of_track() {
            merged.push_event(msg.clone());
        }
        if !iter.advance() {
            break;
        }
    }
    merged.set_end_time(multi_track.end_time());
    merged
}

fn write_track<W: Write>(track: &Track, settings: &WriteSettings, w: &mut W) -> LibResult<()> {
    // the whole track is encoded first; the chunk length is only known afterwards
    let mut encoder = TrackEncoder::new(settings.running_status, settings.note_off_mode);
    for event in track.events() {
        if event.is_internal() {
            continue;
        }
        encoder.put(event)?;
    }
    let (length, body) = encoder.finish()?;

    w.write_all(b"MTrk").context(wr!())?;
    w.write_all(&length.to_be_bytes()).context(wr!())?;
    w.write_all(&body).context(wr!())?;
    Ok(())
}
