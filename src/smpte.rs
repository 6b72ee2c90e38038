/*!
The `smpte` module converts among audio sample counts, SMPTE `hours:minutes:seconds:frames`
times and milliseconds, for the six standard frame rates and six common sample rates. Drop-frame
rates follow the broadcast rule: every minute, except each tenth, drops two frame numbers.
!*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// The six standard SMPTE frame rates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SmpteRate {
    /// 24 frames/sec (film).
    Smpte24,
    /// 25 frames/sec (EBU).
    Smpte25,
    /// 29.97 frames/sec.
    Smpte2997,
    /// 29.97 frames/sec, drop frame.
    Smpte2997Df,
    /// 30 frames/sec.
    Smpte30,
    /// 30 frames/sec, drop frame.
    Smpte30Df,
}

impl Default for SmpteRate {
    fn default() -> Self {
        SmpteRate::Smpte30
    }
}

impl SmpteRate {
    /// Frames per second as a real number.
    pub fn frequency(self) -> f64 {
        match self {
            SmpteRate::Smpte24 => 24.0,
            SmpteRate::Smpte25 => 25.0,
            SmpteRate::Smpte2997 | SmpteRate::Smpte2997Df => 30.0 / 1.001,
            SmpteRate::Smpte30 | SmpteRate::Smpte30Df => 30.0,
        }
    }

    /// The number of frame values in one second of timecode (the modulus of the frames field).
    pub fn max_frames(self) -> u8 {
        match self {
            SmpteRate::Smpte24 => 24,
            SmpteRate::Smpte25 => 25,
            _ => 30,
        }
    }

    /// True for the drop-frame variants.
    pub fn is_drop_frame(self) -> bool {
        matches!(self, SmpteRate::Smpte2997Df | SmpteRate::Smpte30Df)
    }
}

/// The six supported audio sample rates, including the 0.1% pull-up/pull-down variants used
/// when syncing audio to 29.97 video.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SampleRate {
    /// 32000 samples/sec.
    S32000,
    /// 44100 / 1.001 samples/sec (44056, pull-down).
    S44056,
    /// 44100 samples/sec.
    S44100,
    /// 48000 / 1.001 samples/sec (47952, pull-down).
    S47952,
    /// 48000 samples/sec.
    S48000,
    /// 48000 × 1.001 samples/sec (48048, pull-up).
    S48048,
}

impl Default for SampleRate {
    fn default() -> Self {
        SampleRate::S48000
    }
}

impl SampleRate {
    /// Samples per second as a real number.
    pub fn frequency(self) -> f64 {
        match self {
            SampleRate::S32000 => 32000.0,
            SampleRate::S44056 => 44100.0 / 1.001,
            SampleRate::S44100 => 44100.0,
            SampleRate::S47952 => 48000.0 / 1.001,
            SampleRate::S48000 => 48000.0,
            SampleRate::S48048 => 48000.0 * 1.001,
        }
    }
}

/// A SMPTE time, held both as an audio sample count and as the `h:m:s:f.sf` field tuple. The
/// two representations are kept in sync on every mutation; sample counts are the ground truth
/// for arithmetic and comparison.
#[derive(Clone, Copy, Debug, Default)]
pub struct Smpte {
    smpte_rate: SmpteRate,
    sample_rate: SampleRate,
    sample_number: u64,
    hours: u8,
    minutes: u8,
    seconds: u8,
    frames: u8,
    sub_frames: u8,
}

impl Smpte {
    /// A SMPTE time of zero at the given rates.
    pub fn new(smpte_rate: SmpteRate, sample_rate: SampleRate) -> Self {
        Self {
            smpte_rate,
            sample_rate,
            sample_number: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            frames: 0,
            sub_frames: 0,
        }
    }

    pub fn smpte_rate(&self) -> SmpteRate {
        self.smpte_rate
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Changes the frame rate, reinterpreting the current sample number.
    pub fn set_smpte_rate(&mut self, rate: SmpteRate) {
        self.smpte_rate = rate;
        self.sample_to_time();
    }

    /// Changes the sample rate, reinterpreting the current sample number.
    pub fn set_sample_rate(&mut self, rate: SampleRate) {
        self.sample_rate = rate;
        self.sample_to_time();
    }

    pub fn sample_number(&self) -> u64 {
        self.sample_number
    }

    /// Sets the time from an audio sample count.
    pub fn set_sample_number(&mut self, n: u64) {
        self.sample_number = n;
        self.sample_to_time();
    }

    /// Sets the time from the field tuple.
    pub fn set_time(&mut self, hours: u8, minutes: u8, seconds: u8, frames: u8, sub_frames: u8) {
        self.hours = hours;
        self.minutes = minutes;
        self.seconds = seconds;
        self.frames = frames;
        self.sub_frames = sub_frames;
        self.time_to_sample();
    }

    /// Sets the time from milliseconds.
    pub fn set_milliseconds(&mut self, msecs: u64) {
        self.sample_number = (msecs as f64 * self.sample_rate.frequency() / 1000.0) as u64;
        self.sample_to_time();
    }

    pub fn milliseconds(&self) -> u64 {
        (self.sample_number as f64 * 1000.0 / self.sample_rate.frequency()) as u64
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    pub fn frames(&self) -> u8 {
        self.frames
    }

    /// Hundredths of a frame.
    pub fn sub_frames(&self) -> u8 {
        self.sub_frames
    }

    /// Moves the time by a signed number of samples, saturating at zero.
    pub fn add_samples(&mut self, n: i64) {
        let moved = self.sample_number as i64 + n;
        self.sample_number = moved.max(0) as u64;
        self.sample_to_time();
    }

    pub fn add_hours(&mut self, h: i32) {
        self.add_samples((h as f64 * self.sample_rate.frequency() * 3600.0) as i64);
    }

    pub fn add_minutes(&mut self, m: i32) {
        self.add_samples((m as f64 * self.sample_rate.frequency() * 60.0) as i64);
    }

    pub fn add_seconds(&mut self, s: i32) {
        self.add_samples((s as f64 * self.sample_rate.frequency()) as i64);
    }

    pub fn add_frames(&mut self, f: i32) {
        let samples_per_frame = self.sample_rate.frequency() / self.smpte_rate.frequency();
        self.add_samples((f as f64 * samples_per_frame) as i64);
    }

    pub fn add_sub_frames(&mut self, sf: i32) {
        let samples_per_frame = self.sample_rate.frequency() / self.smpte_rate.frequency();
        self.add_samples((sf as f64 * samples_per_frame / 100.0) as i64);
    }

    /// Frame labels skipped per non-tenth minute; drop-frame rates always label 30 frames per
    /// second, so a labeled minute holds 1798 actual frames and a ten-minute block 17982.
    const DF_FRAMES_PER_MINUTE: u64 = 1798;
    const DF_FRAMES_PER_TEN_MINUTES: u64 = 17982;

    /// Recomputes the field tuple from the sample number.
    fn sample_to_time(&mut self) {
        let the_smpte_rate = self.smpte_rate.frequency();
        let the_sample_rate = self.sample_rate.frequency();
        let max_frame = self.smpte_rate.max_frames() as u64;

        // integer count of elapsed frames, with hundredths
        let rounded_sub_frames =
            (self.sample_number as f64 * the_smpte_rate * 100.0 / the_sample_rate + 0.5) as u64;
        self.sub_frames = (rounded_sub_frames % 100) as u8;
        let mut frame_number = rounded_sub_frames / 100;

        if self.smpte_rate.is_drop_frame() {
            // renumber: each labeled minute, except every tenth, skips labels 0 and 1
            let ten_blocks = frame_number / Self::DF_FRAMES_PER_TEN_MINUTES;
            let remainder = frame_number % Self::DF_FRAMES_PER_TEN_MINUTES;
            frame_number += 18 * ten_blocks;
            if remainder >= 2 {
                frame_number += 2 * ((remainder - 2) / Self::DF_FRAMES_PER_MINUTE);
            }
        }

        self.frames = (frame_number % max_frame) as u8;
        self.seconds = ((frame_number / max_frame) % 60) as u8;
        self.minutes = ((frame_number / (60 * max_frame)) % 60) as u8;
        self.hours = ((frame_number / (60 * 60 * max_frame)) % 24) as u8;
    }

    /// Recomputes the sample number from the field tuple.
    fn time_to_sample(&mut self) {
        let the_smpte_rate = self.smpte_rate.frequency();
        let the_sample_rate = self.sample_rate.frequency();
        let max_frame = self.smpte_rate.max_frames() as u64;
        let samples_per_frame = the_sample_rate / the_smpte_rate;

        let total_seconds =
            self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64;
        let mut frame_number = total_seconds * max_frame + self.frames as u64;

        if self.smpte_rate.is_drop_frame() {
            let total_minutes = self.hours as u64 * 60 + self.minutes as u64;
            frame_number -= 2 * (total_minutes - total_minutes / 10);
        }

        self.sample_number = ((frame_number as f64 + self.sub_frames as f64 / 100.0)
            * samples_per_frame
            + 0.5) as u64;
    }
}

impl Display for Smpte {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}.{:02}",
            self.hours,
            self.minutes,
            self.seconds,
            if self.smpte_rate.is_drop_frame() { ';' } else { ':' },
            self.frames,
            self.sub_frames
        )
    }
}

impl PartialEq for Smpte {
    fn eq(&self, other: &Self) -> bool {
        self.sample_number == other.sample_number
    }
}

impl Eq for Smpte {}

impl PartialOrd for Smpte {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Smpte {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sample_number.cmp(&other.sample_number)
    }
}
