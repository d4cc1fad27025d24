//! Unified region/preset model shared by the SF2 and SFZ parsers.
//!
//! Both container formats are flattened into the same shape:
//!
//! - a flat list of [`Region`]s (one sample-playback rule each),
//! - a list of [`Preset`]s that reference regions by [`RegionId`],
//! - a list of [`SampleRef`]s that regions reference by [`SampleRefId`].
//!
//! Everything here is immutable once parsing has finished.

use std::fmt;
use std::path::PathBuf;

use crate::error::{ParseError, ParseErrorKind};

/// Which container format a font was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFormat {
    /// Binary RIFF `sfbk` container.
    Sf2,
    /// Text directive container.
    Sfz,
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sf2 => f.write_str("SF2"),
            Self::Sfz => f.write_str("SFZ"),
        }
    }
}

/// Index of a region inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a sample reference inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleRefId(pub u32);

impl SampleRefId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An inclusive MIDI value range (keys or velocities).
///
/// Always well-ordered and within 0-127; construction through [`MidiRange::new`]
/// rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiRange {
    low: u8,
    high: u8,
}

impl MidiRange {
    /// The full 0-127 range used when a format leaves a range unspecified.
    pub const FULL: MidiRange = MidiRange { low: 0, high: 127 };

    /// Create a range, rejecting values above 127 and `low > high`.
    ///
    /// `offset` is only used to locate the error.
    pub fn new(low: i32, high: i32, offset: usize) -> Result<Self, ParseError> {
        if !(0..=127).contains(&low) || !(0..=127).contains(&high) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidRange,
                offset,
                format!("range {}-{} is outside 0-127", low, high),
            ));
        }
        if low > high {
            return Err(ParseError::new(
                ParseErrorKind::InvalidRange,
                offset,
                format!("range {}-{} is not well-ordered", low, high),
            ));
        }
        Ok(Self {
            low: low as u8,
            high: high as u8,
        })
    }

    /// A range covering exactly one value.
    pub fn single(value: u8) -> Self {
        let value = value.min(127);
        Self {
            low: value,
            high: value,
        }
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    /// Inclusive membership test. Values above 127 never match.
    pub fn contains(&self, value: u8) -> bool {
        value >= self.low && value <= self.high
    }

    /// Intersection of two ranges, `None` if they do not overlap.
    pub fn intersect(&self, other: &MidiRange) -> Option<MidiRange> {
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        (low <= high).then_some(MidiRange { low, high })
    }
}

impl Default for MidiRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for MidiRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// How a region's sample loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopMode {
    /// Play to the end once. Note-off releases normally.
    NoLoop,
    /// Play to the end once and ignore note-off.
    OneShot,
    /// Loop between the loop points for as long as the voice sounds.
    Continuous,
    /// Loop until note-off, then continue to the sample end.
    Sustain,
}

/// Which event starts a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    /// Every note-on.
    #[default]
    Attack,
    /// Note-off, using the velocity of the matching note-on.
    Release,
    /// Note-on while no other key is held.
    First,
    /// Note-on while another key is held.
    Legato,
}

/// How a voice reacts when its choke group is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OffMode {
    /// Stop immediately.
    #[default]
    Fast,
    /// Enter the release stage.
    Normal,
}

/// Amplitude envelope parameters.
///
/// Times are in seconds, `sustain` is a linear level in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            delay: 0.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.001,
        }
    }
}

/// One sample-playback rule.
///
/// Loop and end points are frame indices relative to the start of the sample.
/// `loop_end` and `end` are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// The sample this region plays.
    pub sample: SampleRefId,
    pub keys: MidiRange,
    pub velocities: MidiRange,
    /// Key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Transposition in semitones.
    pub coarse_tune: i32,
    /// Fine tuning in cents.
    pub fine_tune: f32,
    /// Pitch change per key in cents (100 = chromatic).
    pub pitch_keytrack: f32,
    pub trigger: TriggerMode,
    /// `None` means "loop if the sample carries native loop points".
    pub loop_mode: Option<LoopMode>,
    /// Overrides the sample's native loop start.
    pub loop_start: Option<u32>,
    /// Overrides the sample's native loop end.
    pub loop_end: Option<u32>,
    /// First frame to play.
    pub offset: u32,
    /// Playback end, `None` for the sample end.
    pub end: Option<u32>,
    /// Linear amplitude.
    pub gain: f32,
    /// Stereo position, -1 (left) to 1 (right).
    pub pan: f32,
    /// Velocity sensitivity, 0 (none) to 1 (full square-law).
    pub amp_veltrack: f32,
    pub amp_env: EnvelopeParams,
    /// Choke group this region belongs to.
    pub exclusive_class: Option<u32>,
    /// Choke group that silences this region when one of its regions starts.
    pub off_by: Option<u32>,
    pub off_mode: OffMode,
}

impl Region {
    /// A region covering the full key and velocity range with neutral settings.
    pub fn new(sample: SampleRefId) -> Self {
        Self {
            sample,
            keys: MidiRange::FULL,
            velocities: MidiRange::FULL,
            root_key: 60,
            coarse_tune: 0,
            fine_tune: 0.0,
            pitch_keytrack: 100.0,
            trigger: TriggerMode::Attack,
            loop_mode: None,
            loop_start: None,
            loop_end: None,
            offset: 0,
            end: None,
            gain: 1.0,
            pan: 0.0,
            amp_veltrack: 1.0,
            amp_env: EnvelopeParams::default(),
            exclusive_class: None,
            off_by: None,
            off_mode: OffMode::Fast,
        }
    }

    /// True if the region plays for this note and velocity.
    pub fn matches(&self, note: u8, velocity: u8) -> bool {
        self.keys.contains(note) && self.velocities.contains(velocity)
    }
}

/// A named, selectable collection of regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub bank: u16,
    pub program: u16,
    /// Regions in declaration order. Several presets may share a region.
    pub regions: Vec<RegionId>,
}

/// Encoding of sample data embedded in a binary container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Little-endian signed 16-bit PCM.
    Pcm16,
    /// Ogg Vorbis compressed payload.
    Vorbis,
    /// Data lives in a sound ROM that is not part of the file.
    Rom,
}

/// Built-in generated waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
    Silence,
}

/// Where a sample's audio comes from.
///
/// Two regions with equal references share one materialized sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampleRef {
    /// An external audio file.
    File { path: PathBuf },
    /// A frame range of the container's own sample data.
    Embedded {
        name: String,
        /// First frame (inclusive) in the sample data chunk.
        start: u32,
        /// Last frame (exclusive) in the sample data chunk.
        end: u32,
        /// Native loop start relative to `start`.
        loop_start: u32,
        /// Native loop end (exclusive) relative to `start`.
        loop_end: u32,
        sample_rate: u32,
        encoding: SampleEncoding,
    },
    /// Audio synthesized by the store.
    Generated(Waveform),
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "{}", path.display()),
            Self::Embedded { name, .. } => write!(f, "{}", name),
            Self::Generated(Waveform::Sine) => f.write_str("*sine"),
            Self::Generated(Waveform::Silence) => f.write_str("*silence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_range_rejects_inverted() {
        let err = MidiRange::new(64, 10, 5).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidRange);
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_midi_range_rejects_out_of_bounds() {
        assert!(MidiRange::new(0, 128, 0).is_err());
        assert!(MidiRange::new(-1, 10, 0).is_err());
    }

    #[test]
    fn test_midi_range_contains_is_inclusive() {
        let range = MidiRange::new(10, 20, 0).unwrap();
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
        assert!(!MidiRange::FULL.contains(128));
    }

    #[test]
    fn test_midi_range_intersect() {
        let a = MidiRange::new(0, 60, 0).unwrap();
        let b = MidiRange::new(40, 127, 0).unwrap();
        assert_eq!(a.intersect(&b), Some(MidiRange::new(40, 60, 0).unwrap()));

        let c = MidiRange::new(61, 70, 0).unwrap();
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_region_matches() {
        let mut region = Region::new(SampleRefId(0));
        region.keys = MidiRange::new(60, 62, 0).unwrap();
        region.velocities = MidiRange::new(1, 100, 0).unwrap();
        assert!(region.matches(61, 50));
        assert!(!region.matches(61, 101));
        assert!(!region.matches(63, 50));
    }
}
