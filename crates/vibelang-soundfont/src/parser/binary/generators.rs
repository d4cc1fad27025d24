//! Generator sets and their conversion into regions.

use crate::model::{LoopMode, MidiRange, OffMode, Region, SampleRefId};
use crate::units::{centibels_to_amp, timecents_to_seconds};

use super::hydra::SampleHeader;

/// Generator operators this parser understands.
pub mod id {
    pub const START_ADDRS_OFFSET: u16 = 0;
    pub const END_ADDRS_OFFSET: u16 = 1;
    pub const STARTLOOP_ADDRS_OFFSET: u16 = 2;
    pub const ENDLOOP_ADDRS_OFFSET: u16 = 3;
    pub const START_ADDRS_COARSE_OFFSET: u16 = 4;
    pub const END_ADDRS_COARSE_OFFSET: u16 = 12;
    pub const PAN: u16 = 17;
    pub const DELAY_VOL_ENV: u16 = 33;
    pub const ATTACK_VOL_ENV: u16 = 34;
    pub const HOLD_VOL_ENV: u16 = 35;
    pub const DECAY_VOL_ENV: u16 = 36;
    pub const SUSTAIN_VOL_ENV: u16 = 37;
    pub const RELEASE_VOL_ENV: u16 = 38;
    pub const INSTRUMENT: u16 = 41;
    pub const KEY_RANGE: u16 = 43;
    pub const VEL_RANGE: u16 = 44;
    pub const STARTLOOP_ADDRS_COARSE_OFFSET: u16 = 45;
    pub const INITIAL_ATTENUATION: u16 = 48;
    pub const ENDLOOP_ADDRS_COARSE_OFFSET: u16 = 50;
    pub const COARSE_TUNE: u16 = 51;
    pub const FINE_TUNE: u16 = 52;
    pub const SAMPLE_ID: u16 = 53;
    pub const SAMPLE_MODES: u16 = 54;
    pub const SCALE_TUNING: u16 = 56;
    pub const EXCLUSIVE_CLASS: u16 = 57;
    pub const OVERRIDING_ROOT_KEY: u16 = 58;
    /// Highest operator defined by the format (endOper is 60).
    pub const LAST_DEFINED: u16 = 60;
}

/// Generators that only make sense inside an instrument. They are ignored at
/// preset level.
const INSTRUMENT_ONLY: &[u16] = &[
    id::START_ADDRS_OFFSET,
    id::END_ADDRS_OFFSET,
    id::STARTLOOP_ADDRS_OFFSET,
    id::ENDLOOP_ADDRS_OFFSET,
    id::START_ADDRS_COARSE_OFFSET,
    id::END_ADDRS_COARSE_OFFSET,
    id::STARTLOOP_ADDRS_COARSE_OFFSET,
    id::ENDLOOP_ADDRS_COARSE_OFFSET,
    id::SAMPLE_ID,
    id::SAMPLE_MODES,
    id::EXCLUSIVE_CLASS,
    id::OVERRIDING_ROOT_KEY,
];

pub fn is_instrument_only(oper: u16) -> bool {
    INSTRUMENT_ONLY.contains(&oper)
}

/// The generators of one zone, with its validated key/velocity ranges.
///
/// Hashable so identical preset-level modifiers can be recognized when
/// deciding whether two presets may share a region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GeneratorSet {
    /// Sorted by operator, one entry per operator.
    values: Vec<(u16, i16)>,
    pub keys: Option<MidiRange>,
    pub velocities: Option<MidiRange>,
}

impl GeneratorSet {
    pub fn set(&mut self, oper: u16, value: i16) {
        match self.values.binary_search_by_key(&oper, |(o, _)| *o) {
            Ok(i) => self.values[i].1 = value,
            Err(i) => self.values.insert(i, (oper, value)),
        }
    }

    pub fn get(&self, oper: u16) -> Option<i16> {
        self.values
            .binary_search_by_key(&oper, |(o, _)| *o)
            .ok()
            .map(|i| self.values[i].1)
    }

    /// Unsigned reading of a generator (indices such as instrument and sampleID).
    pub fn index(&self, oper: u16) -> Option<usize> {
        self.get(oper).map(|v| usize::from(v as u16))
    }

    /// Copy of `self` with every generator in `local` overriding it.
    pub fn merged(&self, local: &GeneratorSet) -> GeneratorSet {
        let mut merged = self.clone();
        for (oper, value) in &local.values {
            merged.set(*oper, *value);
        }
        if local.keys.is_some() {
            merged.keys = local.keys;
        }
        if local.velocities.is_some() {
            merged.velocities = local.velocities;
        }
        merged
    }

    pub fn without(&self, oper: u16) -> GeneratorSet {
        let mut copy = self.clone();
        copy.values.retain(|(o, _)| *o != oper);
        copy
    }
}

/// Instrument value plus preset modifier, both in the generator's own units.
fn summed(instrument: &GeneratorSet, preset: &GeneratorSet, oper: u16, default: i32) -> i32 {
    instrument.get(oper).map(i32::from).unwrap_or(default) + preset.get(oper).map(i32::from).unwrap_or(0)
}

fn address(instrument: &GeneratorSet, fine: u16, coarse: u16) -> i64 {
    i64::from(instrument.get(fine).unwrap_or(0)) + 32768 * i64::from(instrument.get(coarse).unwrap_or(0))
}

fn to_frame(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Build the region for one instrument zone under one set of preset modifiers.
///
/// `keys` and `velocities` are the already-intersected ranges.
pub fn build_region(
    instrument: &GeneratorSet,
    preset: &GeneratorSet,
    header: &SampleHeader,
    sample: SampleRefId,
    keys: MidiRange,
    velocities: MidiRange,
) -> Region {
    let mut region = Region::new(sample);
    region.keys = keys;
    region.velocities = velocities;

    region.root_key = match instrument.get(id::OVERRIDING_ROOT_KEY) {
        Some(key @ 0..=127) => key as u8,
        _ if header.original_pitch <= 127 => header.original_pitch,
        _ => 60,
    };
    region.coarse_tune = summed(instrument, preset, id::COARSE_TUNE, 0);
    region.fine_tune =
        summed(instrument, preset, id::FINE_TUNE, 0) as f32 + f32::from(header.pitch_correction);
    region.pitch_keytrack = summed(instrument, preset, id::SCALE_TUNING, 100) as f32;

    let attenuation = summed(instrument, preset, id::INITIAL_ATTENUATION, 0).max(0);
    region.gain = centibels_to_amp(attenuation as f32);
    region.pan = (summed(instrument, preset, id::PAN, 0) as f32 / 500.0).clamp(-1.0, 1.0);

    let env = &mut region.amp_env;
    env.delay = timecents_to_seconds(summed(instrument, preset, id::DELAY_VOL_ENV, -12000));
    env.attack = timecents_to_seconds(summed(instrument, preset, id::ATTACK_VOL_ENV, -12000));
    env.hold = timecents_to_seconds(summed(instrument, preset, id::HOLD_VOL_ENV, -12000));
    env.decay = timecents_to_seconds(summed(instrument, preset, id::DECAY_VOL_ENV, -12000));
    env.release = timecents_to_seconds(summed(instrument, preset, id::RELEASE_VOL_ENV, -12000));
    // Sustain is an attenuation below peak; 144 dB and beyond is silence.
    let sustain_cb = summed(instrument, preset, id::SUSTAIN_VOL_ENV, 0).clamp(0, 1440);
    env.sustain = if sustain_cb >= 1440 {
        0.0
    } else {
        centibels_to_amp(sustain_cb as f32)
    };

    region.loop_mode = Some(match instrument.get(id::SAMPLE_MODES).unwrap_or(0) & 3 {
        1 => LoopMode::Continuous,
        3 => LoopMode::Sustain,
        _ => LoopMode::NoLoop,
    });

    if let Some(class) = instrument.get(id::EXCLUSIVE_CLASS).filter(|c| *c > 0) {
        region.exclusive_class = Some(class as u32);
        region.off_by = Some(class as u32);
        region.off_mode = OffMode::Fast;
    }

    // Address offsets, relative to the sample header's start.
    let length = i64::from(header.end.saturating_sub(header.start));
    let start = address(instrument, id::START_ADDRS_OFFSET, id::START_ADDRS_COARSE_OFFSET);
    let end = address(instrument, id::END_ADDRS_OFFSET, id::END_ADDRS_COARSE_OFFSET);
    let loop_start = address(
        instrument,
        id::STARTLOOP_ADDRS_OFFSET,
        id::STARTLOOP_ADDRS_COARSE_OFFSET,
    );
    let loop_end = address(
        instrument,
        id::ENDLOOP_ADDRS_OFFSET,
        id::ENDLOOP_ADDRS_COARSE_OFFSET,
    );

    region.offset = to_frame(start);
    if end != 0 {
        region.end = Some(to_frame(length + end));
    }
    let native_loop_start = i64::from(header.loop_start.saturating_sub(header.start));
    let native_loop_end = i64::from(header.loop_end.saturating_sub(header.start));
    if loop_start != 0 {
        region.loop_start = Some(to_frame(native_loop_start + loop_start));
    }
    if loop_end != 0 {
        region.loop_end = Some(to_frame(native_loop_end + loop_end));
    }

    region
}
