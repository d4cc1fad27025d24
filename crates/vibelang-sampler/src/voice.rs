//! One sounding instance of a region.
//!
//! A voice reads its sample at a fractional position, wraps around the loop
//! points, and applies its envelope, gain and pan. It never allocates; all
//! state lives in the pre-allocated voice slot.

use std::f32::consts::FRAC_PI_4;

use vibelang_soundfont::units::{semitones_to_ratio, velocity_gain};
use vibelang_soundfont::{LoopMode, OffMode, Region, RegionId, Sample, TriggerMode};

use crate::config::Interpolation;
use crate::envelope::{EnvelopeGenerator, EnvelopeStage};

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 4-point cubic Hermite through `x1` and `x2`.
#[inline]
fn hermite(x0: f32, x1: f32, x2: f32, x3: f32, t: f32) -> f32 {
    let c1 = 0.5 * (x2 - x0);
    let c2 = x0 - 2.5 * x1 + 2.0 * x2 - 0.5 * x3;
    let c3 = 0.5 * (x3 - x0) + 1.5 * (x1 - x2);
    ((c3 * t + c2) * t + c1) * t + x1
}

/// Playback state of one voice slot.
#[derive(Debug, Clone)]
pub struct Voice {
    active: bool,
    region: RegionId,
    note: u8,
    velocity: u8,
    trigger: TriggerMode,
    loop_mode: LoopMode,
    loop_start: f64,
    loop_end: f64,
    end: f64,
    /// Fractional frame position in the sample.
    position: f64,
    pitch_ratio: f64,
    source_rate: f64,
    /// Frames advanced per output frame.
    step: f64,
    stereo: bool,
    gain_left: f32,
    gain_right: f32,
    envelope: EnvelopeGenerator,
    /// Note-off (or a tailed stop) has been received.
    released: bool,
    exclusive_class: Option<u32>,
    off_by: Option<u32>,
    off_mode: OffMode,
    /// Allocation order, used to find the oldest voice.
    pub(crate) started_at: u64,
    /// The note-on event that started this voice.
    pub(crate) batch: u64,
}

/// Exclusive end frame of `region` within `sample`.
fn playable_end(region: &Region, sample: &Sample) -> u32 {
    let frames = sample.frames() as u32;
    region.end.map_or(frames, |end| end.min(frames))
}

impl Voice {
    /// An idle voice slot.
    pub fn new(output_rate: u32) -> Self {
        Self {
            active: false,
            region: RegionId(0),
            note: 0,
            velocity: 0,
            trigger: TriggerMode::Attack,
            loop_mode: LoopMode::NoLoop,
            loop_start: 0.0,
            loop_end: 0.0,
            end: 0.0,
            position: 0.0,
            pitch_ratio: 1.0,
            source_rate: f64::from(output_rate),
            step: 1.0,
            stereo: false,
            gain_left: 0.0,
            gain_right: 0.0,
            envelope: EnvelopeGenerator::new(output_rate),
            released: false,
            exclusive_class: None,
            off_by: None,
            off_mode: OffMode::Fast,
            started_at: 0,
            batch: 0,
        }
    }

    /// True if `region` has frames to play in `sample`: the offset lies before
    /// the effective end.
    pub fn can_play(region: &Region, sample: &Sample) -> bool {
        region.offset < playable_end(region, sample)
    }

    /// Start playing `region` with `sample`.
    ///
    /// Returns false, leaving the voice untouched, when the region has nothing
    /// to play (empty sample or an offset past the end).
    pub fn start(
        &mut self,
        id: RegionId,
        region: &Region,
        sample: &Sample,
        note: u8,
        velocity: u8,
        output_rate: u32,
    ) -> bool {
        if !Self::can_play(region, sample) {
            return false;
        }
        let end = playable_end(region, sample);

        let native = sample.native_loop;
        let mut loop_mode = region.loop_mode.unwrap_or(if native.is_some() {
            LoopMode::Continuous
        } else {
            LoopMode::NoLoop
        });
        let loop_start = region.loop_start.or(native.map(|l| l.0)).unwrap_or(0);
        let loop_end = region
            .loop_end
            .or(native.map(|l| l.1))
            .unwrap_or(end)
            .min(end);
        if matches!(loop_mode, LoopMode::Continuous | LoopMode::Sustain) && loop_start >= loop_end {
            loop_mode = LoopMode::NoLoop;
        }

        let semitones = (f64::from(note) - f64::from(region.root_key)) * f64::from(region.pitch_keytrack)
            / 100.0
            + f64::from(region.coarse_tune)
            + f64::from(region.fine_tune) / 100.0;

        let gain = region.gain * velocity_gain(velocity, region.amp_veltrack);
        let pan = region.pan.clamp(-1.0, 1.0);
        let stereo = sample.channels >= 2;
        let (pan_left, pan_right) = if stereo {
            ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
        } else {
            let angle = (pan + 1.0) * FRAC_PI_4;
            (angle.cos(), angle.sin())
        };

        self.active = true;
        self.region = id;
        self.note = note;
        self.velocity = velocity;
        self.trigger = region.trigger;
        self.loop_mode = loop_mode;
        self.loop_start = f64::from(loop_start);
        self.loop_end = f64::from(loop_end);
        self.end = f64::from(end);
        self.position = f64::from(region.offset);
        self.pitch_ratio = semitones_to_ratio(semitones);
        self.source_rate = f64::from(sample.sample_rate);
        self.step = self.pitch_ratio * self.source_rate / f64::from(output_rate.max(1));
        self.stereo = stereo;
        self.gain_left = gain * pan_left;
        self.gain_right = gain * pan_right;
        self.released = false;
        self.exclusive_class = region.exclusive_class;
        self.off_by = region.off_by;
        self.off_mode = region.off_mode;
        self.envelope.set_sample_rate(output_rate);
        self.envelope.trigger(&region.amp_env);
        true
    }

    /// Stop the voice. With `allow_tail` it enters its release stage,
    /// otherwise it is silenced immediately.
    pub fn stop(&mut self, allow_tail: bool) {
        if !self.active {
            return;
        }
        if allow_tail {
            self.released = true;
            self.envelope.release();
        } else {
            self.active = false;
            self.envelope.kill();
        }
    }

    /// Handle the note-off for this voice's key. One-shot voices ignore it.
    ///
    /// Returns true if the voice started releasing.
    pub fn note_off(&mut self) -> bool {
        if !self.active || self.released || self.loop_mode == LoopMode::OneShot {
            return false;
        }
        self.stop(true);
        true
    }

    /// React to a choke group this voice is `off_by`.
    pub fn choke(&mut self) {
        match self.off_mode {
            OffMode::Fast => self.stop(false),
            OffMode::Normal => self.stop(true),
        }
    }

    /// Recompute the pitch step and envelope rates for a new output rate.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        self.step = self.pitch_ratio * self.source_rate / f64::from(output_rate.max(1));
        self.envelope.set_sample_rate(output_rate);
    }

    /// Add this voice's output to `left` and `right`.
    ///
    /// `sample` must be the sample the voice was started with.
    pub fn render(
        &mut self,
        sample: &Sample,
        interpolation: Interpolation,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        for (out_left, out_right) in left.iter_mut().zip(right.iter_mut()) {
            if !self.active {
                break;
            }
            let amp = self.envelope.next_level();
            let (value_left, value_right) = self.read(sample, interpolation);
            *out_left += value_left * amp * self.gain_left;
            *out_right += value_right * amp * self.gain_right;

            if self.envelope.is_idle() {
                self.active = false;
                break;
            }
            self.advance();
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.position += self.step;
        if self.is_looping() {
            if self.position >= self.loop_end {
                let length = self.loop_end - self.loop_start;
                self.position = self.loop_start + (self.position - self.loop_start) % length;
            }
        } else if self.position >= self.end {
            self.active = false;
        }
    }

    #[inline]
    fn is_looping(&self) -> bool {
        match self.loop_mode {
            LoopMode::Continuous => true,
            LoopMode::Sustain => !self.released,
            LoopMode::NoLoop | LoopMode::OneShot => false,
        }
    }

    /// Frame `index` of `channel`, following the loop seam. Past the end reads 0.
    #[inline]
    fn frame(&self, sample: &Sample, index: i64, channel: usize) -> f32 {
        let mut index = index.max(0);
        if self.is_looping() && index as f64 >= self.loop_end {
            index -= (self.loop_end - self.loop_start) as i64;
        }
        if index as f64 >= self.end {
            return 0.0;
        }
        sample.value(index as usize, channel)
    }

    #[inline]
    fn read_channel(&self, sample: &Sample, interpolation: Interpolation, channel: usize) -> f32 {
        let index = self.position.floor() as i64;
        let frac = (self.position - self.position.floor()) as f32;
        match interpolation {
            Interpolation::Linear => lerp(
                self.frame(sample, index, channel),
                self.frame(sample, index + 1, channel),
                frac,
            ),
            Interpolation::Cubic => hermite(
                self.frame(sample, index - 1, channel),
                self.frame(sample, index, channel),
                self.frame(sample, index + 1, channel),
                self.frame(sample, index + 2, channel),
                frac,
            ),
        }
    }

    #[inline]
    fn read(&self, sample: &Sample, interpolation: Interpolation) -> (f32, f32) {
        let left = self.read_channel(sample, interpolation, 0);
        if self.stereo {
            (left, self.read_channel(sample, interpolation, 1))
        } else {
            (left, left)
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True once note-off was received or the envelope is releasing.
    pub fn is_released(&self) -> bool {
        self.released || self.envelope.is_releasing()
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn trigger(&self) -> TriggerMode {
        self.trigger
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn exclusive_class(&self) -> Option<u32> {
        self.exclusive_class
    }

    pub fn off_by(&self) -> Option<u32> {
        self.off_by
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.envelope.stage()
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }
}
