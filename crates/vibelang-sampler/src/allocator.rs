//! Fixed-capacity voice pool.
//!
//! All voice slots are allocated up front. When a note-on needs a slot and
//! none is free, a voice is stolen:
//!
//! 1. the oldest voice that is already releasing, else
//! 2. the oldest voice overall.
//!
//! Voices started by the same note-on event (the current *batch*) are never
//! stolen, so a layered note cannot cut off its own layers. A request that
//! finds no slot at all is counted as dropped.

use vibelang_soundfont::{Region, RegionId, Sample, Sound};

use crate::config::Interpolation;
use crate::voice::Voice;

#[derive(Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    /// Monotonic start counter for age comparisons.
    clock: u64,
    batch: u64,
    dropped: u64,
}

impl VoicePool {
    pub fn new(capacity: usize, output_rate: u32) -> Self {
        Self {
            voices: (0..capacity.max(1)).map(|_| Voice::new(output_rate)).collect(),
            clock: 0,
            batch: 0,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Open a new event batch. Voices started until the next call belong to it.
    pub fn begin_batch(&mut self) -> u64 {
        self.batch += 1;
        self.batch
    }

    /// Start a voice for `region`, choking its exclusive class and stealing a
    /// slot if needed. Returns the slot index.
    ///
    /// A region with nothing to play in `sample` starts nothing and leaves
    /// every running voice alone.
    pub fn start(
        &mut self,
        id: RegionId,
        region: &Region,
        sample: &Sample,
        note: u8,
        velocity: u8,
        output_rate: u32,
    ) -> Option<usize> {
        if !Voice::can_play(region, sample) {
            return None;
        }
        if let Some(class) = region.exclusive_class {
            self.choke(class);
        }

        let Some(slot) = self.find_slot() else {
            self.dropped += 1;
            return None;
        };

        let voice = &mut self.voices[slot];
        if !voice.start(id, region, sample, note, velocity, output_rate) {
            return None;
        }
        self.clock += 1;
        voice.started_at = self.clock;
        voice.batch = self.batch;
        Some(slot)
    }

    fn find_slot(&self) -> Option<usize> {
        if let Some(free) = self.voices.iter().position(|v| !v.is_active()) {
            return Some(free);
        }

        let batch = self.batch;
        let voices = &self.voices;
        let stealable = move || {
            voices
                .iter()
                .enumerate()
                .filter(move |(_, v)| v.batch != batch)
        };
        stealable()
            .filter(|(_, v)| v.is_released())
            .min_by_key(|(_, v)| v.started_at)
            .or_else(|| stealable().min_by_key(|(_, v)| v.started_at))
            .map(|(slot, _)| slot)
    }

    /// Silence every voice that is `off_by` `class`, except voices of the
    /// current batch. Returns how many were choked.
    pub fn choke(&mut self, class: u32) -> usize {
        let batch = self.batch;
        let mut choked = 0;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.is_active() && v.batch != batch && v.off_by() == Some(class))
        {
            voice.choke();
            choked += 1;
        }
        choked
    }

    /// Release every voice playing `note`. Returns how many started releasing.
    pub fn release_note(&mut self, note: u8) -> usize {
        self.voices
            .iter_mut()
            .filter(|v| v.is_active() && v.note() == note)
            .map(|v| v.note_off())
            .filter(|released| *released)
            .count()
    }

    /// Stop every active voice.
    pub fn stop_all(&mut self, allow_tail: bool) {
        for voice in self.voices.iter_mut() {
            voice.stop(allow_tail);
        }
    }

    pub fn set_output_rate(&mut self, output_rate: u32) {
        for voice in self.voices.iter_mut() {
            voice.set_output_rate(output_rate);
        }
    }

    /// Mix all active voices into `left` and `right`. Voices whose envelope
    /// finished are returned to the pool.
    pub fn render(&mut self, sound: &Sound, interpolation: Interpolation, left: &mut [f32], right: &mut [f32]) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            let sample = sound
                .region(voice.region())
                .and_then(|region| sound.region_sample(region));
            match sample {
                Some(sample) => voice.render(sample, interpolation, left, right),
                None => voice.stop(false),
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Voice requests that found no slot.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Active voices with their slot index.
    pub fn active(&self) -> impl Iterator<Item = (usize, &Voice)> {
        self.voices.iter().enumerate().filter(|(_, v)| v.is_active())
    }
}
