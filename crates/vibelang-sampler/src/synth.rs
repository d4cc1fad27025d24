//! The sampler engine.
//!
//! [`Synth`] resolves note events through the active preset into voice
//! starts, and mixes the voice pool into stereo blocks. It can be driven
//! directly, or from another thread through a [`SynthHandle`]; queued events
//! are applied at the start of the next block.
//!
//! `render_block` and `render_block_planar` do not allocate, lock or log.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use vibelang_soundfont::{Diagnostics, Sound, TriggerEvent};

use crate::allocator::VoicePool;
use crate::config::SamplerConfig;
use crate::error::{Result, SynthError};
use crate::events::{self, check_note, check_velocity, EventInbox, SynthEvent, SynthHandle};
use crate::preset::PresetManager;

const NOTES: usize = 128;

#[derive(Debug)]
pub struct Synth {
    config: SamplerConfig,
    sample_rate: u32,
    presets: PresetManager,
    pool: VoicePool,
    inbox: EventInbox,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
    held: [bool; NOTES],
    held_count: usize,
    /// Velocity of the last note-on per key, for release triggers.
    note_velocity: [u8; NOTES],
}

impl Synth {
    /// Create an engine playing `sound`, and the handle that feeds it.
    pub fn new(sound: Arc<Sound>, config: SamplerConfig) -> Result<(Self, SynthHandle)> {
        config.validate()?;
        let (handle, inbox) = events::channel(config.event_queue_capacity, sound.preset_count());
        log::debug!(
            "Starting sampler: {} voices at {} Hz, preset '{}'",
            config.polyphony,
            config.sample_rate,
            sound.preset_name(0).unwrap_or("-")
        );
        let synth = Self {
            sample_rate: config.sample_rate,
            presets: PresetManager::new(sound),
            pool: VoicePool::new(config.polyphony, config.sample_rate),
            inbox,
            scratch_left: vec![0.0; config.max_block_frames],
            scratch_right: vec![0.0; config.max_block_frames],
            held: [false; NOTES],
            held_count: 0,
            note_velocity: [0; NOTES],
            config,
        };
        Ok((synth, handle))
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the output rate. Active voices keep playing at the right pitch.
    pub fn set_sample_rate(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(SynthError::InvalidEventParameter {
                parameter: "sample_rate",
                value: 0,
            });
        }
        self.sample_rate = hz;
        self.pool.set_output_rate(hz);
        Ok(())
    }

    /// Start every region of the active preset that matches. Velocity 0 is
    /// a note-off.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> Result<()> {
        check_note(note)?;
        check_velocity(velocity)?;
        if velocity == 0 {
            return self.note_off(note);
        }

        let key = usize::from(note);
        let keys_held = self.held_count > usize::from(self.held[key]);
        if !self.held[key] {
            self.held[key] = true;
            self.held_count += 1;
        }
        self.note_velocity[key] = velocity;
        self.start_voices(note, velocity, TriggerEvent::NoteOn { keys_held });
        Ok(())
    }

    /// Release every voice on `note` and start its release-triggered regions.
    pub fn note_off(&mut self, note: u8) -> Result<()> {
        check_note(note)?;
        let key = usize::from(note);
        let was_held = self.held[key];
        if was_held {
            self.held[key] = false;
            self.held_count -= 1;
        }
        self.pool.release_note(note);
        if was_held {
            self.start_voices(note, self.note_velocity[key], TriggerEvent::NoteOff);
        }
        Ok(())
    }

    /// Stop every voice, with release tails unless `immediate`.
    pub fn all_notes_off(&mut self, immediate: bool) {
        self.pool.stop_all(!immediate);
        self.held = [false; NOTES];
        self.held_count = 0;
    }

    fn start_voices(&mut self, note: u8, velocity: u8, event: TriggerEvent) {
        let Some(matches) = self.presets.matching(note, velocity, event) else {
            return;
        };
        let sound = self.presets.sound();
        self.pool.begin_batch();
        for (id, region) in matches {
            // Regions whose sample failed to load stay silent.
            if let Some(sample) = sound.region_sample(region) {
                self.pool
                    .start(id, region, sample, note, velocity, self.sample_rate);
            }
        }
    }

    pub fn select_preset(&mut self, index: usize) -> Result<()> {
        self.presets.select_preset(index)
    }

    /// Select a preset by bank and program. Returns its index.
    pub fn select_program(&mut self, bank: u16, program: u16) -> Result<usize> {
        self.presets.select_program(bank, program)
    }

    pub fn active_preset(&self) -> usize {
        self.presets.active_index()
    }

    pub fn preset_count(&self) -> usize {
        self.presets.preset_count()
    }

    pub fn preset_name(&self, index: usize) -> Option<&str> {
        self.presets.preset_name(index)
    }

    pub fn sound(&self) -> &Arc<Sound> {
        self.presets.sound()
    }

    /// Replace the container. Every voice stops immediately; the old
    /// container is returned.
    pub fn swap_sound(&mut self, sound: Arc<Sound>) -> Arc<Sound> {
        self.all_notes_off(true);
        self.inbox
            .preset_count
            .store(sound.preset_count(), Ordering::Release);
        self.presets.replace_sound(sound)
    }

    /// Parse/load diagnostics of the playing container.
    pub fn diagnostics(&self) -> &Diagnostics {
        self.presets.sound().diagnostics()
    }

    /// Apply all queued events. Returns how many were applied.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.inbox.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: SynthEvent) {
        // Handles validate before queueing; anything stale is ignored.
        match event {
            SynthEvent::NoteOn { note, velocity } => {
                let _ = self.note_on(note, velocity);
            }
            SynthEvent::NoteOff { note } => {
                let _ = self.note_off(note);
            }
            SynthEvent::AllNotesOff { immediate } => self.all_notes_off(immediate),
            SynthEvent::SelectPreset(index) => {
                let _ = self.select_preset(index);
            }
            SynthEvent::SelectProgram { bank, program } => {
                let _ = self.select_program(bank, program);
            }
            SynthEvent::SwapSound(sound) => {
                let old = self.swap_sound(sound);
                // Full or disconnected: nobody collects, so it drops here.
                let _ = self.inbox.retired.try_send(old);
            }
        }
    }

    /// Render interleaved stereo frames into `out` (`L R L R ...`).
    ///
    /// Queued events are applied first. A trailing odd sample is zeroed.
    pub fn render_block(&mut self, out: &mut [f32]) {
        self.process_events();
        out.fill(0.0);

        let frames = out.len() / 2;
        let gain = self.config.master_gain;
        let mut done = 0;
        while done < frames {
            let count = (frames - done).min(self.scratch_left.len());
            let left = &mut self.scratch_left[..count];
            let right = &mut self.scratch_right[..count];
            left.fill(0.0);
            right.fill(0.0);
            self.pool
                .render(self.presets.sound(), self.config.interpolation, left, right);

            for ((frame, l), r) in out[done * 2..(done + count) * 2]
                .chunks_exact_mut(2)
                .zip(left.iter())
                .zip(right.iter())
            {
                frame[0] = l * gain;
                frame[1] = r * gain;
            }
            done += count;
        }
    }

    /// Render planar stereo. Renders `min(left.len(), right.len())` frames;
    /// the rest of the longer buffer is zeroed.
    pub fn render_block_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.process_events();
        left.fill(0.0);
        right.fill(0.0);

        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);
        self.pool
            .render(self.presets.sound(), self.config.interpolation, left, right);

        let gain = self.config.master_gain;
        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample *= gain;
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Voice requests that found no free or stealable slot.
    pub fn dropped_voice_count(&self) -> u64 {
        self.pool.dropped_count()
    }

    /// One line per active voice. Not a stable format.
    pub fn voice_debug_string(&self) -> String {
        let mut out = String::new();
        for (slot, voice) in self.pool.active() {
            let _ = writeln!(
                out,
                "[{}] note {} vel {} region {} {:?} level {:.3} pos {:.2}{}",
                slot,
                voice.note(),
                voice.velocity(),
                voice.region().0,
                voice.envelope_stage(),
                voice.envelope_level(),
                voice.position(),
                if voice.is_released() { " released" } else { "" }
            );
        }
        out
    }
}
