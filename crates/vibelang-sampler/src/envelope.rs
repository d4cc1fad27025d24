//! Per-voice amplitude envelope.
//!
//! A linear DAHDSR state machine:
//!
//! ```text
//! Idle -> Delay -> Attack -> Hold -> Decay -> Sustain -> Release -> Idle
//! ```
//!
//! Zero-length Delay and Hold stages are skipped. Attack, Decay and Sustain are
//! always visited for at least one frame, even with zero times. Release ramps
//! down from whatever level was current when it started.

use vibelang_soundfont::EnvelopeParams;

/// Level below which a releasing envelope is considered silent.
pub const SILENCE_THRESHOLD: f32 = 1e-4;

/// Envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

/// Amplitude envelope state machine.
///
/// Stage times are converted to per-frame increments for the current sample
/// rate; [`EnvelopeGenerator::set_sample_rate`] recomputes them.
#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    params: EnvelopeParams,
    sample_rate: f32,
    stage: EnvelopeStage,
    level: f32,
    /// Frames left in Delay or Hold.
    remaining: f32,
    attack_step: f32,
    decay_step: f32,
    release_step: f32,
}

impl EnvelopeGenerator {
    pub fn new(sample_rate: u32) -> Self {
        let mut env = Self {
            params: EnvelopeParams::default(),
            sample_rate: sample_rate.max(1) as f32,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            remaining: 0.0,
            attack_step: 1.0,
            decay_step: 1.0,
            release_step: 1.0,
        };
        env.recompute_steps();
        env
    }

    /// Start the envelope from silence with new parameters.
    pub fn trigger(&mut self, params: &EnvelopeParams) {
        self.params = *params;
        self.params.sustain = self.params.sustain.clamp(0.0, 1.0);
        self.recompute_steps();
        self.level = 0.0;
        self.remaining = self.frames(self.params.delay);
        self.stage = if self.remaining > 0.0 {
            EnvelopeStage::Delay
        } else {
            EnvelopeStage::Attack
        };
    }

    /// Enter Release from the current level. No-op when idle or releasing.
    pub fn release(&mut self) {
        if !matches!(self.stage, EnvelopeStage::Idle | EnvelopeStage::Release) {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Silence immediately.
    pub fn kill(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    /// Change the sample rate, keeping the current stage and level.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1) as f32;
        self.remaining *= sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        self.recompute_steps();
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    /// Advance one frame and return the level for that frame.
    #[inline]
    pub fn next_level(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Delay => {
                self.level = 0.0;
                self.remaining -= 1.0;
                if self.remaining <= 0.0 {
                    self.stage = EnvelopeStage::Attack;
                }
            }
            EnvelopeStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.remaining = self.frames(self.params.hold);
                    self.stage = if self.remaining > 0.0 {
                        EnvelopeStage::Hold
                    } else {
                        EnvelopeStage::Decay
                    };
                }
            }
            EnvelopeStage::Hold => {
                self.remaining -= 1.0;
                if self.remaining <= 0.0 {
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.params.sustain {
                    self.level = self.params.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.params.sustain;
                // A silent sustain would hold the voice forever.
                if self.level < SILENCE_THRESHOLD {
                    self.kill();
                }
            }
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= SILENCE_THRESHOLD {
                    self.kill();
                }
            }
        }
        self.level
    }

    fn frames(&self, seconds: f32) -> f32 {
        (seconds.max(0.0) * self.sample_rate).round()
    }

    fn recompute_steps(&mut self) {
        // A full-range ramp over at least one frame.
        let step = |seconds: f32| 1.0 / (seconds.max(0.0) * self.sample_rate).max(1.0);
        self.attack_step = step(self.params.attack);
        self.decay_step = step(self.params.decay);
        self.release_step = step(self.params.release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(attack: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeParams {
        EnvelopeParams {
            delay: 0.0,
            attack,
            hold: 0.0,
            decay,
            sustain,
            release,
        }
    }

    /// Run `frames` frames and append each new stage to `visited`.
    fn run(env: &mut EnvelopeGenerator, frames: usize, visited: &mut Vec<EnvelopeStage>) {
        for _ in 0..frames {
            env.next_level();
            if visited.last() != Some(&env.stage()) {
                visited.push(env.stage());
            }
        }
    }

    #[test]
    fn test_stage_order_for_held_then_released_note() {
        let mut env = EnvelopeGenerator::new(1000);
        env.trigger(&params(0.01, 0.01, 0.5, 0.01));
        let mut visited = vec![env.stage()];
        run(&mut env, 100, &mut visited);
        env.release();
        visited.push(env.stage());
        run(&mut env, 100, &mut visited);
        assert_eq!(
            visited,
            vec![
                EnvelopeStage::Attack,
                EnvelopeStage::Decay,
                EnvelopeStage::Sustain,
                EnvelopeStage::Release,
                EnvelopeStage::Idle,
            ]
        );
    }

    #[test]
    fn test_zero_times_still_visit_every_stage() {
        let mut env = EnvelopeGenerator::new(44100);
        env.trigger(&params(0.0, 0.0, 0.5, 0.0));
        assert_eq!(env.stage(), EnvelopeStage::Attack);
        assert_eq!(env.next_level(), 1.0);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        assert_eq!(env.next_level(), 0.5);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert_eq!(env.next_level(), 0.5);
        env.release();
        env.next_level();
        assert!(env.is_idle());
    }

    #[test]
    fn test_delay_and_hold() {
        let mut env = EnvelopeGenerator::new(100);
        env.trigger(&EnvelopeParams {
            delay: 0.03,
            attack: 0.0,
            hold: 0.02,
            decay: 0.0,
            sustain: 0.25,
            release: 0.0,
        });
        let levels: Vec<f32> = (0..7).map(|_| env.next_level()).collect();
        assert_eq!(levels, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.25]);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
    }

    #[test]
    fn test_linear_attack_ramp() {
        let mut env = EnvelopeGenerator::new(100);
        env.trigger(&params(0.04, 0.0, 1.0, 0.1));
        let levels: Vec<f32> = (0..4).map(|_| env.next_level()).collect();
        for (got, want) in levels.iter().zip([0.25, 0.5, 0.75, 1.0]) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_release_starts_from_current_level() {
        let mut env = EnvelopeGenerator::new(100);
        env.trigger(&params(0.1, 0.0, 1.0, 0.1));
        for _ in 0..5 {
            env.next_level();
        }
        let before = env.level();
        assert!((before - 0.5).abs() < 1e-6);
        env.release();
        let after = env.next_level();
        assert!(after < before);
        assert!((before - after - 0.1).abs() < 1e-6);
        // 0.5 at 0.1 per frame reaches silence after four more frames.
        for _ in 0..4 {
            env.next_level();
        }
        assert!(env.is_idle());
    }

    #[test]
    fn test_set_sample_rate_recomputes_steps() {
        let mut env = EnvelopeGenerator::new(100);
        env.trigger(&params(0.1, 0.0, 1.0, 0.1));
        env.set_sample_rate(200);
        let first = env.next_level();
        assert!((first - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_release_when_idle_is_noop() {
        let mut env = EnvelopeGenerator::new(44100);
        env.release();
        assert!(env.is_idle());
        assert_eq!(env.next_level(), 0.0);
    }

    #[test]
    fn test_silent_sustain_ends() {
        let mut env = EnvelopeGenerator::new(100);
        env.trigger(&params(0.0, 0.0, 0.0, 1.0));
        let mut visited = vec![env.stage()];
        run(&mut env, 4, &mut visited);
        assert_eq!(
            visited,
            vec![
                EnvelopeStage::Attack,
                EnvelopeStage::Decay,
                EnvelopeStage::Sustain,
                EnvelopeStage::Idle,
            ]
        );
    }
}
