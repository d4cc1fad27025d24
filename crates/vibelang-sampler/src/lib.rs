//! Real-time sample-playback engine for VibeLang soundfonts.
//!
//! The engine plays a loaded [`vibelang_soundfont::Sound`]: note events pick
//! regions from the active preset, each region starts a [`Voice`] from a
//! fixed pool, and [`Synth::render_block`] mixes the pool into stereo audio.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vibelang_sampler::{SamplerConfig, Synth};
//! use vibelang_soundfont::{LoadOptions, PcmDecoder, Sound};
//!
//! let sound = Sound::load_file("piano.sf2", &LoadOptions::default(), &mut PcmDecoder::new())?;
//! let (mut synth, handle) = Synth::new(Arc::new(sound), SamplerConfig::default())?;
//!
//! // Control thread
//! handle.note_on(60, 100)?;
//!
//! // Audio thread
//! let mut block = vec![0.0f32; 2 * 256];
//! synth.render_block(&mut block);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocator;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod preset;
pub mod synth;
pub mod voice;

pub use allocator::VoicePool;
pub use config::{Interpolation, SamplerConfig};
pub use envelope::{EnvelopeGenerator, EnvelopeStage};
pub use error::{ConfigError, Result, SynthError};
pub use events::{SynthEvent, SynthHandle};
pub use preset::PresetManager;
pub use synth::Synth;
pub use voice::Voice;
