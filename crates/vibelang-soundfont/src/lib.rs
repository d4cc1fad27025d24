//! Soundfont loading for VibeLang.
//!
//! This crate turns soundfont containers into a single in-memory model that a
//! sample-playback engine can use directly:
//!
//! - **Binary** fonts (RIFF `sfbk`, "SF2") with embedded 16-bit sample data.
//! - **Text** fonts ("SFZ") with `<group>`/`<region>` headers and external
//!   sample files.
//!
//! Both are flattened into [`Region`]s grouped into [`Preset`]s. A [`Sound`]
//! owns the parsed model together with the decoded samples.
//!
//! # Example
//!
//! ```no_run
//! use vibelang_soundfont::{LoadOptions, PcmDecoder, Sound};
//!
//! let sound = Sound::load_file("piano.sfz", &LoadOptions::default(), &mut PcmDecoder::new())?;
//! for diagnostic in sound.diagnostics() {
//!     eprintln!("{}", diagnostic);
//! }
//! let layers = sound.matching_regions(0, 60, 100).map(|m| m.count());
//! # Ok::<(), vibelang_soundfont::LoadError>(())
//! ```

pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod parser;
pub mod region_matcher;
pub mod sample_store;
pub mod sound;
pub mod units;

pub use decoder::{DecodeRequest, DecodedSample, PcmDecoder, SampleDecoder};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{LoadError, ParseError, ParseErrorKind, SampleLoadError, SampleLoadErrorKind};
pub use model::{
    EnvelopeParams, FontFormat, LoopMode, MidiRange, OffMode, Preset, Region, RegionId,
    SampleEncoding, SampleRef, SampleRefId, TriggerMode, Waveform,
};
pub use parser::{detect_format, parse, parse_bytes, ParseOptions, ParsedFont};
pub use region_matcher::{find_matching_regions, regions_for_event, RegionMatches, TriggerEvent};
pub use sample_store::{Sample, SampleHandle, SampleStore};
pub use sound::{LoadOptions, Sound};
