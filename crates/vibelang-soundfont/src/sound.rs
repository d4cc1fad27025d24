//! A loaded soundfont: regions, presets and their sample data.
//!
//! Loading is the only slow, allocating step. It parses the container, then
//! materializes every referenced sample. Samples that fail to load are
//! recorded as diagnostics and their regions become unplayable; the rest of
//! the container stays usable.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use crate::decoder::SampleDecoder;
use crate::diagnostics::Diagnostics;
use crate::error::LoadError;
use crate::model::{FontFormat, Preset, Region, RegionId, SampleRef};
use crate::parser::{self, ParseOptions, ParsedFont};
use crate::region_matcher::{find_matching_regions, regions_for_event, RegionMatches, TriggerEvent};
use crate::sample_store::{ByteSource, Sample, SampleHandle, SampleSources, SampleStore};

/// Options for [`Sound::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Force a container format instead of detecting it.
    pub format: Option<FontFormat>,
    /// Fail the load on the first invalid key/velocity range.
    pub strict: bool,
    /// Name for containers that do not carry one.
    pub name: Option<String>,
    /// Directory that relative sample paths resolve against.
    pub base_dir: Option<PathBuf>,
}

impl LoadOptions {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            format: self.format,
            strict: self.strict,
            name: self.name.clone(),
        }
    }
}

/// Everything parsed and loaded from one container.
///
/// Immutable once built; an engine swaps whole `Sound`s rather than editing one.
#[derive(Debug)]
pub struct Sound {
    name: String,
    format: FontFormat,
    regions: Vec<Region>,
    presets: Vec<Preset>,
    sample_refs: Vec<SampleRef>,
    store: SampleStore,
    /// Materialized sample for each entry of `sample_refs`.
    resolved: Vec<Option<SampleHandle>>,
    diagnostics: Diagnostics,
}

impl Sound {
    /// Parse a container and load all of its samples.
    pub fn load<R: Read + Seek>(
        source: &mut R,
        options: &LoadOptions,
        decoder: &mut dyn SampleDecoder,
    ) -> Result<Sound, LoadError> {
        let parsed = parser::parse(source, &options.parse_options())?;
        Ok(Self::from_parsed(
            parsed,
            Some(source),
            options.base_dir.as_deref(),
            decoder,
        ))
    }

    /// Load a container from disk. Sample paths resolve against the file's
    /// directory and the file stem names containers that carry no name.
    pub fn load_file(
        path: impl AsRef<Path>,
        options: &LoadOptions,
        decoder: &mut dyn SampleDecoder,
    ) -> Result<Sound, LoadError> {
        let path = path.as_ref();
        let mut options = options.clone();
        if options.base_dir.is_none() {
            options.base_dir = path.parent().map(Path::to_path_buf);
        }
        if options.name.is_none() {
            options.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }

        log::debug!("Loading soundfont from {}", path.display());
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader, &options, decoder)
    }

    /// Materialize the samples of an already parsed container.
    pub fn from_parsed<'a>(
        parsed: ParsedFont,
        container: Option<&'a mut dyn ByteSource>,
        base_dir: Option<&'a Path>,
        decoder: &'a mut dyn SampleDecoder,
    ) -> Sound {
        let ParsedFont {
            name,
            format,
            regions,
            presets,
            samples: sample_refs,
            sample_data,
            mut diagnostics,
        } = parsed;

        let mut store = SampleStore::with_sample_data(sample_data);
        let mut sources = SampleSources {
            decoder,
            container,
            base_dir,
        };

        let mut resolved = Vec::with_capacity(sample_refs.len());
        let mut failed = 0;
        for (index, sample) in sample_refs.iter().enumerate() {
            match store.materialize(sample, &mut sources) {
                Ok(handle) => resolved.push(Some(handle)),
                Err(e) => {
                    let affected = regions
                        .iter()
                        .filter(|r| r.sample.index() == index)
                        .count();
                    diagnostics.sample_failed(&e, affected);
                    resolved.push(None);
                    failed += 1;
                }
            }
        }

        log::info!(
            "Loaded {} '{}': {} presets, {} regions, {} samples ({} failed), {} diagnostics",
            format,
            name,
            presets.len(),
            regions.len(),
            sample_refs.len(),
            failed,
            diagnostics.len()
        );

        Sound {
            name,
            format,
            regions,
            presets,
            sample_refs,
            store,
            resolved,
            diagnostics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> FontFormat {
        self.format
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.index())
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn preset(&self, index: usize) -> Option<&Preset> {
        self.presets.get(index)
    }

    pub fn preset_count(&self) -> usize {
        self.presets.len()
    }

    pub fn preset_name(&self, index: usize) -> Option<&str> {
        self.presets.get(index).map(|p| p.name.as_str())
    }

    /// Index of the first preset with this bank and program.
    pub fn find_preset(&self, bank: u16, program: u16) -> Option<usize> {
        self.presets
            .iter()
            .position(|p| p.bank == bank && p.program == program)
    }

    pub fn sample_refs(&self) -> &[SampleRef] {
        &self.sample_refs
    }

    /// Number of materialized sample buffers.
    pub fn loaded_sample_count(&self) -> usize {
        self.store.len()
    }

    /// The sample a region plays, or `None` if it failed to load.
    pub fn region_sample(&self, region: &Region) -> Option<&Sample> {
        let handle = (*self.resolved.get(region.sample.index())?)?;
        self.store.get(handle)
    }

    pub fn is_playable(&self, id: RegionId) -> bool {
        self.region(id)
            .and_then(|region| self.region_sample(region))
            .is_some()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// All regions of preset `preset` whose ranges contain the note and velocity.
    pub fn matching_regions(&self, preset: usize, note: u8, velocity: u8) -> Option<RegionMatches<'_>> {
        let preset = self.presets.get(preset)?;
        Some(find_matching_regions(&self.regions, preset, note, velocity))
    }

    /// Matching regions that start on `event`.
    pub fn regions_for_event(
        &self,
        preset: usize,
        note: u8,
        velocity: u8,
        event: TriggerEvent,
    ) -> Option<RegionMatches<'_>> {
        let preset = self.presets.get(preset)?;
        Some(regions_for_event(&self.regions, preset, note, velocity, event))
    }

    /// Release all sample buffers. Every region becomes unplayable.
    pub fn unload_samples(&mut self) {
        self.store.unload();
        self.resolved.iter_mut().for_each(|r| *r = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PcmDecoder;
    use crate::diagnostics::DiagnosticKind;
    use crate::error::{ParseErrorKind, SampleLoadErrorKind};
    use crate::parser::binary::generators::id;
    use crate::parser::binary::test_font::{range, Sf2Builder};
    use std::io::Cursor;

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_sfz_file_with_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("samples")).unwrap();
        write_wav(&dir.path().join("samples/good.wav"), &[0, 1000, 2000, 3000]);
        let sfz_path = dir.path().join("kit.sfz");
        std::fs::write(
            &sfz_path,
            "<control> default_path=samples/\n\
             <region> sample=good.wav key=36\n\
             <region> sample=missing.wav key=37\n\
             <region> sample=missing.wav key=38\n\
             <region> sample=good.wav key=39\n",
        )
        .unwrap();

        let sound = Sound::load_file(&sfz_path, &LoadOptions::default(), &mut PcmDecoder::new()).unwrap();
        assert_eq!(sound.name(), "kit");
        assert_eq!(sound.format(), FontFormat::Sfz);
        assert_eq!(sound.regions().len(), 4);
        assert_eq!(sound.sample_refs().len(), 2);
        assert_eq!(sound.loaded_sample_count(), 1);

        assert!(sound.is_playable(RegionId(0)));
        assert!(!sound.is_playable(RegionId(1)));
        assert!(!sound.is_playable(RegionId(2)));
        assert!(sound.is_playable(RegionId(3)));

        let failures: Vec<_> = sound
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::SampleLoad(SampleLoadErrorKind::MissingReference))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("2 region(s) unplayable"));
    }

    #[test]
    fn test_load_sf2_from_memory() {
        let mut builder = Sf2Builder::new("Memory Font");
        let s = builder.sample("tone", vec![0, 8192, 16384, 8192, 0, -8192], (1, 5), 60);
        let inst = builder.instrument(
            "I",
            vec![vec![(id::KEY_RANGE, range(0, 127)), (id::SAMPLE_MODES, 1), (id::SAMPLE_ID, s)]],
        );
        builder.simple_preset("Lead", 5, inst);
        let mut cursor = Cursor::new(builder.build());

        let sound = Sound::load(&mut cursor, &LoadOptions::default(), &mut PcmDecoder::new()).unwrap();
        assert_eq!(sound.name(), "Memory Font");
        assert_eq!(sound.preset_count(), 1);
        assert_eq!(sound.preset_name(0), Some("Lead"));
        assert_eq!(sound.find_preset(0, 5), Some(0));
        assert_eq!(sound.find_preset(1, 5), None);

        let region = &sound.regions()[0];
        let sample = sound.region_sample(region).unwrap();
        assert_eq!(sample.frames(), 6);
        assert_eq!(sample.native_loop, Some((1, 5)));
        assert!((sample.data[2] - 0.5).abs() < 1e-6);
        assert!(sound.diagnostics().is_empty());
    }

    #[test]
    fn test_matching_regions_through_sound() {
        let mut cursor = Cursor::new(b"<region> sample=*sine lokey=60 hikey=72 <region> sample=*sine key=60".to_vec());
        let sound = Sound::load(&mut cursor, &LoadOptions::default(), &mut PcmDecoder::new()).unwrap();
        assert_eq!(sound.matching_regions(0, 60, 100).map(|m| m.count()), Some(2));
        assert_eq!(sound.matching_regions(0, 61, 100).map(|m| m.count()), Some(1));
        assert_eq!(sound.matching_regions(0, 128, 100).map(|m| m.count()), Some(0));
        assert!(sound.matching_regions(1, 60, 100).is_none());
    }

    #[test]
    fn test_malformed_container_fails_whole_load() {
        let mut cursor = Cursor::new(b"RIFF\x04\x00\x00\x00sfbk".to_vec());
        let err = Sound::load(&mut cursor, &LoadOptions::default(), &mut PcmDecoder::new()).unwrap_err();
        assert_eq!(
            err.as_parse_error().map(|e| e.kind),
            Some(ParseErrorKind::MalformedChunk)
        );
    }

    #[test]
    fn test_from_parsed_reads_embedded_samples() {
        let mut builder = Sf2Builder::new("Split");
        let s = builder.sample("tone", vec![0, 16384, 0, -16384], (0, 4), 60);
        let inst = builder.instrument("I", vec![vec![(id::SAMPLE_ID, s)]]);
        builder.simple_preset("P", 0, inst);
        let mut cursor = Cursor::new(builder.build());

        let parsed = crate::parser::parse(&mut cursor, &ParseOptions::default()).unwrap();
        let mut decoder = PcmDecoder::new();
        let dir = tempfile::tempdir().unwrap();
        let sound = Sound::from_parsed(parsed, Some(&mut cursor), Some(dir.path()), &mut decoder);
        assert_eq!(sound.loaded_sample_count(), 1);
        assert!(sound.is_playable(RegionId(0)));

        let parsed = crate::parser::parse(&mut cursor, &ParseOptions::default()).unwrap();
        let sound = Sound::from_parsed(parsed, None, None, &mut decoder);
        assert_eq!(sound.loaded_sample_count(), 0);
        assert!(!sound.is_playable(RegionId(0)));
    }

    #[test]
    fn test_unload_samples() {
        let mut cursor = Cursor::new(b"<region> sample=*sine".to_vec());
        let mut sound = Sound::load(&mut cursor, &LoadOptions::default(), &mut PcmDecoder::new()).unwrap();
        assert!(sound.is_playable(RegionId(0)));
        sound.unload_samples();
        assert!(!sound.is_playable(RegionId(0)));
        assert_eq!(sound.loaded_sample_count(), 0);
    }
}
