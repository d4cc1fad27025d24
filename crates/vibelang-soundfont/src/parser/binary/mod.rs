//! Binary (SF2) container parser.
//!
//! A binary font is a RIFF `sfbk` form with three lists:
//!
//! ```text
//! RIFF sfbk
//!   LIST INFO   ifil, INAM, ...
//!   LIST sdta   smpl (16-bit PCM), optional sm24
//!   LIST pdta   phdr pbag pmod pgen inst ibag imod igen shdr
//! ```
//!
//! Presets point at instruments through zones; instruments point at samples
//! through zones. Both levels may start with a global zone whose generators
//! apply to every other zone of the same preset or instrument. Flattening
//! produces one [`Region`] per (instrument zone, preset modifiers) pair.
//!
//! Sample data is not read here. The `smpl` location is recorded so samples can
//! be materialized later straight from the source.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::diagnostics::{Diagnostics, Severity};
use crate::error::{LoadError, ParseError, ParseErrorKind};
use crate::model::{
    FontFormat, MidiRange, Preset, Region, RegionId, SampleEncoding, SampleRef, SampleRefId,
};
use crate::parser::{ParseOptions, ParsedFont, SampleDataChunk};

pub mod generators;
pub mod hydra;
pub mod riff;
#[cfg(test)]
pub(crate) mod test_font;

use generators::{id, GeneratorSet};
use hydra::{Bag, GeneratorRecord, Hydra, SAMPLE_TYPE_ROM, SAMPLE_TYPE_VORBIS};
use riff::{fixed_string, io_error, read_body, read_children, read_chunk_header, read_fourcc, read_list_type, Chunk};

/// Parse a binary container.
pub fn parse<R: Read + Seek>(
    source: &mut R,
    options: &ParseOptions,
) -> Result<ParsedFont, LoadError> {
    let file_len = source.seek(SeekFrom::End(0))?;
    let riff = read_chunk_header(source, 0, file_len)?;
    if &riff.id != b"RIFF" {
        return Err(ParseError::malformed(0, "missing RIFF header").into());
    }
    let form = read_fourcc(source).map_err(|e| io_error(e, 8, "the form type"))?;
    if &form != b"sfbk" {
        return Err(ParseError::malformed(8, "RIFF form is not 'sfbk'").into());
    }

    let mut diagnostics = Diagnostics::new();
    let mut info_name = None;
    let mut sample_data = None;
    let mut hydra = None;

    for chunk in read_children(source, 12, riff.end())? {
        if &chunk.id != b"LIST" {
            diagnostics.warn(
                ParseErrorKind::UnknownOpcode,
                chunk.offset(),
                format!("unexpected top-level chunk '{}' ignored", chunk.name()),
            );
            continue;
        }
        match &read_list_type(source, &chunk)? {
            b"INFO" => info_name = read_info(source, &chunk)?,
            b"sdta" => sample_data = read_sdta(source, &chunk, &mut diagnostics)?,
            b"pdta" => hydra = Some(hydra::read_hydra(source, &chunk)?),
            other => diagnostics.warn(
                ParseErrorKind::UnknownOpcode,
                chunk.offset(),
                format!("unknown LIST '{}' ignored", String::from_utf8_lossy(other)),
            ),
        }
    }

    let hydra = hydra.ok_or_else(|| ParseError::malformed(12, "no pdta list"))?;
    if sample_data.is_none() {
        diagnostics.warn(
            ParseErrorKind::MalformedChunk,
            12,
            "no smpl chunk; embedded samples will not load",
        );
    }

    let name = info_name
        .or_else(|| options.name.clone())
        .unwrap_or_else(|| "default".to_string());
    let mut font = ParsedFont::new(name, FontFormat::Sf2);
    font.sample_data = sample_data;
    font.diagnostics = diagnostics;

    let mut flattener = Flattener {
        hydra: &hydra,
        strict: options.strict,
        font,
        sample_ids: HashMap::new(),
        shared: HashMap::new(),
        reported: HashSet::new(),
    };
    flattener.run()?;
    let font = flattener.font;

    log::debug!(
        "Parsed SF2 '{}': {} presets, {} regions, {} samples, {} modulators ignored",
        font.name,
        font.presets.len(),
        font.regions.len(),
        font.samples.len(),
        hydra.modulator_count
    );
    Ok(font)
}

fn read_info<R: Read + Seek>(source: &mut R, list: &Chunk) -> Result<Option<String>, LoadError> {
    let mut name = None;
    for chunk in read_children(source, list.data_offset + 4, list.end())? {
        match &chunk.id {
            b"INAM" => name = Some(fixed_string(&read_body(source, &chunk)?)),
            b"ifil" if chunk.size >= 4 => {
                source.seek(SeekFrom::Start(chunk.data_offset))?;
                let major = source
                    .read_u16::<LittleEndian>()
                    .map_err(|e| io_error(e, chunk.data_offset, "ifil"))?;
                let minor = source
                    .read_u16::<LittleEndian>()
                    .map_err(|e| io_error(e, chunk.data_offset, "ifil"))?;
                log::debug!("SF2 version {}.{:02}", major, minor);
            }
            _ => {}
        }
    }
    Ok(name.filter(|n| !n.is_empty()))
}

fn read_sdta<R: Read + Seek>(
    source: &mut R,
    list: &Chunk,
    diagnostics: &mut Diagnostics,
) -> Result<Option<SampleDataChunk>, LoadError> {
    let mut data = None;
    for chunk in read_children(source, list.data_offset + 4, list.end())? {
        match &chunk.id {
            b"smpl" => {
                data = Some(SampleDataChunk {
                    offset: chunk.data_offset,
                    len: u64::from(chunk.size),
                })
            }
            b"sm24" => diagnostics.warn(
                ParseErrorKind::UnknownOpcode,
                chunk.offset(),
                "24-bit sample extension ignored, playing 16-bit data",
            ),
            _ => {}
        }
    }
    Ok(data)
}

/// Walks presets → instruments → samples and emits regions.
struct Flattener<'h> {
    hydra: &'h Hydra,
    strict: bool,
    font: ParsedFont,
    sample_ids: HashMap<usize, SampleRefId>,
    /// Instrument bag index and preset modifiers → region already emitted.
    shared: HashMap<(usize, GeneratorSet), RegionId>,
    reported: HashSet<u16>,
}

impl<'h> Flattener<'h> {
    fn run(&mut self) -> Result<(), ParseError> {
        let hydra = self.hydra;
        let count = hydra.presets.len().saturating_sub(1);
        for index in 0..count {
            let header = &hydra.presets[index];
            let bags = bag_range(
                &hydra.preset_bags,
                header.bag_index,
                hydra.presets[index + 1].bag_index,
                header.offset,
                "preset",
            )?;

            let mut global = GeneratorSet::default();
            let mut regions = Vec::new();
            for (position, bag) in bags.enumerate() {
                let gens = generator_range(
                    &hydra.preset_bags,
                    bag,
                    &hydra.preset_generators,
                    header.offset,
                )?;
                let Some(zone) = self.read_zone(&hydra.preset_generators[gens], true)? else {
                    continue;
                };
                match zone.index(id::INSTRUMENT) {
                    Some(instrument) => {
                        let modifiers = global.merged(&zone).without(id::INSTRUMENT);
                        self.instrument_regions(instrument, &modifiers, header.offset, &mut regions)?;
                    }
                    None if position == 0 => global = zone,
                    None => {}
                }
            }

            self.font.presets.push(Preset {
                name: header.name.clone(),
                bank: header.bank,
                program: header.program,
                regions,
            });
        }
        Ok(())
    }

    /// Collect a zone's generators. Returns `None` when the zone is dropped
    /// for an invalid range in lenient mode.
    fn read_zone(
        &mut self,
        records: &[GeneratorRecord],
        preset_level: bool,
    ) -> Result<Option<GeneratorSet>, ParseError> {
        let mut zone = GeneratorSet::default();
        for record in records {
            match record.oper {
                id::KEY_RANGE | id::VEL_RANGE => {
                    let [low, high] = record.amount;
                    let range = match MidiRange::new(i32::from(low), i32::from(high), record.offset) {
                        Ok(range) => range,
                        Err(e) if !self.strict => {
                            self.font.diagnostics.parse(Severity::Error, e);
                            return Ok(None);
                        }
                        Err(e) => return Err(e),
                    };
                    if record.oper == id::KEY_RANGE {
                        zone.keys = Some(range);
                    } else {
                        zone.velocities = Some(range);
                    }
                }
                oper if oper > id::LAST_DEFINED => {
                    if self.reported.insert(oper) {
                        self.font.diagnostics.warn(
                            ParseErrorKind::UnknownOpcode,
                            record.offset,
                            format!("unknown generator {} ignored", oper),
                        );
                    }
                }
                oper if preset_level && generators::is_instrument_only(oper) => {}
                oper => zone.set(oper, i16::from_le_bytes(record.amount)),
            }
            // Nothing after the terminal generator belongs to the zone.
            if record.oper == id::INSTRUMENT || record.oper == id::SAMPLE_ID {
                break;
            }
        }
        Ok(Some(zone))
    }

    fn instrument_regions(
        &mut self,
        instrument: usize,
        modifiers: &GeneratorSet,
        preset_offset: usize,
        out: &mut Vec<RegionId>,
    ) -> Result<(), ParseError> {
        let hydra = self.hydra;
        if instrument + 1 >= hydra.instruments.len() {
            return Err(ParseError::malformed(
                preset_offset,
                format!("preset zone references missing instrument {}", instrument),
            ));
        }
        let header = &hydra.instruments[instrument];
        let bags = bag_range(
            &hydra.instrument_bags,
            header.bag_index,
            hydra.instruments[instrument + 1].bag_index,
            header.offset,
            "instrument",
        )?;

        let mut global = GeneratorSet::default();
        for (position, bag) in bags.enumerate() {
            if let Some(id) = self.shared.get(&(bag, modifiers.clone())) {
                out.push(*id);
                continue;
            }

            let gens = generator_range(
                &hydra.instrument_bags,
                bag,
                &hydra.instrument_generators,
                header.offset,
            )?;
            let Some(zone) = self.read_zone(&hydra.instrument_generators[gens], false)? else {
                continue;
            };
            let Some(sample_index) = zone.index(id::SAMPLE_ID) else {
                if position == 0 {
                    global = zone;
                }
                continue;
            };

            let zone = global.merged(&zone);
            let keys = zone.keys.unwrap_or(MidiRange::FULL);
            let velocities = zone.velocities.unwrap_or(MidiRange::FULL);
            let (Some(keys), Some(velocities)) = (
                keys.intersect(&modifiers.keys.unwrap_or(MidiRange::FULL)),
                velocities.intersect(&modifiers.velocities.unwrap_or(MidiRange::FULL)),
            ) else {
                continue;
            };

            if sample_index + 1 >= hydra.samples.len() {
                return Err(ParseError::malformed(
                    header.offset,
                    format!(
                        "instrument '{}' references missing sample {}",
                        header.name, sample_index
                    ),
                ));
            }
            let sample = self.intern_sample(sample_index);
            let region = generators::build_region(
                &zone,
                modifiers,
                &hydra.samples[sample_index],
                sample,
                keys,
                velocities,
            );
            let id = self.push_region(region);
            self.shared.insert((bag, modifiers.clone()), id);
            out.push(id);
        }
        Ok(())
    }

    fn push_region(&mut self, region: Region) -> RegionId {
        let id = RegionId(self.font.regions.len() as u32);
        self.font.regions.push(region);
        id
    }

    fn intern_sample(&mut self, index: usize) -> SampleRefId {
        if let Some(id) = self.sample_ids.get(&index) {
            return *id;
        }
        let header = &self.hydra.samples[index];
        let encoding = if header.sample_type & SAMPLE_TYPE_ROM != 0 {
            SampleEncoding::Rom
        } else if header.sample_type & SAMPLE_TYPE_VORBIS != 0 {
            SampleEncoding::Vorbis
        } else {
            SampleEncoding::Pcm16
        };
        let id = SampleRefId(self.font.samples.len() as u32);
        self.font.samples.push(SampleRef::Embedded {
            name: header.name.clone(),
            start: header.start,
            end: header.end,
            loop_start: header.loop_start.saturating_sub(header.start),
            loop_end: header.loop_end.saturating_sub(header.start),
            sample_rate: header.sample_rate,
            encoding,
        });
        self.sample_ids.insert(index, id);
        id
    }
}

/// Bag indices `[first, next)` of one preset or instrument. The bag list keeps
/// its terminal entry, so `next` must still index a bag.
fn bag_range(
    bags: &[Bag],
    first: u16,
    next: u16,
    offset: usize,
    owner: &str,
) -> Result<Range<usize>, ParseError> {
    let (first, next) = (usize::from(first), usize::from(next));
    if first > next || next >= bags.len() {
        return Err(ParseError::malformed(
            offset,
            format!("{} bag indices {}..{} are out of order or out of range", owner, first, next),
        ));
    }
    Ok(first..next)
}

/// Generator indices of bag `bag`.
fn generator_range(
    bags: &[Bag],
    bag: usize,
    generators: &[GeneratorRecord],
    offset: usize,
) -> Result<Range<usize>, ParseError> {
    let first = usize::from(bags[bag].generator_index);
    let next = usize::from(bags[bag + 1].generator_index);
    if first > next || next > generators.len() {
        return Err(ParseError::malformed(
            offset,
            format!("generator indices {}..{} are out of order or out of range", first, next),
        ));
    }
    Ok(first..next)
}

#[cfg(test)]
mod tests {
    use super::test_font::{range, Sf2Builder};
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::model::LoopMode;
    use std::io::Cursor;

    fn parse_font(bytes: Vec<u8>) -> Result<ParsedFont, LoadError> {
        parse(&mut Cursor::new(bytes), &ParseOptions::default())
    }

    fn piano() -> Sf2Builder {
        let mut builder = Sf2Builder::new("Test Font");
        let low = builder.sample("low", vec![0, 1000, 2000, 1000], (1, 3), 48);
        let high = builder.sample("high", vec![0, -1000, -2000, -1000], (1, 3), 72);
        let piano = builder.instrument(
            "Piano",
            vec![
                vec![(id::RELEASE_VOL_ENV, 0)],
                vec![(id::KEY_RANGE, range(0, 59)), (id::SAMPLE_ID, low)],
                vec![(id::KEY_RANGE, range(60, 127)), (id::SAMPLE_MODES, 1), (id::SAMPLE_ID, high)],
            ],
        );
        builder.simple_preset("Grand", 0, piano);
        builder.preset("Bright", 0, 1, vec![vec![(id::COARSE_TUNE, 12), (id::INSTRUMENT, piano)]]);
        builder.simple_preset("Grand Again", 2, piano);
        builder
    }

    #[test]
    fn test_flattens_presets_and_instruments() {
        let font = parse_font(piano().build()).unwrap();
        assert_eq!(font.name, "Test Font");
        assert_eq!(font.format, FontFormat::Sf2);
        assert_eq!(font.presets.len(), 3);
        assert_eq!(font.presets[1].name, "Bright");
        assert_eq!(font.presets[1].program, 1);
        assert_eq!(font.samples.len(), 2);
        assert!(font.sample_data.is_some());

        let grand = &font.presets[0];
        assert_eq!(grand.regions.len(), 2);
        let low = &font.regions[grand.regions[0].index()];
        assert_eq!(low.keys, MidiRange::new(0, 59, 0).unwrap());
        assert_eq!(low.root_key, 48);
        assert_eq!(low.loop_mode, Some(LoopMode::NoLoop));
        // Instrument global zone applies to every zone.
        assert_eq!(low.amp_env.release, 1.0);
        let high = &font.regions[grand.regions[1].index()];
        assert_eq!(high.loop_mode, Some(LoopMode::Continuous));

        let bright = &font.regions[font.presets[1].regions[0].index()];
        assert_eq!(bright.coarse_tune, 12);
    }

    #[test]
    fn test_identical_modifiers_share_regions() {
        let font = parse_font(piano().build()).unwrap();
        // Grand and Grand Again share; Bright has its own pair.
        assert_eq!(font.regions.len(), 4);
        assert_eq!(font.presets[0].regions, font.presets[2].regions);
        assert_ne!(font.presets[0].regions, font.presets[1].regions);
    }

    #[test]
    fn test_embedded_sample_refs() {
        let font = parse_font(piano().build()).unwrap();
        match &font.samples[1] {
            SampleRef::Embedded {
                name,
                start,
                end,
                loop_start,
                loop_end,
                encoding,
                ..
            } => {
                assert_eq!(name, "high");
                assert_eq!(*start, 50);
                assert_eq!(*end, 54);
                assert_eq!((*loop_start, *loop_end), (1, 3));
                assert_eq!(*encoding, SampleEncoding::Pcm16);
            }
            other => panic!("unexpected sample ref {:?}", other),
        }
    }

    #[test]
    fn test_preset_range_intersection() {
        let mut builder = Sf2Builder::new("Split");
        let sample = builder.sample("s", vec![0; 8], (0, 8), 60);
        let inst = builder.instrument(
            "I",
            vec![
                vec![(id::KEY_RANGE, range(0, 63)), (id::SAMPLE_ID, sample)],
                vec![(id::KEY_RANGE, range(64, 127)), (id::SAMPLE_ID, sample)],
            ],
        );
        builder.preset(
            "Upper",
            0,
            0,
            vec![vec![(id::KEY_RANGE, range(70, 80)), (id::INSTRUMENT, inst)]],
        );
        let font = parse_font(builder.build()).unwrap();
        let preset = &font.presets[0];
        assert_eq!(preset.regions.len(), 1);
        assert_eq!(
            font.regions[preset.regions[0].index()].keys,
            MidiRange::new(70, 80, 0).unwrap()
        );
    }

    #[test]
    fn test_inverted_key_range_rejects_zone() {
        let mut builder = Sf2Builder::new("Bad");
        let sample = builder.sample("s", vec![0; 8], (0, 8), 60);
        let inst = builder.instrument(
            "I",
            vec![
                vec![(id::KEY_RANGE, range(80, 20)), (id::SAMPLE_ID, sample)],
                vec![(id::KEY_RANGE, range(0, 127)), (id::SAMPLE_ID, sample)],
            ],
        );
        builder.simple_preset("P", 0, inst);
        let bytes = builder.build();

        let font = parse_font(bytes.clone()).unwrap();
        assert_eq!(font.regions.len(), 1);
        assert_eq!(
            font.diagnostics
                .count_kind(DiagnosticKind::Parse(ParseErrorKind::InvalidRange)),
            1
        );

        let strict = ParseOptions {
            strict: true,
            ..Default::default()
        };
        let err = parse(&mut Cursor::new(bytes), &strict).unwrap_err();
        assert_eq!(err.as_parse_error().map(|e| e.kind), Some(ParseErrorKind::InvalidRange));
    }

    #[test]
    fn test_unknown_generator_is_reported_once() {
        let mut builder = Sf2Builder::new("Unknown");
        let sample = builder.sample("s", vec![0; 8], (0, 8), 60);
        let inst = builder.instrument(
            "I",
            vec![
                vec![(99, 5), (id::SAMPLE_ID, sample)],
                vec![(99, 7), (id::SAMPLE_ID, sample)],
            ],
        );
        builder.simple_preset("P", 0, inst);
        let font = parse_font(builder.build()).unwrap();
        assert_eq!(font.regions.len(), 2);
        assert_eq!(
            font.diagnostics
                .count_kind(DiagnosticKind::Parse(ParseErrorKind::UnknownOpcode)),
            1
        );
    }

    #[test]
    fn test_compressed_samples_keep_their_encoding() {
        let mut builder = Sf2Builder::new("Compressed");
        let sample = builder.sample_with_type("ogg", vec![0; 8], (0, 8), 60, 0x11);
        let inst = builder.instrument("I", vec![vec![(id::SAMPLE_ID, sample)]]);
        builder.simple_preset("P", 0, inst);
        let font = parse_font(builder.build()).unwrap();
        assert!(matches!(
            font.samples[0],
            SampleRef::Embedded {
                encoding: SampleEncoding::Vorbis,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = piano().build();
        for cut in [4, 11, 40, bytes.len() / 2, bytes.len() - 1] {
            let err = parse_font(bytes[..cut].to_vec()).unwrap_err();
            let kind = err.as_parse_error().map(|e| e.kind);
            assert_eq!(kind, Some(ParseErrorKind::Truncated), "cut at {}", cut);
        }
    }

    #[test]
    fn test_bad_record_size_is_malformed() {
        let mut bytes = piano().build();
        // Grow the declared size of the phdr sub-chunk by one byte.
        let pos = bytes.windows(4).position(|w| w == b"phdr").unwrap();
        bytes[pos + 4] += 1;
        let err = parse_font(bytes).unwrap_err();
        let kind = err.as_parse_error().map(|e| e.kind);
        assert!(matches!(
            kind,
            Some(ParseErrorKind::MalformedChunk) | Some(ParseErrorKind::Truncated)
        ));
    }

    #[test]
    fn test_missing_instrument_is_malformed() {
        let mut builder = Sf2Builder::new("Dangling");
        builder.simple_preset("P", 0, 5);
        let err = parse_font(builder.build()).unwrap_err();
        assert_eq!(
            err.as_parse_error().map(|e| e.kind),
            Some(ParseErrorKind::MalformedChunk)
        );
    }
}
