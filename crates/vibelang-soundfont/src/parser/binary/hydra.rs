//! The nine fixed-size record lists of the `pdta` chunk.

use std::io::{self, Cursor, Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use super::riff::{fixed_string, read_body, read_children, Chunk};
use crate::error::{LoadError, ParseError};

#[derive(Debug, Clone)]
pub struct PresetHeader {
    pub name: String,
    pub program: u16,
    pub bank: u16,
    pub bag_index: u16,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Bag {
    pub generator_index: u16,
    pub modulator_index: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorRecord {
    pub oper: u16,
    pub amount: [u8; 2],
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct InstrumentHeader {
    pub name: String,
    pub bag_index: u16,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct SampleHeader {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    /// Cents.
    pub pitch_correction: i8,
    pub sample_type: u16,
    pub offset: usize,
}

/// Sample type flag for compressed (Ogg Vorbis) payloads.
pub const SAMPLE_TYPE_VORBIS: u16 = 0x0010;
/// Sample type flag for samples stored in a sound ROM.
pub const SAMPLE_TYPE_ROM: u16 = 0x8000;

/// All `pdta` records. Every list keeps its terminal record, so header `i`'s
/// bags run up to header `i + 1`'s first bag.
#[derive(Debug, Clone)]
pub struct Hydra {
    pub presets: Vec<PresetHeader>,
    pub preset_bags: Vec<Bag>,
    pub preset_generators: Vec<GeneratorRecord>,
    pub instruments: Vec<InstrumentHeader>,
    pub instrument_bags: Vec<Bag>,
    pub instrument_generators: Vec<GeneratorRecord>,
    pub samples: Vec<SampleHeader>,
    pub modulator_count: usize,
}

fn find<'c>(children: &'c [Chunk], id: &[u8; 4], pdta: &Chunk) -> Result<&'c Chunk, ParseError> {
    children.iter().find(|c| &c.id == id).ok_or_else(|| {
        ParseError::malformed(
            pdta.offset(),
            format!("pdta is missing the '{}' sub-chunk", String::from_utf8_lossy(id)),
        )
    })
}

/// Read every record of a sub-chunk.
fn records<R, T, F>(
    source: &mut R,
    chunk: &Chunk,
    record_size: usize,
    mut read: F,
) -> Result<Vec<T>, LoadError>
where
    R: Read + Seek,
    F: FnMut(&mut Cursor<&[u8]>, usize) -> io::Result<T>,
{
    let size = chunk.size as usize;
    if size % record_size != 0 || size == 0 {
        return Err(ParseError::malformed(
            chunk.offset(),
            format!(
                "'{}' is {} bytes, not a non-empty multiple of {}",
                chunk.name(),
                size,
                record_size
            ),
        )
        .into());
    }

    let body = read_body(source, chunk)?;
    let mut cursor = Cursor::new(body.as_slice());
    let base = chunk.data_offset as usize;
    (0..size / record_size)
        .map(|i| {
            let offset = base + i * record_size;
            read(&mut cursor, offset).map_err(|e| super::riff::io_error(e, offset as u64, "a record"))
        })
        .collect()
}

fn read_name(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    let mut name = [0u8; 20];
    cursor.read_exact(&mut name)?;
    Ok(fixed_string(&name))
}

fn read_bag(cursor: &mut Cursor<&[u8]>, _offset: usize) -> io::Result<Bag> {
    Ok(Bag {
        generator_index: cursor.read_u16::<LittleEndian>()?,
        modulator_index: cursor.read_u16::<LittleEndian>()?,
    })
}

fn read_generator(cursor: &mut Cursor<&[u8]>, offset: usize) -> io::Result<GeneratorRecord> {
    let oper = cursor.read_u16::<LittleEndian>()?;
    let mut amount = [0u8; 2];
    cursor.read_exact(&mut amount)?;
    Ok(GeneratorRecord {
        oper,
        amount,
        offset,
    })
}

/// Read the `pdta` list.
pub fn read_hydra<R: Read + Seek>(source: &mut R, pdta: &Chunk) -> Result<Hydra, LoadError> {
    let children = read_children(source, pdta.data_offset + 4, pdta.end())?;

    let presets = records(source, find(&children, b"phdr", pdta)?, 38, |c, offset| {
        let name = read_name(c)?;
        let program = c.read_u16::<LittleEndian>()?;
        let bank = c.read_u16::<LittleEndian>()?;
        let bag_index = c.read_u16::<LittleEndian>()?;
        // library, genre, morphology
        let mut reserved = [0u8; 12];
        c.read_exact(&mut reserved)?;
        Ok(PresetHeader {
            name,
            program,
            bank,
            bag_index,
            offset,
        })
    })?;
    let preset_bags = records(source, find(&children, b"pbag", pdta)?, 4, read_bag)?;
    let preset_modulators = records(source, find(&children, b"pmod", pdta)?, 10, |c, _| {
        c.read_exact(&mut [0u8; 10])
    })?;
    let preset_generators = records(source, find(&children, b"pgen", pdta)?, 4, read_generator)?;

    let instruments = records(source, find(&children, b"inst", pdta)?, 22, |c, offset| {
        Ok(InstrumentHeader {
            name: read_name(c)?,
            bag_index: c.read_u16::<LittleEndian>()?,
            offset,
        })
    })?;
    let instrument_bags = records(source, find(&children, b"ibag", pdta)?, 4, read_bag)?;
    let instrument_modulators = records(source, find(&children, b"imod", pdta)?, 10, |c, _| {
        c.read_exact(&mut [0u8; 10])
    })?;
    let instrument_generators =
        records(source, find(&children, b"igen", pdta)?, 4, read_generator)?;

    let samples = records(source, find(&children, b"shdr", pdta)?, 46, |c, offset| {
        let name = read_name(c)?;
        let start = c.read_u32::<LittleEndian>()?;
        let end = c.read_u32::<LittleEndian>()?;
        let loop_start = c.read_u32::<LittleEndian>()?;
        let loop_end = c.read_u32::<LittleEndian>()?;
        let sample_rate = c.read_u32::<LittleEndian>()?;
        let original_pitch = c.read_u8()?;
        let pitch_correction = c.read_i8()?;
        let _sample_link = c.read_u16::<LittleEndian>()?;
        let sample_type = c.read_u16::<LittleEndian>()?;
        Ok(SampleHeader {
            name,
            start,
            end,
            loop_start,
            loop_end,
            sample_rate,
            original_pitch,
            pitch_correction,
            sample_type,
            offset,
        })
    })?;

    Ok(Hydra {
        presets,
        preset_bags,
        preset_generators,
        instruments,
        instrument_bags,
        instrument_generators,
        samples,
        modulator_count: preset_modulators.len() + instrument_modulators.len(),
    })
}
