//! Container parsing.
//!
//! Both formats are decoded into a [`ParsedFont`]: a flat list of regions, the
//! presets that reference them, and the sample references the regions use.
//! No sample data is decoded here; see [`crate::sample_store`].

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::diagnostics::Diagnostics;
use crate::error::{LoadError, ParseError};
use crate::model::{FontFormat, Preset, Region, SampleRef};

pub mod binary;
pub mod path_utils;
pub mod text;

/// Options that influence parsing.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Force a format instead of detecting it.
    pub format: Option<FontFormat>,
    /// Fail the whole parse on the first invalid key/velocity range instead of
    /// rejecting only the offending region.
    pub strict: bool,
    /// Name for containers that do not carry one (SFZ).
    pub name: Option<String>,
}

/// Location of embedded sample data inside a binary container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDataChunk {
    /// Byte offset of the first sample frame.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

/// Result of parsing one container.
#[derive(Debug, Clone)]
pub struct ParsedFont {
    pub name: String,
    pub format: FontFormat,
    pub regions: Vec<Region>,
    pub presets: Vec<Preset>,
    pub samples: Vec<SampleRef>,
    /// Where embedded sample bytes live (binary containers only).
    pub sample_data: Option<SampleDataChunk>,
    pub diagnostics: Diagnostics,
}

impl ParsedFont {
    pub(crate) fn new(name: String, format: FontFormat) -> Self {
        Self {
            name,
            format,
            regions: Vec::new(),
            presets: Vec::new(),
            samples: Vec::new(),
            sample_data: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

const DETECT_PREFIX_LEN: u64 = 4096;

/// Guess the container format from the first bytes of a source.
///
/// `RIFF....sfbk` is a binary font; text whose first meaningful character
/// opens a header, comment or directive is a text font.
pub fn detect_format(prefix: &[u8]) -> Option<FontFormat> {
    if prefix.len() >= 12 && &prefix[0..4] == b"RIFF" && &prefix[8..12] == b"sfbk" {
        return Some(FontFormat::Sf2);
    }

    let text = prefix.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(prefix);
    let first = text.iter().find(|b| !b.is_ascii_whitespace())?;
    matches!(first, b'<' | b'/' | b'#').then_some(FontFormat::Sfz)
}

/// Parse a container from a seekable byte source.
///
/// The source is rewound to its start before parsing.
pub fn parse<R: Read + Seek>(
    source: &mut R,
    options: &ParseOptions,
) -> Result<ParsedFont, LoadError> {
    source.seek(SeekFrom::Start(0))?;
    let format = match options.format {
        Some(format) => format,
        None => {
            let mut prefix = Vec::new();
            source.by_ref().take(DETECT_PREFIX_LEN).read_to_end(&mut prefix)?;
            source.seek(SeekFrom::Start(0))?;
            detect_format(&prefix).ok_or_else(|| {
                ParseError::malformed(0, "unrecognized container format")
            })?
        }
    };

    log::debug!("Parsing {} container", format);

    match format {
        FontFormat::Sf2 => binary::parse(source, options),
        FontFormat::Sfz => {
            let mut bytes = Vec::new();
            source.read_to_end(&mut bytes)?;
            Ok(text::parse_bytes(&bytes, options)?)
        }
    }
}

/// Parse a container held in memory.
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<ParsedFont, ParseError> {
    let mut cursor = Cursor::new(bytes);
    parse(&mut cursor, options).map_err(|e| match e {
        LoadError::Parse(e) => e,
        // A cursor over a slice only fails at the end of the data.
        LoadError::Io(e) => ParseError::truncated(bytes.len(), e.to_string()),
    })
}
