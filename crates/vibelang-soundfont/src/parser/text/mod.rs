//! Text (SFZ) container parser.
//!
//! Opcodes cascade down the header hierarchy:
//!
//! ```text
//! <control>  default_path, note_offset, octave_offset
//! <global>   applies to everything below
//! <master>   overrides global
//! <group>    overrides master
//! <region>   overrides group; one sample-playback rule
//! ```
//!
//! A header resets every scope below it, so a `<group>` starts with an empty
//! group scope but keeps the current master and global opcodes.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::diagnostics::Severity;
use crate::error::{ParseError, ParseErrorKind};
use crate::model::{FontFormat, Preset, RegionId, SampleRef, SampleRefId};
use crate::parser::{ParseOptions, ParsedFont};

pub mod lexer;
pub mod opcodes;

use lexer::{tokenize, Token};
use opcodes::{build_region, is_known, stored_names, ControlSettings, OpcodeEntry, OpcodeMap};

/// The header whose body is currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Before the first header.
    None,
    Control,
    Global,
    Master,
    Group,
    Region,
    /// A header whose opcodes are not used (`<curve>`, `<effect>`, unknown ones).
    Ignored,
}

struct Assembler<'o> {
    options: &'o ParseOptions,
    font: ParsedFont,
    section: Section,
    defines: Vec<(String, String)>,
    control: OpcodeMap,
    global: OpcodeMap,
    master: OpcodeMap,
    group: OpcodeMap,
    /// Opcodes and header offset of the region being read.
    region: Option<(OpcodeMap, usize)>,
    reported: HashSet<String>,
    sample_ids: HashMap<SampleRef, SampleRefId>,
}

impl<'o> Assembler<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        let name = options.name.clone().unwrap_or_else(|| "default".to_string());
        Self {
            options,
            font: ParsedFont::new(name, FontFormat::Sfz),
            section: Section::None,
            defines: Vec::new(),
            control: OpcodeMap::new(),
            global: OpcodeMap::new(),
            master: OpcodeMap::new(),
            group: OpcodeMap::new(),
            region: None,
            reported: HashSet::new(),
            sample_ids: HashMap::new(),
        }
    }

    fn header(&mut self, name: &str, offset: usize) -> Result<(), ParseError> {
        self.finish_region()?;

        self.section = match name {
            "control" => Section::Control,
            "global" => {
                self.global.clear();
                self.master.clear();
                self.group.clear();
                Section::Global
            }
            "master" => {
                self.master.clear();
                self.group.clear();
                Section::Master
            }
            "group" => {
                self.group.clear();
                Section::Group
            }
            "region" => {
                self.region = Some((OpcodeMap::new(), offset));
                Section::Region
            }
            "curve" | "effect" | "midi" | "sample" => Section::Ignored,
            other => {
                self.font.diagnostics.warn(
                    ParseErrorKind::UnknownOpcode,
                    offset,
                    format!("unknown header <{}>, body ignored", other),
                );
                Section::Ignored
            }
        };
        Ok(())
    }

    /// Replace `$NAME` occurrences with their `#define` values.
    fn substitute<'v>(&self, value: &'v str) -> Cow<'v, str> {
        if !value.contains('$') {
            return Cow::Borrowed(value);
        }
        let mut result = value.to_string();
        for (name, replacement) in &self.defines {
            result = result.replace(name.as_str(), replacement);
        }
        Cow::Owned(result)
    }

    fn define(&mut self, name: &str, value: &str) {
        let value = self.substitute(value).into_owned();
        match self.defines.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.defines.push((name.to_string(), value)),
        }
        // Longest names first so `$KEY` never clobbers `$KEYS`.
        self.defines.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    fn opcode(&mut self, name: &str, value: &str, offset: usize) {
        if !is_known(name) {
            if self.reported.insert(name.to_string()) {
                self.font.diagnostics.warn(
                    ParseErrorKind::UnknownOpcode,
                    offset,
                    format!("unknown opcode '{}' ignored", name),
                );
            }
            return;
        }

        let entry = OpcodeEntry {
            opcode: name.to_string(),
            value: self.substitute(value).into_owned(),
            offset,
        };
        let scope = match self.section {
            Section::Control => &mut self.control,
            Section::Global => &mut self.global,
            Section::Master => &mut self.master,
            Section::Group => &mut self.group,
            Section::Region => match self.region.as_mut() {
                Some((opcodes, _)) => opcodes,
                None => return,
            },
            Section::Ignored => return,
            Section::None => {
                if self.reported.insert(String::from("<none>")) {
                    self.font.diagnostics.warn(
                        ParseErrorKind::MalformedChunk,
                        offset,
                        "opcodes before the first header are ignored",
                    );
                }
                return;
            }
        };
        for stored in stored_names(name) {
            scope.insert(stored.to_string(), entry.clone());
        }
    }

    fn control_settings(&mut self) -> ControlSettings {
        let mut settings = ControlSettings::default();
        if let Some(entry) = self.control.get("default_path") {
            settings.default_path = entry.value.clone();
        }
        for (name, factor) in [("note_offset", 1), ("octave_offset", 12)] {
            if let Some(entry) = self.control.get(name) {
                match entry.value.parse::<i32>() {
                    Ok(value) => settings.note_offset += value * factor,
                    Err(_) => self.font.diagnostics.warn(
                        ParseErrorKind::InvalidValue,
                        entry.offset,
                        format!("invalid value '{}' for opcode '{}'", entry.value, name),
                    ),
                }
            }
        }
        settings
    }

    fn finish_region(&mut self) -> Result<(), ParseError> {
        let Some((region_opcodes, offset)) = self.region.take() else {
            return Ok(());
        };

        let mut merged = self.global.clone();
        for scope in [&self.master, &self.group, &region_opcodes] {
            merged.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let control = self.control_settings();
        match build_region(&merged, &control, offset, &mut self.font.diagnostics) {
            Ok(Some((mut region, sample))) => {
                region.sample = self.intern_sample(sample);
                let id = RegionId(self.font.regions.len() as u32);
                self.font.regions.push(region);
                log::trace!("Region {} at offset {}", id.0, offset);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) if e.kind == ParseErrorKind::InvalidRange && !self.options.strict => {
                self.font.diagnostics.parse(Severity::Error, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn intern_sample(&mut self, sample: SampleRef) -> SampleRefId {
        if let Some(id) = self.sample_ids.get(&sample) {
            return *id;
        }
        let id = SampleRefId(self.font.samples.len() as u32);
        self.font.samples.push(sample.clone());
        self.sample_ids.insert(sample, id);
        id
    }

    fn finish(mut self) -> Result<ParsedFont, ParseError> {
        self.finish_region()?;

        let regions = (0..self.font.regions.len() as u32).map(RegionId).collect();
        self.font.presets.push(Preset {
            name: self.font.name.clone(),
            bank: 0,
            program: 0,
            regions,
        });
        Ok(self.font)
    }
}

/// Parse text container content.
pub fn parse_str(content: &str, options: &ParseOptions) -> Result<ParsedFont, ParseError> {
    let tokens = tokenize(content)?;
    let mut assembler = Assembler::new(options);

    for spanned in tokens {
        match spanned.token {
            Token::Header(name) => assembler.header(name, spanned.offset)?,
            Token::Opcode { name, value } => assembler.opcode(name, value, spanned.offset),
            Token::Define { name, value } => assembler.define(name, value),
            Token::Include(path) => assembler.font.diagnostics.warn(
                ParseErrorKind::UnknownOpcode,
                spanned.offset,
                format!("#include \"{}\" is not supported, skipped", path),
            ),
            Token::Directive(line) => assembler.font.diagnostics.warn(
                ParseErrorKind::UnknownOpcode,
                spanned.offset,
                format!("unknown directive '{}' ignored", line),
            ),
        }
    }

    let font = assembler.finish()?;
    log::debug!(
        "Parsed SFZ '{}': {} regions, {} samples",
        font.name,
        font.regions.len(),
        font.samples.len()
    );
    Ok(font)
}

/// Decode text container bytes one byte for one byte: the UTF-8 byte order
/// mark becomes spaces and every invalid byte becomes `?`. Offsets into the
/// decoded text are therefore offsets into `bytes`. The flag is set when
/// invalid bytes were replaced.
fn decode_text(bytes: &[u8]) -> (String, bool) {
    let mut content = String::with_capacity(bytes.len());
    let mut rest = bytes;
    if let Some(stripped) = rest.strip_prefix(UTF8_BOM) {
        content.push_str("   ");
        rest = stripped;
    }

    let mut replaced = false;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                content.push_str(valid);
                return (content, replaced);
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                content.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let invalid = e.error_len().unwrap_or(after.len());
                content.extend(std::iter::repeat('?').take(invalid));
                replaced = true;
                rest = &after[invalid..];
            }
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parse raw text container bytes. A UTF-8 byte order mark is skipped and
/// invalid UTF-8 is replaced with a warning. Reported offsets are byte
/// offsets into `bytes`.
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<ParsedFont, ParseError> {
    let (content, replaced) = decode_text(bytes);
    let mut font = parse_str(&content, options)?;
    if replaced {
        font.diagnostics.warn(
            ParseErrorKind::InvalidValue,
            0,
            "content is not valid UTF-8; invalid bytes were replaced",
        );
    }
    Ok(font)
}
