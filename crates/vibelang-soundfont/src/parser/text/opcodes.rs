//! Opcode interpretation: turns a merged opcode map into a [`Region`].

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostics, Severity};
use crate::error::{ParseError, ParseErrorKind};
use crate::model::{LoopMode, MidiRange, OffMode, Region, SampleRef, SampleRefId, TriggerMode, Waveform};
use crate::parser::path_utils::combine_sample_path;
use crate::units::{db_to_amp, parse_note};

/// An opcode value together with the name and offset of the opcode that set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeEntry {
    /// Name as written, which may be an alias of the stored name.
    pub opcode: String,
    pub value: String,
    pub offset: usize,
}

pub type OpcodeMap = HashMap<String, OpcodeEntry>;

/// Opcodes that change how a region is built.
const MAPPED: &[&str] = &[
    "sample",
    "key",
    "lokey",
    "hikey",
    "lovel",
    "hivel",
    "pitch_keycenter",
    "pitch_keytrack",
    "tune",
    "transpose",
    "trigger",
    "loop_mode",
    "loopmode",
    "loop_start",
    "loopstart",
    "loop_end",
    "loopend",
    "offset",
    "end",
    "volume",
    "amplitude",
    "pan",
    "amp_veltrack",
    "ampeg_delay",
    "ampeg_attack",
    "ampeg_hold",
    "ampeg_decay",
    "ampeg_sustain",
    "ampeg_release",
    "group",
    "off_by",
    "off_mode",
];

/// `<control>` opcodes.
const CONTROL: &[&str] = &["default_path", "note_offset", "octave_offset"];

/// Valid opcodes this engine does not render. Accepted without a diagnostic.
/// Names are compared with trailing digits removed.
const ACCEPTED: &[&str] = &[
    "lochan",
    "hichan",
    "lobend",
    "hibend",
    "lorand",
    "hirand",
    "seq_length",
    "seq_position",
    "sw_lokey",
    "sw_hikey",
    "sw_last",
    "sw_down",
    "sw_up",
    "sw_previous",
    "sw_default",
    "sw_label",
    "lotimer",
    "hitimer",
    "delay",
    "delay_random",
    "offset_random",
    "direction",
    "count",
    "polyphony",
    "note_polyphony",
    "polyphony_group",
    "note_selfmask",
    "rt_decay",
    "rt_dead",
    "output",
    "width",
    "position",
    "amp_keycenter",
    "amp_keytrack",
    "amp_random",
    "amp_velcurve_",
    "xfin_lokey",
    "xfin_hikey",
    "xfout_lokey",
    "xfout_hikey",
    "xfin_lovel",
    "xfin_hivel",
    "xfout_lovel",
    "xfout_hivel",
    "xf_keycurve",
    "xf_velcurve",
    "pitch_random",
    "pitch_veltrack",
    "bend_up",
    "bend_down",
    "bend_step",
    "cutoff",
    "resonance",
    "fil_type",
    "fil_keytrack",
    "fil_keycenter",
    "fil_veltrack",
    "fil_random",
    "ampeg_start",
    "ampeg_vel2attack",
    "ampeg_vel2decay",
    "ampeg_vel2sustain",
    "ampeg_vel2release",
    "fileg_delay",
    "fileg_attack",
    "fileg_hold",
    "fileg_decay",
    "fileg_sustain",
    "fileg_release",
    "fileg_depth",
    "pitcheg_delay",
    "pitcheg_attack",
    "pitcheg_hold",
    "pitcheg_decay",
    "pitcheg_sustain",
    "pitcheg_release",
    "pitcheg_depth",
    "amplfo_delay",
    "amplfo_freq",
    "amplfo_depth",
    "fillfo_delay",
    "fillfo_freq",
    "fillfo_depth",
    "pitchlfo_delay",
    "pitchlfo_freq",
    "pitchlfo_depth",
    "effect",
    "sample_quality",
    "global_label",
    "master_label",
    "group_label",
    "region_label",
    "label_cc",
    "set_cc",
];

fn base_name(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

/// Names an opcode is stored under in its scope.
///
/// Aliases collapse onto one spelling and `key` stands for `lokey`, `hikey`
/// and `pitch_keycenter`, so each of them is overridden by a lower scope like
/// any other opcode.
pub fn stored_names(name: &str) -> Vec<&str> {
    match name {
        "key" => vec!["lokey", "hikey", "pitch_keycenter"],
        "loopmode" => vec!["loop_mode"],
        "loopstart" => vec!["loop_start"],
        "loopend" => vec!["loop_end"],
        other => vec![other],
    }
}

/// True for opcodes that are either mapped or knowingly ignored.
pub fn is_known(name: &str) -> bool {
    let base = base_name(name);
    MAPPED.contains(&name)
        || CONTROL.contains(&name)
        || ACCEPTED.contains(&base)
        // CC-conditioned variants: locc64, pan_oncc10, cutoff_cc1...
        || base.ends_with("cc")
}

/// Settings from `<control>` that affect every region.
#[derive(Debug, Clone, Default)]
pub struct ControlSettings {
    pub default_path: String,
    /// Semitones added to every key value (`note_offset + 12 * octave_offset`).
    pub note_offset: i32,
}

/// Types that can be read from an opcode value string.
trait OpcodeValue: Sized {
    fn parse_opcode(value: &str) -> Option<Self>;
}

impl OpcodeValue for f32 {
    fn parse_opcode(value: &str) -> Option<Self> {
        value.parse::<f32>().ok().filter(|v| v.is_finite())
    }
}

impl OpcodeValue for i32 {
    fn parse_opcode(value: &str) -> Option<Self> {
        value
            .parse::<i32>()
            .ok()
            .or_else(|| f32::parse_opcode(value).map(|v| v.round() as i32))
    }
}

impl OpcodeValue for u32 {
    fn parse_opcode(value: &str) -> Option<Self> {
        i64::from(i32::parse_opcode(value)?).try_into().ok()
    }
}

/// A key value: a number or a note name.
struct Note(i32);

impl OpcodeValue for Note {
    fn parse_opcode(value: &str) -> Option<Self> {
        parse_note(value).map(Note)
    }
}

impl OpcodeValue for LoopMode {
    fn parse_opcode(value: &str) -> Option<Self> {
        match value {
            "no_loop" => Some(Self::NoLoop),
            "one_shot" => Some(Self::OneShot),
            "loop_continuous" => Some(Self::Continuous),
            "loop_sustain" => Some(Self::Sustain),
            _ => None,
        }
    }
}

impl OpcodeValue for TriggerMode {
    fn parse_opcode(value: &str) -> Option<Self> {
        match value {
            "attack" => Some(Self::Attack),
            "release" | "release_key" => Some(Self::Release),
            "first" => Some(Self::First),
            "legato" => Some(Self::Legato),
            _ => None,
        }
    }
}

impl OpcodeValue for OffMode {
    fn parse_opcode(value: &str) -> Option<Self> {
        match value {
            "fast" => Some(Self::Fast),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Typed access to a merged opcode map. Values that do not parse are reported
/// once per written opcode and treated as absent.
struct OpcodeReader<'a> {
    opcodes: &'a OpcodeMap,
    diagnostics: &'a mut Diagnostics,
    reported: HashSet<usize>,
}

impl<'a> OpcodeReader<'a> {
    /// First present opcode among `names`.
    fn entry(&self, names: &[&str]) -> Option<&'a OpcodeEntry> {
        let opcodes = self.opcodes;
        names.iter().find_map(|name| opcodes.get(*name))
    }

    fn get<T: OpcodeValue>(&mut self, names: &[&str]) -> Option<T> {
        let entry = self.entry(names)?;
        let parsed = T::parse_opcode(&entry.value);
        if parsed.is_none() && self.reported.insert(entry.offset) {
            self.diagnostics.warn(
                ParseErrorKind::InvalidValue,
                entry.offset,
                format!("invalid value '{}' for opcode '{}'", entry.value, entry.opcode),
            );
        }
        parsed
    }

    fn offset(&self, names: &[&str]) -> Option<usize> {
        self.entry(names).map(|entry| entry.offset)
    }
}

fn sample_ref(
    value: &str,
    control: &ControlSettings,
    offset: usize,
    diagnostics: &mut Diagnostics,
) -> Option<SampleRef> {
    match value.strip_prefix('*') {
        Some("sine") => Some(SampleRef::Generated(Waveform::Sine)),
        Some("silence") => Some(SampleRef::Generated(Waveform::Silence)),
        Some(other) => {
            diagnostics.parse(
                Severity::Error,
                ParseError::new(
                    ParseErrorKind::InvalidValue,
                    offset,
                    format!("unknown generated sample '*{}', region skipped", other),
                ),
            );
            None
        }
        None => Some(SampleRef::File {
            path: combine_sample_path(&control.default_path, value),
        }),
    }
}

/// Build a region from the merged opcodes of one `<region>`.
///
/// Returns `Ok(None)` for regions skipped with a diagnostic and
/// `Err(InvalidRange)` for invalid key/velocity ranges; the caller decides
/// whether that fails the load. The returned region's `sample` field is a
/// placeholder until the caller interns the [`SampleRef`].
pub fn build_region(
    opcodes: &OpcodeMap,
    control: &ControlSettings,
    region_offset: usize,
    diagnostics: &mut Diagnostics,
) -> Result<Option<(Region, SampleRef)>, ParseError> {
    let Some(sample) = opcodes.get("sample") else {
        diagnostics.parse(
            Severity::Error,
            ParseError::new(
                ParseErrorKind::InvalidValue,
                region_offset,
                "region has no sample, skipped",
            ),
        );
        return Ok(None);
    };
    let Some(sample) = sample_ref(&sample.value, control, sample.offset, diagnostics) else {
        return Ok(None);
    };

    let mut reader = OpcodeReader {
        opcodes,
        diagnostics,
        reported: HashSet::new(),
    };
    let mut region = Region::new(SampleRefId(0));
    let shift = |note: Note| note.0 + control.note_offset;

    // Keys
    let lokey = reader.get::<Note>(&["lokey"]).map_or(0, shift);
    let hikey = reader.get::<Note>(&["hikey"]).map_or(127, shift);
    let key_offset = reader.offset(&["lokey", "hikey"]).unwrap_or(region_offset);
    region.keys = MidiRange::new(lokey, hikey, key_offset)?;

    // Velocities
    let lovel = reader.get::<i32>(&["lovel"]).unwrap_or(0);
    let hivel = reader.get::<i32>(&["hivel"]).unwrap_or(127);
    let vel_offset = reader.offset(&["lovel", "hivel"]).unwrap_or(region_offset);
    region.velocities = MidiRange::new(lovel, hivel, vel_offset)?;

    // Pitch
    let keycenter = reader
        .get::<Note>(&["pitch_keycenter"])
        .map_or(60, shift);
    match u8::try_from(keycenter) {
        Ok(root) if root <= 127 => region.root_key = root,
        _ => {
            let offset = reader
                .offset(&["pitch_keycenter"])
                .unwrap_or(region_offset);
            reader.diagnostics.warn(
                ParseErrorKind::InvalidValue,
                offset,
                format!("root key {} is outside 0-127, using 60", keycenter),
            );
        }
    }
    if let Some(keytrack) = reader.get::<f32>(&["pitch_keytrack"]) {
        region.pitch_keytrack = keytrack;
    }
    if let Some(tune) = reader.get::<f32>(&["tune"]) {
        region.fine_tune = tune;
    }
    if let Some(transpose) = reader.get::<i32>(&["transpose"]) {
        region.coarse_tune = transpose;
    }

    if let Some(trigger) = reader.get(&["trigger"]) {
        region.trigger = trigger;
    }

    // Playback range and loop. The format's end points are inclusive.
    region.loop_mode = reader.get(&["loop_mode"]);
    region.loop_start = reader.get::<u32>(&["loop_start"]);
    region.loop_end = reader
        .get::<u32>(&["loop_end"])
        .map(|end| end.saturating_add(1));
    if let Some(offset) = reader.get::<u32>(&["offset"]) {
        region.offset = offset;
    }
    region.end = reader.get::<u32>(&["end"]).map(|end| end.saturating_add(1));

    // Amplitude
    let volume = reader.get::<f32>(&["volume"]).unwrap_or(0.0);
    let amplitude = reader.get::<f32>(&["amplitude"]).unwrap_or(100.0);
    region.gain = db_to_amp(volume) * (amplitude / 100.0).max(0.0);
    if let Some(pan) = reader.get::<f32>(&["pan"]) {
        region.pan = (pan / 100.0).clamp(-1.0, 1.0);
    }
    if let Some(veltrack) = reader.get::<f32>(&["amp_veltrack"]) {
        region.amp_veltrack = (veltrack / 100.0).clamp(-1.0, 1.0);
    }

    // Envelope
    let env = &mut region.amp_env;
    for (name, field) in [
        ("ampeg_delay", &mut env.delay),
        ("ampeg_attack", &mut env.attack),
        ("ampeg_hold", &mut env.hold),
        ("ampeg_decay", &mut env.decay),
        ("ampeg_release", &mut env.release),
    ] {
        if let Some(seconds) = reader.get::<f32>(&[name]) {
            *field = seconds.max(0.0);
        }
    }
    if let Some(sustain) = reader.get::<f32>(&["ampeg_sustain"]) {
        env.sustain = (sustain / 100.0).clamp(0.0, 1.0);
    }

    // Choke groups
    region.exclusive_class = reader.get::<u32>(&["group"]).filter(|g| *g != 0);
    region.off_by = reader.get::<u32>(&["off_by"]).filter(|g| *g != 0);
    if let Some(mode) = reader.get(&["off_mode"]) {
        region.off_mode = mode;
    }

    Ok(Some((region, sample)))
}
