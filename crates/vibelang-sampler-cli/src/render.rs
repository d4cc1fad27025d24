//! Offline rendering through the sampler engine.
//!
//! The note list is turned into a frame-accurate schedule. Events are sent
//! through a [`SynthHandle`] exactly as a control thread would, and blocks are
//! cut at event frames so every event lands on a block boundary.

use crate::{load_sound, RenderArgs};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use vibelang_sampler::{SamplerConfig, Synth, SynthError, SynthEvent, SynthHandle};
use vibelang_soundfont::units::parse_note;
use vibelang_soundfont::Sound;

/// One note of the note list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub note: u8,
    pub velocity: u8,
    /// Start in seconds
    pub start: f32,
    /// Length in seconds
    pub length: f32,
}

/// Parse `note:velocity:start:length[,...]`. Notes may be numbers or names
/// such as `c4` or `f#3`.
pub fn parse_notes(list: &str) -> Result<Vec<ScheduledNote>> {
    list.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_scheduled_note)
        .collect()
}

fn parse_scheduled_note(part: &str) -> Result<ScheduledNote> {
    let fields: Vec<&str> = part.split(':').map(str::trim).collect();
    let [note, velocity, start, length] = fields.as_slice() else {
        bail!("Expected note:velocity:start:length, got '{}'", part);
    };

    let note = parse_note(note)
        .filter(|n| (0..=127).contains(n))
        .with_context(|| format!("Invalid note '{}' in '{}'", note, part))?;
    let velocity = velocity
        .parse::<u8>()
        .ok()
        .filter(|v| (1..=127).contains(v))
        .with_context(|| format!("Invalid velocity '{}' in '{}'", velocity, part))?;
    let start = start
        .parse::<f32>()
        .with_context(|| format!("Invalid start time '{}' in '{}'", start, part))?;
    let length = length
        .parse::<f32>()
        .with_context(|| format!("Invalid length '{}' in '{}'", length, part))?;
    if !(start.is_finite() && start >= 0.0 && length.is_finite() && length >= 0.0) {
        bail!("Start and length must be non-negative in '{}'", part);
    }

    Ok(ScheduledNote {
        note: note as u8,
        velocity,
        start,
        length,
    })
}

/// Frame-stamped events, sorted by frame. Note-offs sort before note-ons on
/// the same frame so a repeated note retriggers cleanly.
fn schedule(notes: &[ScheduledNote], sample_rate: u32) -> Vec<(u64, SynthEvent)> {
    let to_frames = |seconds: f32| (f64::from(seconds) * f64::from(sample_rate)).round() as u64;
    let mut events = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let start = to_frames(note.start);
        let end = start + to_frames(note.length);
        events.push((
            start,
            SynthEvent::NoteOn {
                note: note.note,
                velocity: note.velocity,
            },
        ));
        events.push((end, SynthEvent::NoteOff { note: note.note }));
    }
    events.sort_by_key(|(frame, event)| (*frame, matches!(event, SynthEvent::NoteOn { .. })));
    events
}

/// Send an event, draining the queue into the engine when it is full.
fn send(synth: &mut Synth, handle: &SynthHandle, event: SynthEvent) -> Result<()> {
    match handle.send(event.clone()) {
        Err(SynthError::EventQueueFull) => {
            synth.process_events();
            handle.send(event)?;
        }
        other => other?,
    }
    Ok(())
}

/// Render the notes with preset `preset`. Returns interleaved stereo samples.
pub fn render_notes(
    sound: Arc<Sound>,
    config: SamplerConfig,
    preset: usize,
    notes: &[ScheduledNote],
    tail: f32,
) -> Result<Vec<f32>> {
    let sample_rate = config.sample_rate;
    let block_frames = config.max_block_frames as u64;
    let (mut synth, handle) = Synth::new(sound, config)?;
    synth.select_preset(preset)?;

    let events = schedule(notes, sample_rate);
    let last = events.last().map_or(0, |(frame, _)| *frame);
    let total = last + (f64::from(tail.max(0.0)) * f64::from(sample_rate)).round() as u64;

    let mut out = vec![0.0f32; total as usize * 2];
    let mut pending = events.into_iter().peekable();
    let mut frame = 0u64;
    while frame < total {
        while let Some((_, event)) = pending.next_if(|(at, _)| *at <= frame) {
            send(&mut synth, &handle, event)?;
        }
        let next_event = pending.peek().map_or(total, |(at, _)| *at);
        let count = block_frames.min(next_event - frame).min(total - frame);
        let range = frame as usize * 2..(frame + count) as usize * 2;
        synth.render_block(&mut out[range]);
        frame += count;
    }

    log::debug!(
        "Rendered {} frames, {} voices still active, {} dropped",
        total,
        synth.active_voice_count(),
        synth.dropped_voice_count()
    );
    Ok(out)
}

/// Write interleaved stereo samples as a 32-bit float WAV.
pub fn write_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// `vibe-sampler render`
pub fn render(args: RenderArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => SamplerConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => SamplerConfig::load_or_default(),
    };
    let notes = parse_notes(&args.notes)?;
    let sound = load_sound(&args.file, false)?;
    for diagnostic in sound.diagnostics() {
        log::debug!("{}", diagnostic);
    }

    log::info!("Input:  {}", args.file.display());
    log::info!("Output: {}", args.output.display());
    log::info!(
        "Preset {} '{}', {} notes",
        args.preset,
        sound.preset_name(args.preset).unwrap_or("?"),
        notes.len()
    );

    let sample_rate = config.sample_rate;
    let samples = render_notes(Arc::new(sound), config, args.preset, &notes, args.tail)?;
    write_wav(&args.output, sample_rate, &samples)?;

    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    log::info!(
        "Wrote {:.2}s, peak {:.3}",
        samples.len() as f32 / 2.0 / sample_rate as f32,
        peak
    );
    Ok(())
}
