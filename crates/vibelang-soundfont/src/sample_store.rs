//! Owner of decoded sample buffers.
//!
//! Samples live in an arena and are addressed by [`SampleHandle`]. Each
//! distinct [`SampleRef`] is materialized at most once: later requests return
//! the cached handle, or the cached failure.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::decoder::{DecodeRequest, DecodedSample, SampleDecoder};
use crate::error::{SampleLoadError, SampleLoadErrorKind};
use crate::model::{SampleEncoding, SampleRef, Waveform};
use crate::parser::path_utils::resolve_against;
use crate::parser::SampleDataChunk;
use crate::units::midi_to_freq;

/// Frames in the generated sine wavetable.
const SINE_TABLE_LEN: usize = 256;
/// Frames in the generated silence loop.
const SILENCE_LEN: usize = 64;

/// Stable index of a materialized sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleHandle(u32);

impl SampleHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Decoded audio plus the metadata playback needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    /// Interleaved frames, normalized to -1..1.
    pub data: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    /// Loop points carried by the sample itself, `(start, end)` with an
    /// exclusive end.
    pub native_loop: Option<(u32, u32)>,
}

impl Sample {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / usize::from(self.channels.max(1))
    }

    /// Sample value of `channel` at `frame`. Out-of-range frames read as 0.
    #[inline]
    pub fn value(&self, frame: usize, channel: usize) -> f32 {
        let channels = usize::from(self.channels);
        self.data
            .get(frame * channels + channel.min(channels - 1))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Anything that can be read and seeked; used for embedded sample data.
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek> ByteSource for T {}

/// Where sample bytes come from while materializing.
pub struct SampleSources<'a> {
    pub decoder: &'a mut dyn SampleDecoder,
    /// The container's own bytes, needed for embedded samples.
    pub container: Option<&'a mut dyn ByteSource>,
    /// Directory relative file references resolve against.
    pub base_dir: Option<&'a Path>,
}

/// Arena of samples for one container.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Vec<Sample>,
    by_ref: HashMap<SampleRef, Result<SampleHandle, SampleLoadError>>,
    sample_data: Option<SampleDataChunk>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store for a binary container whose embedded data lives at `chunk`.
    pub fn with_sample_data(chunk: Option<SampleDataChunk>) -> Self {
        Self {
            sample_data: chunk,
            ..Self::default()
        }
    }

    /// Load a sample, or return the result of the earlier attempt for the same
    /// reference.
    pub fn materialize(
        &mut self,
        sample: &SampleRef,
        sources: &mut SampleSources<'_>,
    ) -> Result<SampleHandle, SampleLoadError> {
        if let Some(result) = self.by_ref.get(sample) {
            log::debug!("Reusing sample '{}'", sample);
            return result.clone();
        }

        let result = self.load(sample, sources).map(|loaded| {
            let handle = SampleHandle(self.samples.len() as u32);
            log::debug!(
                "Loaded sample '{}' into slot {} ({} frames, {} ch, {} Hz)",
                loaded.name,
                handle.0,
                loaded.frames(),
                loaded.channels,
                loaded.sample_rate
            );
            self.samples.push(loaded);
            handle
        });
        self.by_ref.insert(sample.clone(), result.clone());
        result
    }

    fn load(&self, sample: &SampleRef, sources: &mut SampleSources<'_>) -> Result<Sample, SampleLoadError> {
        match sample {
            SampleRef::Generated(waveform) => Ok(generated(*waveform)),
            SampleRef::File { path } => {
                let resolved = resolve_against(path, sources.base_dir);
                let decoded = sources.decoder.decode(&DecodeRequest::File { path: &resolved })?;
                into_sample(resolved.display().to_string(), decoded, None)
            }
            SampleRef::Embedded {
                name,
                start,
                end,
                loop_start,
                loop_end,
                sample_rate,
                encoding,
            } => {
                let bytes = self.read_embedded(name, *start, *end, *encoding, sources)?;
                let decoded = sources.decoder.decode(&DecodeRequest::Embedded {
                    name,
                    bytes: &bytes,
                    encoding: *encoding,
                    sample_rate: *sample_rate,
                })?;
                into_sample(name.clone(), decoded, Some((*loop_start, *loop_end)))
            }
        }
    }

    fn read_embedded(
        &self,
        name: &str,
        start: u32,
        end: u32,
        encoding: SampleEncoding,
        sources: &mut SampleSources<'_>,
    ) -> Result<Vec<u8>, SampleLoadError> {
        let missing = |message: String| {
            SampleLoadError::new(SampleLoadErrorKind::MissingReference, name, message)
        };
        let (Some(chunk), Some(container)) = (self.sample_data, sources.container.as_mut()) else {
            return Err(missing("container has no sample data".to_string()));
        };
        if start >= end {
            return Err(SampleLoadError::new(
                SampleLoadErrorKind::CorruptData,
                name,
                format!("sample range {}..{} is empty", start, end),
            ));
        }

        // 16-bit PCM is addressed in frames, compressed payloads in bytes.
        let scale = if encoding == SampleEncoding::Pcm16 { 2 } else { 1 };
        let byte_start = u64::from(start) * scale;
        let byte_end = u64::from(end) * scale;
        if byte_end > chunk.len {
            return Err(missing(format!(
                "sample range {}..{} lies outside the {}-byte sample data",
                start, end, chunk.len
            )));
        }

        let mut bytes = vec![0u8; (byte_end - byte_start) as usize];
        container
            .seek(SeekFrom::Start(chunk.offset + byte_start))
            .and_then(|_| container.read_exact(&mut bytes))
            .map_err(|e| missing(e.to_string()))?;
        Ok(bytes)
    }

    pub fn get(&self, handle: SampleHandle) -> Option<&Sample> {
        self.samples.get(handle.index())
    }

    /// The cached failure for a reference, if its load failed.
    pub fn failure(&self, sample: &SampleRef) -> Option<&SampleLoadError> {
        self.by_ref.get(sample).and_then(|r| r.as_ref().err())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Release every buffer. Previously returned handles become invalid and
    /// references will be loaded again on the next `materialize`.
    pub fn unload(&mut self) {
        log::debug!("Unloading {} samples", self.samples.len());
        self.samples.clear();
        self.by_ref.clear();
    }
}

fn into_sample(
    name: String,
    decoded: DecodedSample,
    native_loop: Option<(u32, u32)>,
) -> Result<Sample, SampleLoadError> {
    let corrupt = |message: String| SampleLoadError::new(SampleLoadErrorKind::CorruptData, &name, message);
    if decoded.channels == 0 || decoded.sample_rate == 0 {
        return Err(corrupt(format!(
            "invalid format: {} channels at {} Hz",
            decoded.channels, decoded.sample_rate
        )));
    }
    if decoded.frames.is_empty() || decoded.frames.len() % usize::from(decoded.channels) != 0 {
        return Err(corrupt(format!(
            "{} values do not form whole {}-channel frames",
            decoded.frames.len(),
            decoded.channels
        )));
    }

    let frames = (decoded.frames.len() / usize::from(decoded.channels)) as u32;
    let native_loop = native_loop.filter(|(start, end)| start < end && *end <= frames);
    Ok(Sample {
        name,
        data: decoded.frames,
        channels: decoded.channels,
        sample_rate: decoded.sample_rate,
        bit_depth: decoded.bit_depth,
        native_loop,
    })
}

fn generated(waveform: Waveform) -> Sample {
    match waveform {
        Waveform::Sine => {
            let data = (0..SINE_TABLE_LEN)
                .map(|i| (TAU * i as f32 / SINE_TABLE_LEN as f32).sin())
                .collect();
            // One cycle per table, so the table rate sets middle C's pitch.
            let sample_rate = (SINE_TABLE_LEN as f32 * midi_to_freq(60.0)).round() as u32;
            Sample {
                name: "*sine".to_string(),
                data,
                channels: 1,
                sample_rate,
                bit_depth: 32,
                native_loop: Some((0, SINE_TABLE_LEN as u32)),
            }
        }
        Waveform::Silence => Sample {
            name: "*silence".to_string(),
            data: vec![0.0; SILENCE_LEN],
            channels: 1,
            sample_rate: 44100,
            bit_depth: 32,
            native_loop: Some((0, SILENCE_LEN as u32)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PcmDecoder;
    use std::io::Cursor;
    use std::path::PathBuf;

    /// Counts decode calls and always fails with the configured error.
    struct CountingDecoder {
        calls: usize,
        kind: SampleLoadErrorKind,
    }

    impl SampleDecoder for CountingDecoder {
        fn decode(&mut self, request: &DecodeRequest<'_>) -> Result<DecodedSample, SampleLoadError> {
            self.calls += 1;
            Err(SampleLoadError::new(self.kind, request.describe(), "nope"))
        }
    }

    fn sources(decoder: &mut dyn SampleDecoder) -> SampleSources<'_> {
        SampleSources {
            decoder,
            container: None,
            base_dir: None,
        }
    }

    #[test]
    fn test_generated_samples_are_deduplicated() {
        let mut store = SampleStore::new();
        let mut decoder = PcmDecoder::new();
        let mut sources = sources(&mut decoder);
        let a = store
            .materialize(&SampleRef::Generated(Waveform::Sine), &mut sources)
            .unwrap();
        let b = store
            .materialize(&SampleRef::Generated(Waveform::Sine), &mut sources)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);

        let sine = store.get(a).unwrap();
        assert_eq!(sine.frames(), SINE_TABLE_LEN);
        assert_eq!(sine.native_loop, Some((0, SINE_TABLE_LEN as u32)));
        let cycle_hz = sine.sample_rate as f32 / SINE_TABLE_LEN as f32;
        assert!((cycle_hz - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_failures_are_cached() {
        let mut store = SampleStore::new();
        let mut decoder = CountingDecoder {
            calls: 0,
            kind: SampleLoadErrorKind::CorruptData,
        };
        let sample = SampleRef::File {
            path: PathBuf::from("bad.wav"),
        };
        {
            let mut sources = sources(&mut decoder);
            assert!(store.materialize(&sample, &mut sources).is_err());
            let err = store.materialize(&sample, &mut sources).unwrap_err();
            assert_eq!(err.kind, SampleLoadErrorKind::CorruptData);
        }
        assert_eq!(decoder.calls, 1);
        assert!(store.failure(&sample).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_embedded_sample_reads_from_container() {
        let mut bytes = vec![0xAA, 0xBB];
        for v in [0i16, 16384, -16384, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut container = Cursor::new(bytes);
        let mut store = SampleStore::with_sample_data(Some(SampleDataChunk { offset: 2, len: 8 }));
        let mut decoder = PcmDecoder::new();
        let mut sources = SampleSources {
            decoder: &mut decoder,
            container: Some(&mut container),
            base_dir: None,
        };

        let sample = SampleRef::Embedded {
            name: "s".to_string(),
            start: 1,
            end: 4,
            loop_start: 0,
            loop_end: 2,
            sample_rate: 32000,
            encoding: SampleEncoding::Pcm16,
        };
        let handle = store.materialize(&sample, &mut sources).unwrap();
        let loaded = store.get(handle).unwrap();
        assert_eq!(loaded.data, vec![0.5, -0.5, 0.0]);
        assert_eq!(loaded.sample_rate, 32000);
        assert_eq!(loaded.native_loop, Some((0, 2)));

        let outside = SampleRef::Embedded {
            name: "far".to_string(),
            start: 2,
            end: 10,
            loop_start: 0,
            loop_end: 0,
            sample_rate: 32000,
            encoding: SampleEncoding::Pcm16,
        };
        let err = store.materialize(&outside, &mut sources).unwrap_err();
        assert_eq!(err.kind, SampleLoadErrorKind::MissingReference);
    }

    #[test]
    fn test_unload_releases_everything() {
        let mut store = SampleStore::new();
        let mut decoder = PcmDecoder::new();
        let mut sources = sources(&mut decoder);
        store
            .materialize(&SampleRef::Generated(Waveform::Silence), &mut sources)
            .unwrap();
        store.unload();
        assert!(store.is_empty());
        assert!(store.get(SampleHandle(0)).is_none());
    }
}
