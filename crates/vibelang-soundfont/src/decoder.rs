//! Audio decoding capability used to materialize samples.
//!
//! The store never decodes audio itself. It hands a [`DecodeRequest`] to a
//! [`SampleDecoder`] and keeps whatever PCM comes back. [`PcmDecoder`] covers
//! WAV files and uncompressed embedded data; hosts that need other codecs plug
//! in their own implementation.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{SampleLoadError, SampleLoadErrorKind};
use crate::model::SampleEncoding;

/// What to decode.
#[derive(Debug, Clone, Copy)]
pub enum DecodeRequest<'a> {
    /// An audio file on disk.
    File { path: &'a Path },
    /// Raw bytes cut out of the container's sample data.
    Embedded {
        name: &'a str,
        bytes: &'a [u8],
        encoding: SampleEncoding,
        sample_rate: u32,
    },
}

impl DecodeRequest<'_> {
    /// Human-readable description used in errors.
    pub fn describe(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Embedded { name, .. } => name.to_string(),
        }
    }
}

/// Decoded PCM, interleaved, normalized to -1..1.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub frames: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
}

/// Turns encoded sample data into PCM.
pub trait SampleDecoder {
    fn decode(&mut self, request: &DecodeRequest<'_>) -> Result<DecodedSample, SampleLoadError>;
}

/// Decoder for WAV files (through `hound`) and embedded 16-bit PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmDecoder;

impl PcmDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_file(&self, path: &Path) -> Result<DecodedSample, SampleLoadError> {
        let describe = || path.display().to_string();
        let mut file = File::open(path).map_err(|e| {
            SampleLoadError::new(
                SampleLoadErrorKind::MissingReference,
                describe(),
                e.to_string(),
            )
        })?;

        let mut magic = [0u8; 12];
        let is_wav = match file.read_exact(&mut magic) {
            Ok(()) => &magic[0..4] == b"RIFF" && &magic[8..12] == b"WAVE",
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
            Err(e) => {
                return Err(SampleLoadError::new(
                    SampleLoadErrorKind::CorruptData,
                    describe(),
                    e.to_string(),
                ))
            }
        };
        if !is_wav {
            return Err(SampleLoadError::new(
                SampleLoadErrorKind::UnsupportedCodec,
                describe(),
                "not a RIFF/WAVE file",
            ));
        }

        let file = File::open(path).map_err(|e| {
            SampleLoadError::new(SampleLoadErrorKind::MissingReference, describe(), e.to_string())
        })?;
        let reader = hound::WavReader::new(BufReader::new(file))
            .map_err(|e| wav_error(e, describe()))?;
        let spec = reader.spec();

        let frames = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| wav_error(e, describe()))?,
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| wav_error(e, describe()))?
            }
        };

        Ok(DecodedSample {
            frames,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bit_depth: spec.bits_per_sample,
        })
    }

    fn decode_embedded(
        &self,
        name: &str,
        bytes: &[u8],
        encoding: SampleEncoding,
        sample_rate: u32,
    ) -> Result<DecodedSample, SampleLoadError> {
        match encoding {
            SampleEncoding::Pcm16 => {}
            SampleEncoding::Vorbis => {
                return Err(SampleLoadError::new(
                    SampleLoadErrorKind::UnsupportedCodec,
                    name,
                    "compressed sample data needs an Ogg Vorbis decoder",
                ))
            }
            SampleEncoding::Rom => {
                return Err(SampleLoadError::new(
                    SampleLoadErrorKind::UnsupportedCodec,
                    name,
                    "sample data lives in a sound ROM",
                ))
            }
        }
        if bytes.len() % 2 != 0 {
            return Err(SampleLoadError::new(
                SampleLoadErrorKind::CorruptData,
                name,
                format!("{} bytes is not a whole number of 16-bit frames", bytes.len()),
            ));
        }
        if sample_rate == 0 {
            return Err(SampleLoadError::new(
                SampleLoadErrorKind::CorruptData,
                name,
                "sample rate is 0",
            ));
        }

        let frames = bytes
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
            .collect();
        Ok(DecodedSample {
            frames,
            channels: 1,
            sample_rate,
            bit_depth: 16,
        })
    }
}

fn wav_error(error: hound::Error, sample: String) -> SampleLoadError {
    let kind = match error {
        hound::Error::Unsupported => SampleLoadErrorKind::UnsupportedCodec,
        _ => SampleLoadErrorKind::CorruptData,
    };
    SampleLoadError::new(kind, sample, error.to_string())
}

impl SampleDecoder for PcmDecoder {
    fn decode(&mut self, request: &DecodeRequest<'_>) -> Result<DecodedSample, SampleLoadError> {
        match *request {
            DecodeRequest::File { path } => self.decode_file(path),
            DecodeRequest::Embedded {
                name,
                bytes,
                encoding,
                sample_rate,
            } => self.decode_embedded(name, bytes, encoding, sample_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, &[0, 16384, -16384, 32767]);

        let decoded = PcmDecoder::new()
            .decode(&DecodeRequest::File { path: &path })
            .unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.bit_depth, 16);
        assert_eq!(decoded.frames.len(), 4);
        assert!((decoded.frames[1] - 0.5).abs() < 1e-4);
        assert!((decoded.frames[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.wav");
        let err = PcmDecoder::new()
            .decode(&DecodeRequest::File { path: &path })
            .unwrap_err();
        assert_eq!(err.kind, SampleLoadErrorKind::MissingReference);
    }

    #[test]
    fn test_non_wav_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.flac");
        std::fs::write(&path, b"fLaC\x00\x00\x00\x22 not really").unwrap();
        let err = PcmDecoder::new()
            .decode(&DecodeRequest::File { path: &path })
            .unwrap_err();
        assert_eq!(err.kind, SampleLoadErrorKind::UnsupportedCodec);
    }

    #[test]
    fn test_malformed_wav_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF\x24\x00\x00\x00WAVEjunkjunkjunk").unwrap();
        let err = PcmDecoder::new()
            .decode(&DecodeRequest::File { path: &path })
            .unwrap_err();
        assert_eq!(err.kind, SampleLoadErrorKind::CorruptData);
    }

    #[test]
    fn test_embedded_pcm() {
        let bytes = [0x00, 0x40, 0x00, 0xC0];
        let decoded = PcmDecoder::new()
            .decode(&DecodeRequest::Embedded {
                name: "s",
                bytes: &bytes,
                encoding: SampleEncoding::Pcm16,
                sample_rate: 44100,
            })
            .unwrap();
        assert_eq!(decoded.frames, vec![0.5, -0.5]);
        assert_eq!(decoded.channels, 1);
    }

    #[test]
    fn test_embedded_vorbis_is_unsupported() {
        let err = PcmDecoder::new()
            .decode(&DecodeRequest::Embedded {
                name: "ogg",
                bytes: &[0, 0],
                encoding: SampleEncoding::Vorbis,
                sample_rate: 44100,
            })
            .unwrap_err();
        assert_eq!(err.kind, SampleLoadErrorKind::UnsupportedCodec);
    }
}
