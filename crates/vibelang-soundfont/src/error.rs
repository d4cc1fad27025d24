//! Error types for soundfont loading.
//!
//! Errors fall into three groups:
//!
//! - [`ParseError`]: the container itself is malformed. Fatal to the load that
//!   produced it, but never to the process.
//! - [`SampleLoadError`]: a single sample could not be materialized. Non-fatal;
//!   regions using that sample become unplayable and the load continues.
//! - [`LoadError`]: what a top-level load returns (a parse failure or I/O on the
//!   byte source).

use std::fmt;
use std::io;
use thiserror::Error;

/// The category of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// The byte source ended inside a structure.
    Truncated,
    /// A chunk, record, header or token is not well-formed.
    MalformedChunk,
    /// An opcode, generator or header name is not recognized.
    ///
    /// Only ever reported as a diagnostic; unknown names do not abort a load.
    UnknownOpcode,
    /// A key or velocity range is out of 0-127 or not well-ordered.
    InvalidRange,
    /// An opcode or generator value could not be interpreted.
    InvalidValue,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Truncated => "truncated data",
            Self::MalformedChunk => "malformed chunk",
            Self::UnknownOpcode => "unknown opcode",
            Self::InvalidRange => "invalid range",
            Self::InvalidValue => "invalid value",
        };
        f.write_str(name)
    }
}

/// A parse failure with the byte offset where it was detected.
///
/// For binary containers the offset points into the RIFF stream; for text
/// containers it is the byte offset of the offending token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at offset {offset}: {message}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Byte offset into the source.
    pub offset: usize,
    /// Human-readable description.
    pub message: String,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(kind: ParseErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn truncated(offset: usize, message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::Truncated, offset, message)
    }

    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        Self::new(ParseErrorKind::MalformedChunk, offset, message)
    }
}

/// The category of a [`SampleLoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleLoadErrorKind {
    /// The sample encoding is not supported by the decoder.
    UnsupportedCodec,
    /// The sample data is present but cannot be decoded.
    CorruptData,
    /// The referenced sample file or byte range does not exist.
    MissingReference,
}

impl fmt::Display for SampleLoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnsupportedCodec => "unsupported codec",
            Self::CorruptData => "corrupt data",
            Self::MissingReference => "missing reference",
        };
        f.write_str(name)
    }
}

/// Failure to materialize one sample.
///
/// Cloneable so the sample store can cache a failure against its reference
/// and hand the same error to every region that shares the sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} for sample '{sample}': {message}")]
pub struct SampleLoadError {
    /// What went wrong.
    pub kind: SampleLoadErrorKind,
    /// Description of the sample reference (path or embedded sample name).
    pub sample: String,
    /// Human-readable description.
    pub message: String,
}

impl SampleLoadError {
    /// Create a new sample load error.
    pub fn new(
        kind: SampleLoadErrorKind,
        sample: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sample: sample.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a top-level container load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The container could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The byte source could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    /// The parse error, if this load failed while parsing.
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Io(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_includes_offset() {
        let err = ParseError::truncated(42, "pdta ends early");
        assert_eq!(err.to_string(), "truncated data at offset 42: pdta ends early");
    }

    #[test]
    fn test_load_error_from_parse_error() {
        let err: LoadError = ParseError::malformed(0, "bad").into();
        assert_eq!(
            err.as_parse_error().map(|e| e.kind),
            Some(ParseErrorKind::MalformedChunk)
        );
    }
}
