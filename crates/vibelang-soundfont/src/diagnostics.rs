//! Accumulated warnings and non-fatal errors from a load.
//!
//! Parsing and sample materialization follow a "collect and keep going" policy:
//! anything that only affects part of a container is recorded here instead of
//! failing the whole load.

use std::fmt;

use crate::error::{ParseError, ParseErrorKind, SampleLoadError, SampleLoadErrorKind};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Something was ignored (e.g. an unknown opcode).
    Warning,
    /// Something was rejected (e.g. a region with an invalid range or an
    /// unloadable sample).
    Error,
}

/// What produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Raised while parsing the container.
    Parse(ParseErrorKind),
    /// Raised while materializing a sample.
    SampleLoad(SampleLoadErrorKind),
}

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Byte offset into the container, when the problem has a location.
    pub offset: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.offset {
            Some(offset) => write!(f, "{} (offset {}): {}", severity, offset, self.message),
            None => write!(f, "{}: {}", severity, self.message),
        }
    }
}

/// Ordered collection of diagnostics for one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parse problem that did not abort the load.
    pub fn parse(&mut self, severity: Severity, error: ParseError) {
        let diagnostic = Diagnostic {
            severity,
            kind: DiagnosticKind::Parse(error.kind),
            offset: Some(error.offset),
            message: error.to_string(),
        };
        self.push(diagnostic);
    }

    /// Shorthand for a warning-level parse diagnostic.
    pub fn warn(&mut self, kind: ParseErrorKind, offset: usize, message: impl Into<String>) {
        self.parse(Severity::Warning, ParseError::new(kind, offset, message));
    }

    /// Record a sample that failed to materialize.
    pub fn sample_failed(&mut self, error: &SampleLoadError, affected_regions: usize) {
        let diagnostic = Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::SampleLoad(error.kind),
            offset: None,
            message: format!("{} ({} region(s) unplayable)", error, affected_regions),
        };
        self.push(diagnostic);
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Append all entries of another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count diagnostics of the given kind.
    pub fn count_kind(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    /// True if any entry has error severity.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
