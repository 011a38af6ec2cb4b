//! Error taxonomy.
//!
//! Two layers:
//!
//! - [`Violation`]: one defect in one input record, classified as a shape,
//!   bounds or consistency problem. Validation collects *all* of them for a
//!   file into a [`ValidationReport`] before anything is reported.
//! - [`Error`]: the crate-level error returned by fallible operations. A
//!   failed validation surfaces as [`Error::Validation`].
//!
//! Lexicon ambiguity is deliberately absent here: it is routed to side
//! channels (`Unlinked`, tagger skip counters) and never aborts a run.

use std::fmt;
use std::path::PathBuf;

use crate::Span;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path} (line {line}): {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Validation(ValidationReport),

    #[error("passage {passage_id} span {span} lies outside the token stream (len={len})")]
    Bounds { passage_id: String, span: Span, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("usage: {0}")]
    Usage(String),
}

impl From<ValidationReport> for Error {
    fn from(report: ValidationReport) -> Self {
        Error::Validation(report)
    }
}

/// Category of a record-level defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViolationKind {
    /// Missing required field, type outside the vocabulary, malformed value.
    Shape,
    /// Span outside the token stream or its declared passage.
    Bounds,
    /// Derived field disagreeing with its source (e.g. `surface_norm`).
    Consistency,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViolationKind::Shape => "shape",
            ViolationKind::Bounds => "bounds",
            ViolationKind::Consistency => "consistency",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}: {detail}")]
pub struct Violation {
    /// 1-based record number in the input file.
    pub line: usize,
    pub kind: ViolationKind,
    pub detail: String,
}

impl Violation {
    pub fn shape(line: usize, detail: impl Into<String>) -> Self {
        Violation { line, kind: ViolationKind::Shape, detail: detail.into() }
    }

    pub fn bounds(line: usize, detail: impl Into<String>) -> Self {
        Violation { line, kind: ViolationKind::Bounds, detail: detail.into() }
    }

    pub fn consistency(line: usize, detail: impl Into<String>) -> Self {
        Violation { line, kind: ViolationKind::Consistency, detail: detail.into() }
    }
}

/// Every violation found in one input file, in record order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed with {} violation(s)", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n- {v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_every_violation() {
        let mut report = ValidationReport::default();
        report.push(Violation::shape(1, "missing fields: [\"surface\"]"));
        report.push(Violation::bounds(3, "token span out of bounds: 4-9 (len=5)"));

        let text = Error::from(report.clone()).to_string();
        assert!(text.starts_with("validation failed with 2 violation(s)"));
        assert!(text.contains("line 1: shape: missing fields"));
        assert!(text.contains("line 3: bounds: token span"));
        assert_eq!(report.count(ViolationKind::Bounds), 1);
        assert_eq!(report.count(ViolationKind::Consistency), 0);
    }
}
