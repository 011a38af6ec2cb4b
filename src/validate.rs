//! Record validation and repair.
//!
//! Rows are checked as raw JSON so that a missing field is reported as such
//! instead of surfacing as a deserialization error. Every row is checked and
//! every violation collected before anything is returned.
//!
//! | Check                                   | Kind        | Repair mode                      |
//! |-----------------------------------------|-------------|----------------------------------|
//! | required field missing, not an object   | shape       | fatal                            |
//! | type / entity type outside vocabulary   | shape       | fatal                            |
//! | work id or slug differs from the index  | shape       | fatal                            |
//! | timestamp not RFC 3339                  | shape       | fatal                            |
//! | span outside stream, passage or unknown | bounds      | fatal                            |
//! | certainty label unknown                 | consistency | `low`, `FIXED_CERTAINTY_UNKNOWN` |
//! | certainty spelled `medium` etc.         | consistency | `FIXED_CERTAINTY`                |
//! | surface differs from the token stream   | consistency | `FIXED_SURFACE`                  |
//! | `surface_norm != normalize(surface)`    | consistency | `FIXED_SURFACE_NORM`             |
//!
//! A numeric certainty in `0..=1` is accepted in both modes: it is bucketed
//! onto the label scale and the row is noted `CERTAINTY_FROM_SCORE`.
//!
//! The surface check runs in strict mode only when asked for; repair mode
//! always rewrites the surface from the token stream. Repair also recomputes
//! the annotator mention id.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::engine::mention_id;
use crate::error::{ValidationReport, Violation};
use crate::{Certainty, Mention, Span, TokenIndex, Vocabulary, normalize};

/// How consistency problems are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Report them.
    #[default]
    Strict,
    /// Fix them and note the fix on the row.
    Repair,
}

/// Required fields; each entry lists the accepted spellings.
const REQUIRED: &[&[&str]] = &[
    &["work_id", "work_urn"],
    &["passage_id", "passage_urn"],
    &["work_slug"],
    &["token_start"],
    &["token_end"],
    &["surface"],
    &["surface_norm"],
    &["type", "provisional_type"],
    &["certainty"],
    &["annotator_id"],
    &["timestamp"],
];

/// How the raw `certainty` value was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertaintyRead {
    Canonical(Certainty),
    Respelled(Certainty),
    Score(Certainty),
    Unknown,
}

fn read_certainty(raw: &Value) -> CertaintyRead {
    match raw {
        Value::String(label) => match Certainty::parse(label) {
            Some((c, false)) => CertaintyRead::Canonical(c),
            Some((c, true)) => CertaintyRead::Respelled(c),
            None => CertaintyRead::Unknown,
        },
        Value::Number(n) => n.as_f64().and_then(Certainty::from_score).map_or(CertaintyRead::Unknown, CertaintyRead::Score),
        _ => CertaintyRead::Unknown,
    }
}

pub(crate) struct Validator<'a> {
    index: &'a TokenIndex,
    vocab: &'a Vocabulary,
    passages: HashMap<&'a str, Span>,
    mode: ValidationMode,
    check_surface: bool,
}

impl<'a> Validator<'a> {
    pub(crate) fn new(index: &'a TokenIndex, vocab: &'a Vocabulary, mode: ValidationMode, check_surface: bool) -> Self {
        let passages = index.passages.iter().map(|p| (p.passage_id.as_str(), p.span())).collect();
        Validator { index, vocab, passages, mode, check_surface }
    }

    /// Check (and in repair mode fix) `rows`. On success the rows come back
    /// sorted by (work slug, passage, start, end).
    pub(crate) fn run(&self, rows: Vec<(usize, Value)>) -> Result<Vec<Mention>, ValidationReport> {
        let mut report = ValidationReport::default();
        let mut out = Vec::with_capacity(rows.len());
        let mut repaired = 0usize;

        for (line, value) in rows {
            if let Some((row, fixed)) = self.check_row(line, value, &mut report) {
                if fixed {
                    repaired += 1;
                }
                out.push(row);
            }
        }

        if !report.is_empty() {
            info!(violations = report.violations.len(), "validation failed");
            return Err(report);
        }

        out.sort_by(|x, y| {
            (&x.work_slug, &x.passage_id, x.token_start, x.token_end).cmp(&(
                &y.work_slug,
                &y.passage_id,
                y.token_start,
                y.token_end,
            ))
        });
        debug!(rows = out.len(), repaired, mode = ?self.mode, "validation passed");
        Ok(out)
    }

    /// The flag is set when repair mode changed the row.
    fn check_row(&self, line: usize, mut value: Value, report: &mut ValidationReport) -> Option<(Mention, bool)> {
        let Some(obj) = value.as_object_mut() else {
            report.push(Violation::shape(line, "record is not a JSON object"));
            return None;
        };

        let missing: Vec<&str> =
            REQUIRED.iter().filter(|names| !names.iter().any(|n| obj.contains_key(*n))).map(|names| names[0]).collect();
        if !missing.is_empty() {
            report.push(Violation::shape(line, format!("missing fields: {missing:?}")));
            return None;
        }

        let raw_certainty = obj.get("certainty").cloned().unwrap_or(Value::Null);
        let read = read_certainty(&raw_certainty);
        let certainty = match read {
            CertaintyRead::Canonical(c) | CertaintyRead::Respelled(c) | CertaintyRead::Score(c) => c,
            CertaintyRead::Unknown if self.mode == ValidationMode::Repair => Certainty::Low,
            CertaintyRead::Unknown => {
                report.push(Violation::consistency(line, format!("certainty outside vocabulary: {raw_certainty}")));
                return None;
            }
        };
        obj.insert("certainty".to_string(), Value::String(certainty.as_str().to_string()));

        let mut row: Mention = match serde_json::from_value(value) {
            Ok(row) => row,
            Err(err) => {
                report.push(Violation::shape(line, format!("malformed record: {err}")));
                return None;
            }
        };

        if let CertaintyRead::Score(_) = read {
            row.push_note("CERTAINTY_FROM_SCORE");
        }
        let before = report.violations.len();
        let notes_before = row.notes.clone();
        self.check_shape(line, &row, report);
        let in_bounds = self.check_bounds(line, &row, report);

        match read {
            CertaintyRead::Canonical(_) | CertaintyRead::Score(_) => {}
            CertaintyRead::Respelled(_) => {
                self.consistency(line, &mut row, report, "FIXED_CERTAINTY", || {
                    format!("certainty {raw_certainty} is not canonical (expected {:?})", certainty.as_str())
                });
            }
            CertaintyRead::Unknown => {
                debug!(line, fix = "FIXED_CERTAINTY_UNKNOWN", "record repaired");
                row.push_note("FIXED_CERTAINTY_UNKNOWN");
            }
        }

        if in_bounds && (self.check_surface || self.mode == ValidationMode::Repair) {
            if let Some(expected) = self.index.surface(row.span()) {
                if row.surface != expected {
                    let detail = format!("surface mismatch (got {:?}, expected {expected:?})", row.surface);
                    if self.mode == ValidationMode::Repair {
                        row.surface = expected;
                    }
                    self.consistency(line, &mut row, report, "FIXED_SURFACE", || detail);
                }
            }
        }

        let expected_norm = normalize(&row.surface);
        if row.surface_norm != expected_norm {
            let detail = format!("surface_norm mismatch (got {:?}, expected {expected_norm:?})", row.surface_norm);
            if self.mode == ValidationMode::Repair {
                row.surface_norm = expected_norm;
            }
            self.consistency(line, &mut row, report, "FIXED_SURFACE_NORM", || detail);
        }

        if report.violations.len() > before {
            return None;
        }
        let fixed = self.mode == ValidationMode::Repair && row.notes != notes_before;
        if self.mode == ValidationMode::Repair {
            row.mention_id = Some(mention_id(&row.work_slug, &row.passage_id, row.span(), &row.annotator_id));
        }
        Some((row, fixed))
    }

    fn check_shape(&self, line: usize, row: &Mention, report: &mut ValidationReport) {
        if !self.vocab.is_mention_type(&row.mention_type) {
            report.push(Violation::shape(line, format!("illegal type: {}", row.mention_type)));
        }
        if let Some(entity_type) = &row.entity_type {
            if !self.vocab.linking_types().contains(entity_type.as_str()) {
                report.push(Violation::shape(line, format!("illegal entity type: {entity_type}")));
            }
        }
        if row.work_id != self.index.work_id {
            report.push(Violation::shape(
                line,
                format!("work_id {} != token index work_id {}", row.work_id, self.index.work_id),
            ));
        }
        if row.work_slug != self.index.work_slug {
            report.push(Violation::shape(
                line,
                format!("work_slug {} != token index work_slug {}", row.work_slug, self.index.work_slug),
            ));
        }
        if chrono::DateTime::parse_from_rfc3339(&row.timestamp).is_err() {
            report.push(Violation::shape(line, format!("unparsable timestamp: {:?}", row.timestamp)));
        }
    }

    fn check_bounds(&self, line: usize, row: &Mention, report: &mut ValidationReport) -> bool {
        let len = self.index.tokens.len();
        let span = row.span();
        let mut ok = true;
        if !(span.start < span.end && span.end <= len) {
            report.push(Violation::bounds(line, format!("token span out of bounds: {}-{} (len={len})", span.start, span.end)));
            ok = false;
        }
        match self.passages.get(row.passage_id.as_str()) {
            Some(passage) if !passage.contains(&span) => {
                report.push(Violation::bounds(
                    line,
                    format!(
                        "span {}-{} not within passage range {}-{} for {}",
                        span.start, span.end, passage.start, passage.end, row.passage_id
                    ),
                ));
                ok = false;
            }
            Some(_) => {}
            None => {
                report.push(Violation::bounds(line, format!("passage not found in token index: {}", row.passage_id)));
                ok = false;
            }
        }
        ok
    }

    /// Report a consistency problem in strict mode, or note the fix in repair
    /// mode. The caller has already applied the fix.
    fn consistency(
        &self,
        line: usize,
        row: &mut Mention,
        report: &mut ValidationReport,
        tag: &str,
        detail: impl FnOnce() -> String,
    ) {
        match self.mode {
            ValidationMode::Strict => report.push(Violation::consistency(line, detail())),
            ValidationMode::Repair => {
                debug!(line, fix = tag, "record repaired");
                row.push_note(tag);
            }
        }
    }
}

/// Structural checks on a token index. `line` in the returned violations is
/// the 1-based passage position, or 0 for stream-wide problems.
pub(crate) fn validate_index(index: &TokenIndex) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();

    if !index.is_current() {
        report.push(Violation::consistency(
            0,
            format!(
                "index built with {}/{}, current is {}/{}",
                index.tokenizer_version,
                index.normalizer_version,
                crate::TOKENIZER_VERSION,
                crate::NORMALIZER_VERSION
            ),
        ));
    }
    if index.tokens.len() != index.tokens_norm.len() {
        report.push(Violation::shape(
            0,
            format!("{} tokens but {} normalized tokens", index.tokens.len(), index.tokens_norm.len()),
        ));
    }
    for (i, (raw, norm)) in index.tokens.iter().zip(&index.tokens_norm).enumerate() {
        if raw.is_empty() {
            report.push(Violation::shape(0, format!("token {i} is empty")));
        }
        if *norm != normalize(raw) {
            report.push(Violation::consistency(0, format!("token {i}: normalized form {norm:?} is stale")));
        }
    }

    let mut seen = HashSet::new();
    let mut cursor = 0usize;
    for (i, passage) in index.passages.iter().enumerate() {
        let line = i + 1;
        if !seen.insert(passage.passage_id.as_str()) {
            report.push(Violation::shape(line, format!("duplicate passage id {}", passage.passage_id)));
        }
        let span = passage.span();
        if span.is_empty() || span.end > index.tokens.len() {
            report.push(Violation::bounds(line, format!("passage {} has invalid range {span}", passage.passage_id)));
        }
        if span.start < cursor {
            report.push(Violation::bounds(
                line,
                format!("passage {} starts at {} before the previous passage ends at {cursor}", passage.passage_id, span.start),
            ));
        }
        cursor = cursor.max(span.end);
    }

    if report.is_empty() { Ok(()) } else { Err(report) }
}
