//! Demo open-coder and demo adjudicator.
//!
//! Both are stand-ins behind traits so that a real annotation source or a
//! human adjudication step can replace them without touching the engine.
//! Their output is smoke-test data, not gold-standard logic.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::engine::{QueueEntry, mention_id};
use crate::{Certainty, Context, Mention, Span, TokenIndex, normalize};

// --- Open coding ------------------------------------------------------------

/// Produces one annotator's mention stream for a work.
pub trait OpenCoder {
    fn code(&self, index: &TokenIndex, annotator_id: &str, ctx: &Context) -> Vec<Mention>;
}

/// What a guard sees of the token being classified.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TokenView<'a> {
    pub norm: &'a str,
    pub annotator_id: &'a str,
}

pub(crate) type Guard = fn(&TokenView<'_>) -> bool;

/// A stem pattern over the normalized token plus an optional guard. The
/// first rule whose pattern and guard both hold decides the type.
pub(crate) struct StemRule {
    pub name: &'static str,
    pub pattern: &'static Regex,
    pub guard: Option<Guard>,
    pub mention_type: &'static str,
    pub certainty: Certainty,
    pub note: &'static str,
}

impl StemRule {
    fn matches(&self, view: &TokenView<'_>) -> bool {
        self.pattern.is_match(view.norm) && self.guard.is_none_or(|guard| guard(view))
    }
}

impl std::fmt::Debug for StemRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StemRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("mention_type", &self.mention_type)
            .field("certainty", &self.certainty)
            .finish()
    }
}

fn looks_verbal(view: &TokenView<'_>) -> bool {
    regex!("(?:ειν|ει|εσθαι|ησαι)$").is_match(view.norm)
}

fn property_noun_or_not_verbal(view: &TokenView<'_>) -> bool {
    regex!("(?:της$|τητα)").is_match(view.norm) || !looks_verbal(view)
}

fn annotator_b(view: &TokenView<'_>) -> bool {
    view.annotator_id.to_uppercase().starts_with('B')
}

static DEMO_RULES: Lazy<Vec<StemRule>> = Lazy::new(|| {
    vec![
        stem_rule! {
            name: "measure_digits",
            pattern: r"\d",
            emit: ("MEASURE", Certainty::Med),
        },
        stem_rule! {
            name: "measure_stem",
            pattern: "δραχμ|κοτυλ|λιτρ|μετρ|ουγκ|σταθμ",
            emit: ("MEASURE", Certainty::High),
        },
        stem_rule! {
            name: "instrument_stem",
            pattern: "αγγει|σκευ|κεραμ|χαλκ|υαλ|κρυσταλλ|κονδυλ",
            emit: ("INSTRUMENT", Certainty::Med),
        },
        stem_rule! {
            name: "action_verbal",
            pattern: "θερμαιν|ψυχει|ξηραιν|υγραιν|καθαρ|καθαιρ|εμετ|πταρμ|βηχ|τριβ|μιγν|ζε|εψη|κοπ|λει|κονι",
            guard: looks_verbal,
            emit: ("ACTION", Certainty::High),
        },
        stem_rule! {
            name: "quality_stem",
            pattern: "θερμ|ψυχρ|ξηρ|υγρ|γλυκ|πικρ|αλμυρ|οσμη|χρωμ",
            guard: property_noun_or_not_verbal,
            emit: ("QUALITY", Certainty::High),
        },
        // Annotator B over-tags temperature/moisture stems as qualities.
        stem_rule! {
            name: "quality_annotator_b",
            pattern: "θερμ|ψυχρ|ξηρ|υγρ",
            guard: annotator_b,
            emit: ("QUALITY", Certainty::Med, "HEURISTIC_B_PREFERS_QUALITY"),
        },
        stem_rule! {
            name: "material_stem",
            pattern: "φαρμακ|υδωρ|πυρεθρ|καστορι|υοσκυαμ|μανδραγορ|τροφ|πυρ|μελι|οινος|ελαι",
            emit: ("MATERIAL", Certainty::High),
        },
    ]
});

const FALLBACK: (&str, Certainty, &str) = ("MATERIAL", Certainty::Low, "HEURISTIC_DEFAULT_UNCERTAIN");

/// Type, certainty and note for one normalized token.
pub(crate) fn classify(norm: &str, annotator_id: &str) -> (&'static str, Certainty, &'static str) {
    let view = TokenView { norm, annotator_id };
    DEMO_RULES
        .iter()
        .find(|rule| rule.matches(&view))
        .map(|rule| (rule.mention_type, rule.certainty, rule.note))
        .unwrap_or(FALLBACK)
}

/// Tokens worth coding: substances, qualities and measures.
fn is_trigger(norm: &str) -> bool {
    regex!("φαρμακ|θερμ|ψυχρ|ξηρ|υγρ|υδωρ|πυρεθρ|καστορι|υοσκυαμ|μανδραγορ|δραχμ|κοτυλ|μετρ").is_match(norm)
}

/// Single-token stem heuristics over every passage.
///
/// Picks up to `max_per_passage` trigger tokens per passage (the first token
/// when none trigger) and classifies each with the stem rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StemCoder {
    pub max_per_passage: usize,
}

impl Default for StemCoder {
    fn default() -> Self {
        StemCoder { max_per_passage: 3 }
    }
}

impl OpenCoder for StemCoder {
    fn code(&self, index: &TokenIndex, annotator_id: &str, ctx: &Context) -> Vec<Mention> {
        let timestamp = ctx.timestamp_string();
        let mut rows = Vec::new();

        for passage in &index.passages {
            let Some(raw) = index.passage_tokens(passage) else { continue };
            if raw.is_empty() {
                continue;
            }
            let norms: Vec<String> = match index.passage_norms(passage) {
                Some(norms) => norms.to_vec(),
                None => raw.iter().map(|t| normalize(t)).collect(),
            };

            let mut chosen: Vec<usize> =
                norms.iter().enumerate().filter(|(_, n)| is_trigger(n)).map(|(i, _)| i).take(self.max_per_passage).collect();
            if chosen.is_empty() {
                chosen.push(0);
            }

            for i in chosen {
                let (mention_type, certainty, note) = classify(&norms[i], annotator_id);
                let start = passage.token_start + i;
                let span = Span::new(start, start + 1);
                rows.push(Mention {
                    work_id: index.work_id.clone(),
                    passage_id: passage.passage_id.clone(),
                    work_slug: index.work_slug.clone(),
                    token_start: span.start,
                    token_end: span.end,
                    surface: raw[i].clone(),
                    surface_norm: normalize(&raw[i]),
                    mention_type: mention_type.to_string(),
                    certainty,
                    annotator_id: annotator_id.to_string(),
                    timestamp: timestamp.clone(),
                    mention_id: Some(mention_id(&index.work_slug, &passage.passage_id, span, annotator_id)),
                    entity_type: None,
                    entity_id: None,
                    link_method: None,
                    link_confidence: None,
                    evidence_window: Some(index.passage_window(passage, span, 5, 5)),
                    notes: note.to_string(),
                });
            }
        }

        rows.sort_by(|x, y| (x.output_order(), &x.annotator_id).cmp(&(y.output_order(), &y.annotator_id)));
        debug!(annotator_id, mentions = rows.len(), "demo open coding finished");
        rows
    }
}

// --- Adjudication -----------------------------------------------------------

/// Resolves one adjudication queue entry into a decision row.
pub trait Adjudicator {
    /// `None` leaves the entry undecided.
    fn decide(&self, entry: &QueueEntry, ctx: &Context) -> Option<Mention>;
}

/// Keeps A when both sides agree on type, otherwise the more certain side
/// (A on equal certainty). Single-sided entries keep their only row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoAdjudicator {
    pub annotator_id: String,
}

impl Default for DemoAdjudicator {
    fn default() -> Self {
        DemoAdjudicator { annotator_id: "ADJUDICATOR_AUTO".to_string() }
    }
}

impl Adjudicator for DemoAdjudicator {
    fn decide(&self, entry: &QueueEntry, ctx: &Context) -> Option<Mention> {
        let chosen = match (&entry.a, &entry.b) {
            (Some(a), Some(b)) if a.mention_type == b.mention_type || a.certainty >= b.certainty => a,
            (Some(_), Some(b)) => b,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        let mut out = chosen.clone();
        out.annotator_id = self.annotator_id.clone();
        out.timestamp = ctx.timestamp_string();
        out.notes = "AUTO_ADJUDICATED_MVP".to_string();
        out.evidence_window = Some(entry.evidence_window.clone());
        out.entity_type = None;
        out.entity_id = None;
        out.link_method = None;
        out.link_confidence = None;
        Some(out)
    }
}
