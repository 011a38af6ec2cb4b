#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod io;
mod lexicon;
mod rules;
mod text;
mod validate;

pub use api::{
    Context, Options, adjudicate, adjudication_queue, agreement, build_gold, build_lexicon, check_index, index_work,
    link, open_code, read_mentions, repair_mentions, review_queue, tag, validate_mentions,
};
pub use engine::{
    AgreementReport, ConsolidationRun, ConsolidationSummary, CoverageReport, Disagreement, DisagreementReason, DocNode,
    LinkRun, MatchMode, MatchedPair, PassageMatching, Provenance, QueueEntry, QueueReasons, ReviewEntry, ReviewFlags,
    StageMetrics, TaggerRun, Unlinked, entity_id, gold_mention_id, match_mentions, mention_id, overlap_score,
};
pub use error::{Error, Result, ValidationReport, Violation, ViolationKind};
pub use io::{read_json, read_jsonl, read_jsonl_values, write_json, write_jsonl};
pub use lexicon::{Candidate, ExactTable, Lexicon, PhraseTable, bootstrap_entities};
pub use rules::demo::{Adjudicator, DemoAdjudicator, OpenCoder, StemCoder};
pub use text::{NORMALIZER_VERSION, TOKENIZER_VERSION, normalize, tokenize};
pub use validate::ValidationMode;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// --- Spans ------------------------------------------------------------------

/// Half-open token range `[start, end)` in the work-global offset space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Number of tokens covered. Inverted spans count as empty.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersection_len(&self, other: &Span) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.intersection_len(other) > 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

// --- Closed vocabularies ----------------------------------------------------

/// Annotator certainty, ordered `low < med < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Low,
    Med,
    High,
}

impl Certainty {
    /// Integer rank on a 0..=100 scale (`low` = 0, `med` = 50, `high` = 100).
    pub fn rank(self) -> u8 {
        match self {
            Certainty::Low => 0,
            Certainty::Med => 50,
            Certainty::High => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Certainty::Low => "low",
            Certainty::Med => "med",
            Certainty::High => "high",
        }
    }

    /// Parse a raw certainty label.
    ///
    /// Returns the parsed value and whether the input had to be corrected
    /// (`"medium"`, stray case or whitespace).
    pub fn parse(raw: &str) -> Option<(Certainty, bool)> {
        let folded = raw.trim().to_lowercase();
        let value = match folded.as_str() {
            "low" => Certainty::Low,
            "med" => Certainty::Med,
            "medium" => Certainty::Med,
            "high" => Certainty::High,
            _ => return None,
        };
        Some((value, folded != raw || folded == "medium"))
    }

    /// Bucket a `0..=1` score by its rank: below 25 is `low`, below 75 is
    /// `med`, the rest `high`. Scores outside the range (or NaN) are rejected.
    pub fn from_score(score: f64) -> Option<Certainty> {
        if !(0.0..=1.0).contains(&score) {
            return None;
        }
        let rank = (score * 100.0).round() as u8;
        Some(match rank {
            0..=24 => Certainty::Low,
            25..=74 => Certainty::Med,
            _ => Certainty::High,
        })
    }
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entity id was attached to a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMethod {
    /// Lexicon tagger n-gram hit.
    VariantNorm,
    /// Linker exact lookup of `surface_norm`.
    ExactNorm,
}

/// Mention-type vocabulary plus the mapping onto the linking vocabulary.
///
/// Built once per run and handed to every component through [`Context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    mention_types: BTreeSet<String>,
    linking: BTreeMap<String, String>,
}

impl Vocabulary {
    pub fn new<'a>(
        mention_types: impl IntoIterator<Item = &'a str>,
        linking: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Vocabulary {
            mention_types: mention_types.into_iter().map(str::to_string).collect(),
            linking: linking.into_iter().map(|(m, l)| (m.to_string(), l.to_string())).collect(),
        }
    }

    /// The historical-text vocabulary the pipeline ships with.
    pub fn standard() -> Self {
        Vocabulary::new(
            ["PLACE", "INSTRUMENT", "ACTION", "QUALITY", "MATERIAL", "MEASURE", "PERSON_GROUP"],
            [
                ("PLACE", "PLACE"),
                ("INSTRUMENT", "TOOL"),
                ("ACTION", "PROCESS"),
                ("QUALITY", "PROPERTY"),
                ("MATERIAL", "MATERIAL"),
                ("MEASURE", "MEASURE"),
                ("PERSON_GROUP", "PERSON_GROUP"),
            ],
        )
    }

    pub fn is_mention_type(&self, code: &str) -> bool {
        self.mention_types.contains(code)
    }

    pub fn mention_types(&self) -> impl Iterator<Item = &str> {
        self.mention_types.iter().map(String::as_str)
    }

    /// Linking-vocabulary type for a mention type, if it has one.
    pub fn linking_type(&self, mention_type: &str) -> Option<&str> {
        self.linking.get(mention_type).map(String::as_str)
    }

    /// Reverse of [`Vocabulary::linking_type`]; the first mention type in
    /// code order wins when several map to the same linking type.
    pub fn mention_type_for(&self, linking_type: &str) -> Option<&str> {
        self.linking.iter().find(|(_, l)| l.as_str() == linking_type).map(|(m, _)| m.as_str())
    }

    pub fn linking_types(&self) -> BTreeSet<&str> {
        self.linking.values().map(String::as_str).collect()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary::standard()
    }
}

// --- Token stream and passages ----------------------------------------------

/// Contiguous token range of one leaf content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    #[serde(alias = "passage_urn")]
    pub passage_id: String,
    #[serde(alias = "passage_ref")]
    pub reference_path: String,
    pub token_start: usize,
    pub token_end: usize,
}

impl Passage {
    pub fn span(&self) -> Span {
        Span::new(self.token_start, self.token_end)
    }
}

/// Token stream of one work together with its passage map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIndex {
    #[serde(alias = "work_urn")]
    pub work_id: String,
    pub work_slug: String,
    pub tokenizer_version: String,
    pub normalizer_version: String,
    pub tokens: Vec<String>,
    pub tokens_norm: Vec<String>,
    pub passages: Vec<Passage>,
}

impl TokenIndex {
    pub fn passage(&self, passage_id: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.passage_id == passage_id)
    }

    /// Raw tokens of `passage`, or `None` if its range is outside the stream.
    pub fn passage_tokens(&self, passage: &Passage) -> Option<&[String]> {
        self.tokens.get(passage.token_start..passage.token_end)
    }

    pub fn passage_norms(&self, passage: &Passage) -> Option<&[String]> {
        self.tokens_norm.get(passage.token_start..passage.token_end)
    }

    /// Surface text for a span: raw tokens joined by a single space.
    pub fn surface(&self, span: Span) -> Option<String> {
        self.tokens.get(span.start..span.end).map(|t| t.join(" "))
    }

    /// Up to `radius` tokens on each side of `span`, clamped to the stream.
    pub fn evidence_window(&self, span: Span, radius: usize) -> Vec<String> {
        let lo = span.start.saturating_sub(radius).min(self.tokens.len());
        let hi = span.end.saturating_add(radius).min(self.tokens.len());
        if lo >= hi {
            return Vec::new();
        }
        self.tokens[lo..hi].to_vec()
    }

    /// Raw tokens from `before` ahead of `span` to `after` past its end,
    /// never leaving `passage`.
    pub fn passage_window(&self, passage: &Passage, span: Span, before: usize, after: usize) -> Vec<String> {
        let lo = span.start.saturating_sub(before).max(passage.token_start);
        let hi = span.end.saturating_add(after).min(passage.token_end).min(self.tokens.len());
        if lo >= hi {
            return Vec::new();
        }
        self.tokens[lo..hi].to_vec()
    }

    /// Whether this index was built by the current tokenizer and normalizer.
    pub fn is_current(&self) -> bool {
        self.tokenizer_version == TOKENIZER_VERSION && self.normalizer_version == NORMALIZER_VERSION
    }
}

// --- Mentions and entities --------------------------------------------------

/// One annotator's (or automated pass's) typed claim about a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(alias = "work_urn")]
    pub work_id: String,
    #[serde(alias = "passage_urn")]
    pub passage_id: String,
    pub work_slug: String,
    pub token_start: usize,
    pub token_end: usize,
    pub surface: String,
    pub surface_norm: String,
    #[serde(rename = "type", alias = "provisional_type")]
    pub mention_type: String,
    pub certainty: Certainty,
    pub annotator_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_id: Option<String>,
    /// Linking-vocabulary type, set once the mention is linked.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "mvo_type")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_method: Option<LinkMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_confidence: Option<Certainty>,
    /// Passage tokens around the mention, as shown to a reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_window: Option<Vec<String>>,
    #[serde(default)]
    pub notes: String,
}

impl Mention {
    pub fn span(&self) -> Span {
        Span::new(self.token_start, self.token_end)
    }

    /// Append a provenance or repair tag to `notes`.
    pub fn push_note(&mut self, tag: &str) {
        if self.notes.is_empty() {
            self.notes = tag.to_string();
        } else {
            self.notes.push('|');
            self.notes.push_str(tag);
        }
    }

    pub(crate) fn output_order(&self) -> (&str, &str, usize, usize) {
        (&self.work_id, &self.passage_id, self.token_start, self.token_end)
    }
}

/// A canonical referent within one linking type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    #[serde(rename = "type", alias = "mvo_type")]
    pub entity_type: String,
    pub preferred_label: String,
    pub preferred_label_norm: String,
}

/// One known surface form of an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LexiconVariant {
    pub entity_id: String,
    pub preferred_label: String,
    pub variant: String,
    pub variant_norm: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_arithmetic() {
        let a = Span::new(10, 14);
        let b = Span::new(12, 16);
        assert_eq!(a.intersection_len(&b), 2);
        assert!(a.overlaps(&b));
        assert!(!a.contains(&b));
        assert!(Span::new(0, 20).contains(&a));
        assert!(Span::new(5, 5).is_empty());
        assert_eq!(Span::new(5, 3).len(), 0);
        assert_eq!(a.to_string(), "[10,14)");
    }

    #[test]
    fn certainty_parse_flags_corrections() {
        assert_eq!(Certainty::parse("high"), Some((Certainty::High, false)));
        assert_eq!(Certainty::parse("medium"), Some((Certainty::Med, true)));
        assert_eq!(Certainty::parse(" Low "), Some((Certainty::Low, true)));
        assert_eq!(Certainty::parse("sure"), None);
        assert!(Certainty::Low < Certainty::Med && Certainty::Med < Certainty::High);
    }

    #[test]
    fn scores_bucket_in_rank_order() {
        assert_eq!(Certainty::from_score(0.0), Some(Certainty::Low));
        assert_eq!(Certainty::from_score(0.24), Some(Certainty::Low));
        assert_eq!(Certainty::from_score(0.5), Some(Certainty::Med));
        assert_eq!(Certainty::from_score(0.9), Some(Certainty::High));
        assert_eq!(Certainty::from_score(1.0), Some(Certainty::High));
        assert_eq!(Certainty::from_score(1.2), None);
        assert_eq!(Certainty::from_score(-0.1), None);
        assert_eq!(Certainty::from_score(f64::NAN), None);
    }

    #[test]
    fn standard_vocabulary_maps_both_ways() {
        let vocab = Vocabulary::standard();
        assert!(vocab.is_mention_type("QUALITY"));
        assert!(!vocab.is_mention_type("PROPERTY"));
        assert_eq!(vocab.linking_type("INSTRUMENT"), Some("TOOL"));
        assert_eq!(vocab.mention_type_for("PROCESS"), Some("ACTION"));
        assert_eq!(vocab.mention_type_for("UNKNOWN"), None);
        assert_eq!(vocab.linking_types().len(), 7);
    }

    #[test]
    fn mention_reads_legacy_field_names() {
        let raw = r#"{"work_urn":"w","passage_urn":"w:1.1","work_slug":"s","token_start":0,"token_end":1,
            "surface":"abc","surface_norm":"abc","provisional_type":"PLACE","certainty":"high",
            "annotator_id":"A","timestamp":"2000-01-01T00:00:00Z"}"#;
        let m: Mention = serde_json::from_str(raw).unwrap();
        assert_eq!(m.work_id, "w");
        assert_eq!(m.passage_id, "w:1.1");
        assert_eq!(m.mention_type, "PLACE");
        assert_eq!(m.notes, "");

        let out = serde_json::to_string(&m).unwrap();
        assert!(out.contains(r#""type":"PLACE""#));
        assert!(!out.contains("mention_id"));
    }

    #[test]
    fn notes_are_pipe_joined() {
        let raw = r#"{"work_id":"w","passage_id":"p","work_slug":"s","token_start":0,"token_end":1,
            "surface":"a","surface_norm":"a","type":"PLACE","certainty":"low","annotator_id":"A","timestamp":"t"}"#;
        let mut m: Mention = serde_json::from_str(raw).unwrap();
        m.push_note("FIXED_CERTAINTY");
        m.push_note("AUTO_TIEBREAK");
        assert_eq!(m.notes, "FIXED_CERTAINTY|AUTO_TIEBREAK");
    }
}
