use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::engine::{self, AgreementReport, ConsolidationRun, DocNode, MatchMode, QueueEntry, ReviewEntry, TaggerRun};
use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::rules::demo::{Adjudicator, OpenCoder};
use crate::validate::{ValidationMode, Validator, validate_index};
use crate::{Entity, LinkRun, Mention, TokenIndex, Vocabulary};

/// Environment shared by every stage.
///
/// Holds what outputs are stamped with, so a fixed context makes every stage
/// reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub vocabulary: Vocabulary,
    /// Canonical timestamp written on gold and automatically produced rows.
    pub timestamp: DateTime<Utc>,
    /// Annotator id stamped on consolidated gold rows.
    pub merge_annotator_id: String,
    /// Annotator id stamped on lexicon-tagged mentions.
    pub lexicon_annotator_id: String,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::standard(),
            timestamp: DateTime::<Utc>::from_timestamp(946_684_800, 0).unwrap_or_default(),
            merge_annotator_id: "ADJUDICATOR_MERGE".to_string(),
            lexicon_annotator_id: "AUTO_LEXICON".to_string(),
        }
    }
}

impl Context {
    /// RFC 3339 form of [`Context::timestamp`], e.g. `2000-01-01T00:00:00Z`.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Options that affect matching, tagging and validation behavior.
///
/// Deserializable from a JSON config file; omitted fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Matching mode for agreement reports.
    pub match_mode: MatchMode,
    /// Minimum Jaccard overlap for an overlap match.
    pub overlap_threshold: f64,
    /// Evidence tokens kept on each side of a queued span.
    pub window: usize,
    /// Longest lexicon n-gram the tagger tries.
    pub max_ngram: usize,
    /// Fail validation on consistency problems instead of repairing them.
    pub strict: bool,
    /// Compare `surface` against the token stream during strict validation.
    pub check_surface: bool,
    /// Stop indexing after this many passages.
    pub max_passages: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::Overlap,
            overlap_threshold: 0.5,
            window: 12,
            max_ngram: 5,
            strict: false,
            check_surface: false,
            max_passages: None,
        }
    }
}

impl Options {
    /// Read options from a JSON file and check them.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let options: Options = crate::io::read_json(path)?;
        options.check()?;
        Ok(options)
    }

    pub fn check(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(Error::Config(format!("overlap_threshold must lie in [0, 1], got {}", self.overlap_threshold)));
        }
        if self.max_ngram == 0 {
            return Err(Error::Config("max_ngram must be at least 1".to_string()));
        }
        if self.max_passages == Some(0) {
            return Err(Error::Config("max_passages must be at least 1 when set".to_string()));
        }
        Ok(())
    }

    fn validation_mode(&self) -> ValidationMode {
        if self.strict { ValidationMode::Strict } else { ValidationMode::Repair }
    }
}

// --- Token index ------------------------------------------------------------

/// Build the token index of one work from its document tree.
///
/// # Example
/// ```
/// use goldweave::{DocNode, Options, index_work};
///
/// let doc = DocNode::Section {
///     label: Some("1".into()),
///     children: vec![DocNode::Block { text: "ὕδωρ καὶ πῦρ".into() }],
/// };
/// let index = index_work("urn:w", "w", &doc, &Options::default()).unwrap();
/// assert_eq!(index.passages[0].passage_id, "urn:w:1.1");
/// assert_eq!(index.tokens.len(), 3);
/// ```
pub fn index_work(work_id: &str, work_slug: &str, root: &DocNode, options: &Options) -> Result<TokenIndex> {
    let index = engine::build_index(work_id, work_slug, root, options.max_passages);
    validate_index(&index)?;
    info!(work_slug, passages = index.passages.len(), tokens = index.tokens.len(), "work indexed");
    Ok(index)
}

/// Structural check of a token index loaded from disk.
pub fn check_index(index: &TokenIndex) -> Result<()> {
    validate_index(index).map_err(Error::from)
}

// --- Validation -------------------------------------------------------------

/// Validate raw mention rows without changing them.
///
/// Every violation in `rows` is collected into one [`Error::Validation`].
pub fn validate_mentions(
    index: &TokenIndex,
    rows: Vec<(usize, Value)>,
    ctx: &Context,
    options: &Options,
) -> Result<Vec<Mention>> {
    let validator = Validator::new(index, &ctx.vocabulary, ValidationMode::Strict, options.check_surface);
    validator.run(rows).map_err(Error::from)
}

/// Validate raw mention rows, fixing consistency problems unless
/// `options.strict` is set. Shape and bounds problems stay fatal.
pub fn repair_mentions(
    index: &TokenIndex,
    rows: Vec<(usize, Value)>,
    ctx: &Context,
    options: &Options,
) -> Result<Vec<Mention>> {
    let validator = Validator::new(index, &ctx.vocabulary, options.validation_mode(), options.check_surface);
    validator.run(rows).map_err(Error::from)
}

/// Read a mention JSONL file and validate it against `index` in strict mode.
///
/// Stages downstream of validation load their inputs through this, so a bad
/// file is reported with every offending line instead of the first parse error.
pub fn read_mentions(path: impl AsRef<Path>, index: &TokenIndex, ctx: &Context, options: &Options) -> Result<Vec<Mention>> {
    let rows = crate::io::read_jsonl_values(path)?;
    validate_mentions(index, rows, ctx, options)
}

// --- Reconciliation ---------------------------------------------------------

/// Inter-annotator agreement between two mention streams.
pub fn agreement(a: &[Mention], b: &[Mention], options: &Options) -> AgreementReport {
    engine::compute_agreement(a, b, options.match_mode, options.overlap_threshold)
}

/// Entries needing adjudication. Always uses overlap matching.
pub fn adjudication_queue(a: &[Mention], b: &[Mention], index: &TokenIndex, options: &Options) -> Vec<QueueEntry> {
    engine::build_queue(a, b, index, options.overlap_threshold, options.window)
}

/// Run `adjudicator` over `queue`; undecided entries are dropped.
pub fn adjudicate(queue: &[QueueEntry], adjudicator: &dyn Adjudicator, ctx: &Context) -> Vec<Mention> {
    let mut decisions: Vec<Mention> = queue.iter().filter_map(|entry| adjudicator.decide(entry, ctx)).collect();
    decisions.sort_by(|x, y| x.output_order().cmp(&y.output_order()));
    info!(entries = queue.len(), decisions = decisions.len(), "queue adjudicated");
    decisions
}

/// Consolidate both annotator streams and adjudicated decisions into gold.
pub fn build_gold(a: &[Mention], b: &[Mention], decisions: &[Mention], ctx: &Context) -> ConsolidationRun {
    engine::consolidate(a, b, decisions, ctx)
}

// --- Lexicon, tagging and linking -------------------------------------------

/// Lexicon with one variant per entity, covering every linking type.
pub fn build_lexicon(entities: &[Entity], ctx: &Context) -> Lexicon {
    Lexicon::from_entities(entities, &ctx.vocabulary)
}

/// Propose new mentions from `lexicon` over every passage of `index`.
pub fn tag(index: &TokenIndex, lexicon: &Lexicon, ctx: &Context, options: &Options) -> Result<TaggerRun> {
    if !index.is_current() {
        warn!(
            work_slug = %index.work_slug,
            tokenizer = %index.tokenizer_version,
            normalizer = %index.normalizer_version,
            "token index was built by another tokenizer or normalizer version"
        );
    }
    let table = lexicon.phrase_table(&ctx.vocabulary, options.max_ngram);
    engine::tag(index, &table, ctx)
}

/// Link existing mentions by exact normalized surface.
pub fn link(mentions: &[Mention], lexicon: &Lexicon, ctx: &Context) -> LinkRun {
    engine::link(mentions, &lexicon.exact_table(), &ctx.vocabulary)
}

/// Review queue for automatically produced mentions.
pub fn review_queue(rows: &[Mention], index: &TokenIndex, options: &Options) -> Vec<ReviewEntry> {
    engine::build_review(rows, index, options.window)
}

/// Produce one annotator's mention stream with `coder`.
pub fn open_code(index: &TokenIndex, coder: &dyn OpenCoder, annotator_id: &str, ctx: &Context) -> Vec<Mention> {
    coder.code(index, annotator_id, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{index, mention, with_surface};
    use crate::{Certainty::*, DemoAdjudicator, StemCoder, bootstrap_entities};

    fn doc() -> DocNode {
        DocNode::Section {
            label: Some("1".into()),
            children: vec![
                DocNode::Block { text: "φάρμακον θερμόν".into() },
                DocNode::Block { text: "δραχμὰς ὕδατος".into() },
            ],
        }
    }

    #[test]
    fn default_context_is_fixed() {
        let ctx = Context::default();
        assert_eq!(ctx.timestamp_string(), "2000-01-01T00:00:00Z");
        assert_eq!(ctx.merge_annotator_id, "ADJUDICATOR_MERGE");
        assert_eq!(ctx.lexicon_annotator_id, "AUTO_LEXICON");
    }

    #[test]
    fn options_reject_bad_values() {
        assert!(Options::default().check().is_ok());
        let bad = Options { overlap_threshold: 1.5, ..Options::default() };
        assert!(matches!(bad.check(), Err(Error::Config(_))));
        let bad = Options { max_ngram: 0, ..Options::default() };
        assert!(matches!(bad.check(), Err(Error::Config(_))));
    }

    #[test]
    fn options_deserialize_partial_config() {
        let opts: Options = serde_json::from_str(r#"{"match_mode":"exact","window":3}"#).unwrap();
        assert_eq!(opts.match_mode, MatchMode::Exact);
        assert_eq!(opts.window, 3);
        assert_eq!(opts.max_ngram, 5);
        assert!(serde_json::from_str::<Options>(r#"{"windw":3}"#).is_err());

        let legacy: Options = serde_json::from_str(r#"{"match_mode":"overlap50"}"#).unwrap();
        assert_eq!(legacy.match_mode, MatchMode::Overlap);
    }

    #[test]
    fn index_work_honours_passage_cap() {
        let full = index_work("urn:w", "w", &doc(), &Options::default()).unwrap();
        assert_eq!(full.passages.len(), 2);
        let capped = index_work("urn:w", "w", &doc(), &Options { max_passages: Some(1), ..Options::default() }).unwrap();
        assert_eq!(capped.passages.len(), 1);
        assert_eq!(capped.tokens.len(), 2);
    }

    #[test]
    fn repair_fixes_what_validation_rejects() {
        let idx = index(&["abc", "def"], &[("1", 0, 2)]);
        let mut row = serde_json::to_value(with_surface(mention("1", 0, 1, "PLACE", High, "A"), "abc")).unwrap();
        row["surface_norm"] = "ABC".into();
        let rows = vec![(1, row)];
        let ctx = Context::default();

        let strict = Options { strict: true, ..Options::default() };
        assert!(matches!(validate_mentions(&idx, rows.clone(), &ctx, &strict), Err(Error::Validation(_))));
        assert!(repair_mentions(&idx, rows.clone(), &ctx, &strict).is_err());

        let fixed = repair_mentions(&idx, rows, &ctx, &Options::default()).unwrap();
        assert_eq!(fixed[0].surface_norm, "abc");
        assert!(fixed[0].notes.contains("FIXED_SURFACE_NORM"));
    }

    #[test]
    fn read_mentions_reports_every_bad_line() {
        let idx = index(&["abc", "def"], &[("1", 0, 2)]);
        let good = serde_json::to_string(&with_surface(mention("1", 0, 1, "PLACE", High, "A"), "abc")).unwrap();
        let out_of_range = serde_json::to_string(&mention("1", 1, 4, "PLACE", High, "A")).unwrap();
        let path = std::env::temp_dir().join(format!("goldweave-read-mentions-{}.jsonl", std::process::id()));
        std::fs::write(&path, format!("{good}\n{{\"surface\": 1}}\n{out_of_range}\n")).unwrap();

        let result = read_mentions(&path, &idx, &Context::default(), &Options::default());
        std::fs::remove_file(&path).unwrap();
        let report = match result {
            Err(Error::Validation(report)) => report,
            other => panic!("expected a validation error, got {other:?}"),
        };
        let lines: Vec<_> = report.violations.iter().map(|v| v.line).collect();
        assert_eq!(lines, vec![2, 3, 3]);
    }

    #[test]
    fn demo_pipeline_runs_end_to_end() {
        let ctx = Context::default();
        let opts = Options::default();
        let idx = index_work("urn:w", "w", &doc(), &opts).unwrap();

        let a = open_code(&idx, &StemCoder::default(), "A", &ctx);
        let b = open_code(&idx, &StemCoder::default(), "B", &ctx);
        assert!(!a.is_empty());

        let report = agreement(&a, &b, &opts);
        assert_eq!(report.total_a, a.len());

        let queue = adjudication_queue(&a, &b, &idx, &opts);
        let decisions = adjudicate(&queue, &DemoAdjudicator::default(), &ctx);
        assert_eq!(decisions.len(), queue.len());

        let gold = build_gold(&a, &b, &decisions, &ctx);
        let entities = bootstrap_entities(&gold.gold, &ctx.vocabulary);
        let lexicon = build_lexicon(&entities, &ctx);

        let linked = link(&gold.gold, &lexicon, &ctx);
        assert_eq!(linked.linked.len() + linked.unlinked.len(), gold.gold.len());

        let tagged = tag(&idx, &lexicon, &ctx, &opts).unwrap();
        assert_eq!(tagged.coverage.total_mentions, tagged.mentions.len());
        assert!(tagged.mentions.iter().all(|m| m.annotator_id == "AUTO_LEXICON"));

        let review = review_queue(&tagged.mentions, &idx, &opts);
        assert!(review.len() <= tagged.mentions.len());
    }
}
