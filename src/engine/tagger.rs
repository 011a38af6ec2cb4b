//! Lexicon tagger.
//!
//! Leftmost-longest scan over each passage's normalized tokens:
//!
//! ```text
//! i = 0
//! while i < len:
//!     for n in min(max_ngram, len - i) ..= 1:
//!         hit = table[norms[i .. i+n]]
//!         one candidate   → emit [i, i+n), i += n     (maximal munch)
//!         many candidates → skip, count it, i += 1    (precision first)
//!     nothing at any n    → i += 1
//! ```
//!
//! `i` strictly increases every iteration, so the scan terminates and no two
//! emitted mentions of one pass overlap.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use super::keys::mention_id;
use crate::error::{Error, Result};
use crate::lexicon::PhraseTable;
use crate::{Certainty, Context, LinkMethod, Mention, Span, TokenIndex, normalize};

/// Per-work tagging summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub work_slug: String,
    pub total_mentions: usize,
    pub ambiguous_skipped: usize,
    /// Emitted mentions per linking type.
    pub mentions_by_type: BTreeMap<String, usize>,
    /// Ambiguous skips per linking type of the candidates involved. A skip
    /// whose candidates span several types counts once for each.
    pub ambiguous_by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggerRun {
    pub mentions: Vec<Mention>,
    pub coverage: CoverageReport,
}

/// Tag every passage of `index` against `table`.
///
/// Fails with [`Error::Bounds`] if a passage range lies outside the token
/// stream; the index is then corrupt and nothing is emitted.
pub(crate) fn tag(index: &TokenIndex, table: &PhraseTable, ctx: &Context) -> Result<TaggerRun> {
    let timestamp = ctx.timestamp_string();
    let max_ngram = table.max_ngram().max(1);
    let mut coverage = CoverageReport { work_slug: index.work_slug.clone(), ..CoverageReport::default() };
    let mut mentions = Vec::new();

    for passage in &index.passages {
        let (Some(raw), Some(norms)) = (index.passage_tokens(passage), index.passage_norms(passage)) else {
            return Err(Error::Bounds {
                passage_id: passage.passage_id.clone(),
                span: passage.span(),
                len: index.tokens.len().min(index.tokens_norm.len()),
            });
        };

        let mut i = 0;
        while i < norms.len() {
            let longest = max_ngram.min(norms.len() - i);
            let hit = (1..=longest).rev().find_map(|n| table.lookup(&norms[i..i + n]).map(|c| (n, c)));

            let Some((n, candidates)) = hit else {
                i += 1;
                continue;
            };

            if candidates.len() > 1 {
                trace!(passage_id = %passage.passage_id, offset = passage.token_start + i, n, candidates = candidates.len(), "ambiguous n-gram skipped");
                coverage.ambiguous_skipped += 1;
                let types: BTreeSet<&str> = candidates.iter().map(|c| c.entity_type.as_str()).collect();
                for t in types {
                    *coverage.ambiguous_by_type.entry(t.to_string()).or_default() += 1;
                }
                i += 1;
                continue;
            }

            let Some(candidate) = candidates.iter().next() else {
                i += 1;
                continue;
            };
            let surface = raw[i..i + n].join(" ");
            let start = passage.token_start + i;
            let end = start + n;
            mentions.push(Mention {
                work_id: index.work_id.clone(),
                passage_id: passage.passage_id.clone(),
                work_slug: index.work_slug.clone(),
                token_start: start,
                token_end: end,
                surface_norm: normalize(&surface),
                surface,
                mention_type: candidate.mention_type.clone(),
                certainty: Certainty::Med,
                annotator_id: ctx.lexicon_annotator_id.clone(),
                timestamp: timestamp.clone(),
                mention_id: Some(mention_id(&index.work_slug, &passage.passage_id, Span::new(start, end), &ctx.lexicon_annotator_id)),
                entity_type: Some(candidate.entity_type.clone()),
                entity_id: Some(candidate.entity_id.clone()),
                link_method: Some(LinkMethod::VariantNorm),
                link_confidence: Some(Certainty::Med),
                evidence_window: Some(index.passage_window(passage, Span::new(start, end), 5, 6)),
                notes: String::new(),
            });
            *coverage.mentions_by_type.entry(candidate.entity_type.clone()).or_default() += 1;
            i += n;
        }
    }

    mentions.sort_by(|x, y| (x.output_order(), &x.mention_type).cmp(&(y.output_order(), &y.mention_type)));
    coverage.total_mentions = mentions.len();
    debug!(
        work_slug = %index.work_slug,
        mentions = coverage.total_mentions,
        ambiguous = coverage.ambiguous_skipped,
        "lexicon tagging finished"
    );
    Ok(TaggerRun { mentions, coverage })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::index;
    use crate::lexicon::Lexicon;
    use crate::{LexiconVariant, Vocabulary};
    use proptest::prelude::*;

    fn lexicon(rows: &[(&str, &str, &str)]) -> Lexicon {
        let mut lexicon = Lexicon::default();
        for (entity_type, entity_id, text) in rows {
            lexicon.insert(
                entity_type,
                LexiconVariant {
                    entity_id: entity_id.to_string(),
                    preferred_label: text.to_string(),
                    variant: text.to_string(),
                    variant_norm: normalize(text),
                },
            );
        }
        lexicon
    }

    #[test]
    fn longest_match_wins_and_cursor_jumps() {
        let ctx = Context::default();
        let idx = index(&["ὕδωρ", "ψυχρόν", "ὕδωρ", "πῦρ"], &[("1", 0, 4)]);
        let table = lexicon(&[
            ("MATERIAL", "ent_water", "ὕδωρ"),
            ("PROPERTY", "ent_cold_water", "ὕδωρ ψυχρόν"),
            ("PROPERTY", "ent_cold", "ψυχρόν"),
        ])
        .phrase_table(&Vocabulary::standard(), 5);

        let run = tag(&idx, &table, &ctx).unwrap();
        let spans: Vec<_> = run.mentions.iter().map(|m| (m.token_start, m.token_end, m.mention_type.as_str())).collect();
        assert_eq!(spans, vec![(0, 2, "QUALITY"), (2, 3, "MATERIAL")]);

        let first = &run.mentions[0];
        assert_eq!(first.surface, "ὕδωρ ψυχρόν");
        assert_eq!(first.surface_norm, "υδωρ ψυχρον");
        assert_eq!(first.entity_id.as_deref(), Some("ent_cold_water"));
        assert_eq!(first.entity_type.as_deref(), Some("PROPERTY"));
        assert_eq!(first.link_method, Some(LinkMethod::VariantNorm));
        assert_eq!(first.annotator_id, "AUTO_LEXICON");
        assert!(first.mention_id.as_deref().is_some_and(|id| id.starts_with("m_")));
        assert_eq!(run.coverage.mentions_by_type["PROPERTY"], 1);
        assert_eq!(run.coverage.total_mentions, 2);
    }

    #[test]
    fn max_ngram_limits_lookup_width() {
        let ctx = Context::default();
        let idx = index(&["a", "b"], &[("1", 0, 2)]);
        let table = lexicon(&[("MATERIAL", "ent_ab", "a b")]).phrase_table(&Vocabulary::standard(), 1);
        assert!(tag(&idx, &table, &ctx).unwrap().mentions.is_empty());
    }

    #[test]
    fn matches_never_cross_passages() {
        let ctx = Context::default();
        let idx = index(&["a", "b", "a"], &[("1", 0, 1), ("2", 1, 3)]);
        let table = lexicon(&[("MATERIAL", "ent_ab", "a b"), ("MATERIAL", "ent_a", "a")])
            .phrase_table(&Vocabulary::standard(), 5);
        let run = tag(&idx, &table, &ctx).unwrap();
        let spans: Vec<_> = run.mentions.iter().map(|m| (m.token_start, m.token_end)).collect();
        assert_eq!(spans, vec![(0, 1), (2, 3)]);
        assert_eq!(run.mentions[1].evidence_window, Some(vec!["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn out_of_range_passage_is_a_bounds_error() {
        let ctx = Context::default();
        let idx = index(&["a"], &[("1", 0, 3)]);
        let table = PhraseTable::default();
        assert!(matches!(tag(&idx, &table, &ctx), Err(Error::Bounds { len: 1, .. })));
    }

    proptest! {
        #[test]
        fn emitted_mentions_never_overlap(words in prop::collection::vec(0usize..4, 0..40)) {
            let alphabet = ["a", "b", "c", "d"];
            let tokens: Vec<&str> = words.iter().map(|w| alphabet[*w]).collect();
            let idx = index(&tokens, &[("1", 0, tokens.len())]);
            let table = lexicon(&[
                ("MATERIAL", "ent_ab", "a b"),
                ("MATERIAL", "ent_b", "b"),
                ("PLACE", "ent_bc", "b c"),
                ("PLACE", "ent_c1", "c"),
                ("TOOL", "ent_c2", "c"),
                ("PROCESS", "ent_abcd", "a b c d"),
            ])
            .phrase_table(&Vocabulary::standard(), 5);

            let run = tag(&idx, &table, &Context::default()).unwrap();
            for pair in run.mentions.windows(2) {
                prop_assert!(pair[0].token_end <= pair[1].token_start);
            }
            for m in &run.mentions {
                prop_assert!(m.token_end > m.token_start);
                prop_assert!(m.token_end <= tokens.len());
            }
        }
    }
}
