//! Builders shared by engine tests.

use crate::{Certainty, Mention, Passage, TokenIndex, normalize};

pub(crate) const WORK: &str = "urn:cts:greekLit:tlg0057.tlg071";
pub(crate) const SLUG: &str = "galen_smt";

pub(crate) fn passage_id(reference_path: &str) -> String {
    format!("{WORK}:{reference_path}")
}

/// Token index over `tokens` with one passage per `(ref, start, end)`.
pub(crate) fn index(tokens: &[&str], passages: &[(&str, usize, usize)]) -> TokenIndex {
    TokenIndex {
        work_id: WORK.to_string(),
        work_slug: SLUG.to_string(),
        tokenizer_version: crate::TOKENIZER_VERSION.to_string(),
        normalizer_version: crate::NORMALIZER_VERSION.to_string(),
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
        tokens_norm: tokens.iter().map(|t| normalize(t)).collect(),
        passages: passages
            .iter()
            .map(|(r, s, e)| Passage {
                passage_id: passage_id(r),
                reference_path: r.to_string(),
                token_start: *s,
                token_end: *e,
            })
            .collect(),
    }
}

/// A mention in passage `reference_path` with surface `"t{start}"`.
pub(crate) fn mention(
    reference_path: &str,
    start: usize,
    end: usize,
    mention_type: &str,
    certainty: Certainty,
    annotator_id: &str,
) -> Mention {
    let surface = format!("t{start}");
    Mention {
        work_id: WORK.to_string(),
        passage_id: passage_id(reference_path),
        work_slug: SLUG.to_string(),
        token_start: start,
        token_end: end,
        surface_norm: normalize(&surface),
        surface,
        mention_type: mention_type.to_string(),
        certainty,
        annotator_id: annotator_id.to_string(),
        timestamp: "2024-05-01T12:00:00Z".to_string(),
        mention_id: None,
        entity_type: None,
        entity_id: None,
        link_method: None,
        link_confidence: None,
        evidence_window: None,
        notes: String::new(),
    }
}

pub(crate) fn with_surface(mut m: Mention, surface: &str) -> Mention {
    m.surface = surface.to_string();
    m.surface_norm = normalize(surface);
    m
}
