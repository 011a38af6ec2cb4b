//! Span overlap scoring and greedy one-to-one matching.
//!
//! Matching runs independently per passage. Inside a passage both sides are
//! ordered by `(token_start, token_end)` (stable, so input order breaks exact
//! ties) and A is walked front to back:
//!
//! ```text
//! exact:    first unused B with identical bounds
//! overlap:  unused B with the highest Jaccard score >= threshold;
//!           equal scores keep the earlier B
//! ```
//!
//! A matched B is consumed. Whatever is left on either side is reported as
//! unmatched. Disjoint spans never match, even with a zero threshold.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Mention, Span};

/// Jaccard similarity of two token ranges: |A ∩ B| / |A ∪ B|.
///
/// ```
/// use goldweave::{Span, overlap_score};
///
/// let s = overlap_score(Span::new(10, 14), Span::new(12, 16));
/// assert!((s - 1.0 / 3.0).abs() < 1e-12);
/// ```
pub fn overlap_score(a: Span, b: Span) -> f64 {
    let inter = a.intersection_len(&b);
    let union = a.len() + b.len() - inter;
    if union == 0 { 0.0 } else { inter as f64 / union as f64 }
}

/// How two mentions must relate to be paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Identical bounds only.
    Exact,
    /// Best Jaccard overlap at or above a threshold.
    #[serde(alias = "overlap50")]
    Overlap,
}

impl MatchMode {
    /// Parse a CLI/config label: `exact`, `overlap` or `overlap50`.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "exact" => Some(MatchMode::Exact),
            "overlap" | "overlap50" => Some(MatchMode::Overlap),
            _ => None,
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMode::Exact => "exact",
            MatchMode::Overlap => "overlap",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchedPair<'m> {
    pub a: &'m Mention,
    pub b: &'m Mention,
    pub score: f64,
}

/// Matching result for one passage.
#[derive(Debug, Clone)]
pub struct PassageMatching<'m> {
    pub passage_id: &'m str,
    /// Pairs in A order.
    pub pairs: Vec<MatchedPair<'m>>,
    pub unmatched_a: Vec<&'m Mention>,
    pub unmatched_b: Vec<&'m Mention>,
}

/// Match `a` against `b` passage by passage, passages in ascending id order.
///
/// `threshold` only applies to [`MatchMode::Overlap`].
pub fn match_mentions<'m>(
    a: &'m [Mention],
    b: &'m [Mention],
    mode: MatchMode,
    threshold: f64,
) -> Vec<PassageMatching<'m>> {
    let by_a = group_by_passage(a);
    let by_b = group_by_passage(b);
    let passages: BTreeSet<&str> = by_a.keys().chain(by_b.keys()).copied().collect();

    passages
        .into_iter()
        .map(|passage_id| {
            let aa = by_a.get(passage_id).map(Vec::as_slice).unwrap_or(&[]);
            let bb = by_b.get(passage_id).map(Vec::as_slice).unwrap_or(&[]);
            match_passage(passage_id, aa, bb, mode, threshold)
        })
        .collect()
}

/// Group mentions by passage, each group sorted by span (stable).
pub(crate) fn group_by_passage(rows: &[Mention]) -> BTreeMap<&str, Vec<&Mention>> {
    let mut groups: BTreeMap<&str, Vec<&Mention>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.passage_id.as_str()).or_default().push(row);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|m| (m.token_start, m.token_end));
    }
    groups
}

fn match_passage<'m>(
    passage_id: &'m str,
    aa: &[&'m Mention],
    bb: &[&'m Mention],
    mode: MatchMode,
    threshold: f64,
) -> PassageMatching<'m> {
    let mut used = vec![false; bb.len()];
    let mut pairs = Vec::new();
    let mut unmatched_a = Vec::new();

    for ra in aa {
        let found = match mode {
            MatchMode::Exact => exact_candidate(ra, bb, &used),
            MatchMode::Overlap => best_candidate(ra, bb, &used, threshold),
        };
        match found {
            Some((i, score)) => {
                used[i] = true;
                pairs.push(MatchedPair { a: ra, b: bb[i], score });
            }
            None => unmatched_a.push(*ra),
        }
    }

    let unmatched_b = bb.iter().zip(&used).filter(|(_, u)| !**u).map(|(rb, _)| *rb).collect();
    PassageMatching { passage_id, pairs, unmatched_a, unmatched_b }
}

fn exact_candidate(ra: &Mention, bb: &[&Mention], used: &[bool]) -> Option<(usize, f64)> {
    bb.iter()
        .enumerate()
        .find(|(i, rb)| !used[*i] && rb.token_start == ra.token_start && rb.token_end == ra.token_end)
        .map(|(i, _)| (i, 1.0))
}

fn best_candidate(ra: &Mention, bb: &[&Mention], used: &[bool], threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, rb) in bb.iter().enumerate() {
        if used[i] {
            continue;
        }
        let score = overlap_score(ra.span(), rb.span());
        if score <= 0.0 || score < threshold {
            continue;
        }
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best
}
