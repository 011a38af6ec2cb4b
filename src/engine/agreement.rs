//! Inter-annotator agreement on top of the greedy matcher.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::matcher::{MatchMode, match_mentions};
use crate::Mention;

/// Why a disagreement row exists. Orders `missing_in_A < missing_in_B <
/// type_mismatch`, which is also the row order within a passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DisagreementReason {
    #[serde(rename = "missing_in_A")]
    MissingInA,
    #[serde(rename = "missing_in_B")]
    MissingInB,
    #[serde(rename = "type_mismatch")]
    TypeMismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub passage_id: String,
    pub a: Option<Mention>,
    pub b: Option<Mention>,
    pub reason: DisagreementReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgreementReport {
    pub mode: MatchMode,
    /// Effective threshold; `1.0` in exact mode.
    pub threshold: f64,
    pub total_a: usize,
    pub total_b: usize,
    pub matched: usize,
    /// Matched-pair counts keyed by (A type, B type).
    pub confusion: BTreeMap<(String, String), usize>,
    /// Sorted by (passage, reason); stable within a key.
    pub disagreements: Vec<Disagreement>,
}

impl AgreementReport {
    /// Pairwise F1 over spans, `2·matched / (|A| + |B|)`. `None` when both
    /// sides are empty.
    pub fn f1(&self) -> Option<f64> {
        let total = self.total_a + self.total_b;
        (total > 0).then(|| 2.0 * self.matched as f64 / total as f64)
    }

    /// Matched pairs whose types agree.
    pub fn type_agreements(&self) -> usize {
        self.confusion.iter().filter(|((a, b), _)| a == b).map(|(_, n)| n).sum()
    }

    pub fn count(&self, reason: DisagreementReason) -> usize {
        self.disagreements.iter().filter(|d| d.reason == reason).count()
    }

    /// Off-diagonal confusions, most frequent first.
    pub fn top_confusions(&self, n: usize) -> Vec<(&str, &str, usize)> {
        let mut rows: Vec<_> = self
            .confusion
            .iter()
            .filter(|((a, b), _)| a != b)
            .map(|((a, b), count)| (a.as_str(), b.as_str(), *count))
            .collect();
        rows.sort_by(|x, y| y.2.cmp(&x.2).then_with(|| (x.0, x.1).cmp(&(y.0, y.1))));
        rows.truncate(n);
        rows
    }

    /// Dense confusion matrix over `types` (rows A, columns B).
    pub fn confusion_matrix(&self, types: &[&str]) -> Vec<Vec<usize>> {
        types
            .iter()
            .map(|ta| {
                types
                    .iter()
                    .map(|tb| self.confusion.get(&(ta.to_string(), tb.to_string())).copied().unwrap_or(0))
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn compute(a: &[Mention], b: &[Mention], mode: MatchMode, threshold: f64) -> AgreementReport {
    let mut confusion: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut disagreements = Vec::new();
    let mut matched = 0;

    for pm in match_mentions(a, b, mode, threshold) {
        for ra in &pm.unmatched_a {
            disagreements.push(Disagreement {
                passage_id: pm.passage_id.to_string(),
                a: Some((*ra).clone()),
                b: None,
                reason: DisagreementReason::MissingInB,
            });
        }
        for pair in &pm.pairs {
            matched += 1;
            *confusion.entry((pair.a.mention_type.clone(), pair.b.mention_type.clone())).or_default() += 1;
            if pair.a.mention_type != pair.b.mention_type {
                disagreements.push(Disagreement {
                    passage_id: pm.passage_id.to_string(),
                    a: Some(pair.a.clone()),
                    b: Some(pair.b.clone()),
                    reason: DisagreementReason::TypeMismatch,
                });
            }
        }
        for rb in &pm.unmatched_b {
            disagreements.push(Disagreement {
                passage_id: pm.passage_id.to_string(),
                a: None,
                b: Some((*rb).clone()),
                reason: DisagreementReason::MissingInA,
            });
        }
    }

    disagreements.sort_by(|x, y| (&x.passage_id, x.reason).cmp(&(&y.passage_id, y.reason)));
    debug!(total_a = a.len(), total_b = b.len(), matched, disagreements = disagreements.len(), "agreement computed");

    AgreementReport {
        mode,
        threshold: if mode == MatchMode::Exact { 1.0 } else { threshold },
        total_a: a.len(),
        total_b: b.len(),
        matched,
        confusion,
        disagreements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Certainty::*;
    use crate::engine::fixtures::mention;

    fn sample() -> (Vec<Mention>, Vec<Mention>) {
        let a = vec![
            mention("1", 0, 2, "MATERIAL", High, "A"),
            mention("1", 4, 5, "QUALITY", Med, "A"),
            mention("2", 10, 12, "ACTION", High, "A"),
        ];
        let b = vec![
            mention("1", 0, 2, "MATERIAL", High, "B"),
            mention("1", 4, 5, "ACTION", Med, "B"),
            mention("1", 7, 8, "PLACE", Low, "B"),
        ];
        (a, b)
    }

    #[test]
    fn counts_confusions_and_reasons() {
        let (a, b) = sample();
        let report = compute(&a, &b, MatchMode::Overlap, 0.5);
        assert_eq!(report.matched, 2);
        assert_eq!(report.type_agreements(), 1);
        assert_eq!(report.confusion[&("QUALITY".to_string(), "ACTION".to_string())], 1);
        assert_eq!(report.count(DisagreementReason::MissingInA), 1);
        assert_eq!(report.count(DisagreementReason::MissingInB), 1);
        assert_eq!(report.count(DisagreementReason::TypeMismatch), 1);
        assert_eq!(report.top_confusions(10), vec![("QUALITY", "ACTION", 1)]);
        assert!((report.f1().unwrap() - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn disagreements_sorted_by_passage_then_reason() {
        let (a, b) = sample();
        let report = compute(&a, &b, MatchMode::Exact, 0.5);
        let keys: Vec<_> = report.disagreements.iter().map(|d| (d.passage_id.rsplit(':').next(), d.reason)).collect();
        assert_eq!(
            keys,
            vec![
                (Some("1"), DisagreementReason::MissingInA),
                (Some("1"), DisagreementReason::TypeMismatch),
                (Some("2"), DisagreementReason::MissingInB),
            ]
        );
        assert_eq!(report.threshold, 1.0);
    }

    #[test]
    fn reason_labels_serialize_verbatim() {
        assert_eq!(serde_json::to_string(&DisagreementReason::MissingInA).unwrap(), "\"missing_in_A\"");
        assert_eq!(serde_json::to_string(&DisagreementReason::TypeMismatch).unwrap(), "\"type_mismatch\"");
    }

    #[test]
    fn empty_inputs_have_no_f1() {
        let report = compute(&[], &[], MatchMode::Overlap, 0.5);
        assert_eq!(report.f1(), None);
        assert!(report.disagreements.is_empty());
        assert_eq!(report.confusion_matrix(&["PLACE"]), vec![vec![0]]);
    }
}
