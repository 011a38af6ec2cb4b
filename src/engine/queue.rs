//! Adjudication queue.
//!
//! Reuses the overlap matcher per passage. An A mention is queued when it has
//! no B partner, when the partner disagrees on type, or when either side is
//! `low`. B mentions left unmatched are queued on their own. Every entry
//! carries `window` tokens of context on each side of its span.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::matcher::{MatchMode, match_mentions};
use crate::io::{deserialize_flags, serialize_flags};
use crate::{Certainty, Mention, TokenIndex};

bitflags::bitflags! {
    /// Why an entry was queued.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueReasons: u8 {
        const UNMATCHED     = 1 << 0;
        const TYPE_MISMATCH = 1 << 1;
        const LOW_CERTAINTY = 1 << 2;
        const ORPHAN_B      = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(alias = "work_urn")]
    pub work_id: String,
    pub work_slug: String,
    #[serde(alias = "passage_urn")]
    pub passage_id: String,
    pub token_start: usize,
    pub token_end: usize,
    pub surface: String,
    pub surface_norm: String,
    #[serde(serialize_with = "serialize_flags", deserialize_with = "deserialize_flags", default = "QueueReasons::empty")]
    pub reasons: QueueReasons,
    pub a: Option<Mention>,
    pub b: Option<Mention>,
    #[serde(default)]
    pub evidence_window: Vec<String>,
}

impl QueueEntry {
    fn new(anchor: &Mention, reasons: QueueReasons, a: Option<&Mention>, b: Option<&Mention>, evidence: Vec<String>) -> Self {
        QueueEntry {
            work_id: anchor.work_id.clone(),
            work_slug: anchor.work_slug.clone(),
            passage_id: anchor.passage_id.clone(),
            token_start: anchor.token_start,
            token_end: anchor.token_end,
            surface: anchor.surface.clone(),
            surface_norm: anchor.surface_norm.clone(),
            reasons,
            a: a.cloned(),
            b: b.cloned(),
            evidence_window: evidence,
        }
    }
}

pub(crate) fn build(a: &[Mention], b: &[Mention], index: &TokenIndex, threshold: f64, window: usize) -> Vec<QueueEntry> {
    let mut queue = Vec::new();

    for pm in match_mentions(a, b, MatchMode::Overlap, threshold) {
        for &ra in &pm.unmatched_a {
            let evidence = index.evidence_window(ra.span(), window);
            queue.push(QueueEntry::new(ra, QueueReasons::UNMATCHED, Some(ra), None, evidence));
        }
        for pair in &pm.pairs {
            let mut reasons = QueueReasons::empty();
            if pair.a.mention_type != pair.b.mention_type {
                reasons |= QueueReasons::TYPE_MISMATCH;
            }
            if pair.a.certainty == Certainty::Low || pair.b.certainty == Certainty::Low {
                reasons |= QueueReasons::LOW_CERTAINTY;
            }
            if reasons.is_empty() {
                continue;
            }
            let evidence = index.evidence_window(pair.a.span(), window);
            queue.push(QueueEntry::new(pair.a, reasons, Some(pair.a), Some(pair.b), evidence));
        }
        for &rb in &pm.unmatched_b {
            let evidence = index.evidence_window(rb.span(), window);
            queue.push(QueueEntry::new(rb, QueueReasons::ORPHAN_B, None, Some(rb), evidence));
        }
    }

    queue.sort_by(|x, y| {
        (&x.work_slug, &x.passage_id, x.token_start, x.token_end).cmp(&(
            &y.work_slug,
            &y.passage_id,
            y.token_start,
            y.token_end,
        ))
    });
    debug!(entries = queue.len(), threshold, window, "adjudication queue built");
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Certainty::*;
    use crate::engine::fixtures::{index, mention};

    fn tokens() -> Vec<&'static str> {
        vec!["t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9"]
    }

    #[test]
    fn agreeing_confident_pairs_are_not_queued() {
        let idx = index(&tokens(), &[("1", 0, 10)]);
        let a = vec![mention("1", 2, 4, "PLACE", High, "A")];
        let b = vec![mention("1", 2, 4, "PLACE", Med, "B")];
        assert!(build(&a, &b, &idx, 0.5, 2).is_empty());
    }

    #[test]
    fn reasons_accumulate_per_pair() {
        let idx = index(&tokens(), &[("1", 0, 10)]);
        let a = vec![mention("1", 2, 4, "PLACE", Low, "A"), mention("1", 7, 8, "MEASURE", High, "A")];
        let b = vec![mention("1", 2, 4, "MATERIAL", High, "B"), mention("1", 0, 1, "ACTION", High, "B")];
        let queue = build(&a, &b, &idx, 0.5, 2);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue[0].token_start, 0);
        assert_eq!(queue[0].reasons, QueueReasons::ORPHAN_B);
        assert!(queue[0].a.is_none());
        assert_eq!(queue[1].reasons, QueueReasons::TYPE_MISMATCH | QueueReasons::LOW_CERTAINTY);
        assert_eq!(queue[1].b.as_ref().map(|m| m.mention_type.as_str()), Some("MATERIAL"));
        assert_eq!(queue[2].reasons, QueueReasons::UNMATCHED);
        assert_eq!(queue[2].evidence_window, vec!["t5", "t6", "t7", "t8", "t9"]);
    }

    #[test]
    fn entries_roundtrip_through_json() {
        let idx = index(&tokens(), &[("1", 0, 10)]);
        let a = vec![mention("1", 2, 4, "PLACE", Low, "A")];
        let b = vec![mention("1", 2, 4, "MATERIAL", High, "B")];
        let queue = build(&a, &b, &idx, 0.5, 1);
        let raw = serde_json::to_string(&queue[0]).unwrap();
        assert!(raw.contains(r#""reasons":["TYPE_MISMATCH","LOW_CERTAINTY"]"#));
        let back: QueueEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, queue[0]);
    }
}
