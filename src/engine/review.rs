//! Review queue for automatically produced mentions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::matcher::group_by_passage;
use crate::io::{deserialize_flags, serialize_flags};
use crate::{Certainty, Mention, TokenIndex};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReviewFlags: u8 {
        /// Overlaps the previous or next mention of its passage.
        const OVERLAP        = 1 << 0;
        /// Certainty or link confidence is `low`.
        const LOW_CONFIDENCE = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    #[serde(serialize_with = "serialize_flags", deserialize_with = "deserialize_flags")]
    pub reasons: ReviewFlags,
    pub row: Mention,
    pub evidence_window: Vec<String>,
}

/// Flag rows that deserve a human look. Only immediate neighbours (in span
/// order within a passage) are checked for overlap.
pub(crate) fn build(rows: &[Mention], index: &TokenIndex, window: usize) -> Vec<ReviewEntry> {
    let mut queue = Vec::new();

    for items in group_by_passage(rows).values() {
        for (i, row) in items.iter().enumerate() {
            let mut reasons = ReviewFlags::empty();
            let prev_overlaps = i > 0 && items[i - 1].token_end > row.token_start;
            let next_overlaps = items.get(i + 1).is_some_and(|next| row.token_end > next.token_start);
            if prev_overlaps || next_overlaps {
                reasons |= ReviewFlags::OVERLAP;
            }
            if row.certainty == Certainty::Low || row.link_confidence == Some(Certainty::Low) {
                reasons |= ReviewFlags::LOW_CONFIDENCE;
            }
            if reasons.is_empty() {
                continue;
            }
            queue.push(ReviewEntry {
                reasons,
                row: (*row).clone(),
                evidence_window: index.evidence_window(row.span(), window),
            });
        }
    }

    queue.sort_by(|x, y| {
        (&x.row.work_slug, &x.row.passage_id, x.row.token_start).cmp(&(
            &y.row.work_slug,
            &y.row.passage_id,
            y.row.token_start,
        ))
    });
    debug!(flagged = queue.len(), rows = rows.len(), "review queue built");
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Certainty::*;
    use crate::engine::fixtures::{index, mention};

    #[test]
    fn flags_neighbour_overlap_and_low_confidence() {
        let idx = index(&["a", "b", "c", "d", "e", "f"], &[("1", 0, 6)]);
        let mut linked_low = mention("1", 5, 6, "PLACE", High, "AUTO");
        linked_low.link_confidence = Some(Low);
        let rows = vec![
            mention("1", 0, 2, "PLACE", Med, "AUTO"),
            mention("1", 1, 3, "MATERIAL", Med, "AUTO"),
            mention("1", 3, 4, "MEASURE", Low, "AUTO"),
            mention("1", 4, 5, "ACTION", Med, "AUTO"),
            linked_low,
        ];
        let queue = build(&rows, &idx, 1);
        let flagged: Vec<_> = queue.iter().map(|e| (e.row.token_start, e.reasons)).collect();
        assert_eq!(
            flagged,
            vec![
                (0, ReviewFlags::OVERLAP),
                (1, ReviewFlags::OVERLAP),
                (3, ReviewFlags::LOW_CONFIDENCE),
                (5, ReviewFlags::LOW_CONFIDENCE),
            ]
        );
        assert_eq!(queue[2].evidence_window, vec!["c", "d", "e"]);
    }

    #[test]
    fn clean_rows_produce_nothing() {
        let idx = index(&["a", "b"], &[("1", 0, 2)]);
        let rows = vec![mention("1", 0, 1, "PLACE", Med, "AUTO"), mention("1", 1, 2, "PLACE", High, "AUTO")];
        assert!(build(&rows, &idx, 3).is_empty());
    }
}
