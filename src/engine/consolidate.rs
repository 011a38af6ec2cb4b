//! Gold consolidation.
//!
//! A pure fold over three streams keyed by `SpanKey`. For every key seen in A,
//! B or the adjudicated decisions, in key order:
//!
//! ```text
//! adjudicated decision at key?        ── yes ──▶ decision verbatim      ADJ_QUEUE_DECISION
//!         │ no
//! A and B both present, top rows agree
//! on type, neither rank is zero?      ── yes ──▶ A's top row            AUTO_AGREED_AB
//!         │ no
//! best of {top A, top B} by certainty
//! desc, annotator id asc              ─────────▶ that row               AUTO_TIEBREAK
//! ```
//!
//! "Top row" is the best row of one side at that key under the same
//! certainty-then-annotator ordering. Every gold row is stamped with the
//! merge adjudicator id and the canonical timestamp from [`Context`]. Auto
//! decisions get a fresh gold mention id; adjudicated decisions keep theirs.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::keys::{SpanKey, gold_mention_id};
use crate::{Context, Mention};

/// Which rule produced a gold row. Appended to the row's notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    AdjQueueDecision,
    AutoAgreedAb,
    AutoTiebreak,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::AdjQueueDecision => "ADJ_QUEUE_DECISION",
            Provenance::AutoAgreedAb => "AUTO_AGREED_AB",
            Provenance::AutoTiebreak => "AUTO_TIEBREAK",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationSummary {
    pub adjudicated: usize,
    pub agreed: usize,
    pub tiebreak: usize,
}

impl ConsolidationSummary {
    pub fn total(&self) -> usize {
        self.adjudicated + self.agreed + self.tiebreak
    }

    fn record(&mut self, provenance: Provenance) {
        match provenance {
            Provenance::AdjQueueDecision => self.adjudicated += 1,
            Provenance::AutoAgreedAb => self.agreed += 1,
            Provenance::AutoTiebreak => self.tiebreak += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationRun {
    pub gold: Vec<Mention>,
    pub summary: ConsolidationSummary,
}

fn rank_key(m: &Mention) -> (Reverse<u8>, &str) {
    (Reverse(m.certainty.rank()), m.annotator_id.as_str())
}

fn by_key(rows: &[Mention]) -> BTreeMap<SpanKey, Vec<&Mention>> {
    let mut map: BTreeMap<SpanKey, Vec<&Mention>> = BTreeMap::new();
    for row in rows {
        map.entry(SpanKey::from_mention(row)).or_default().push(row);
    }
    map
}

fn top<'m>(rows: Option<&Vec<&'m Mention>>) -> Option<&'m Mention> {
    rows.and_then(|rows| rows.iter().copied().min_by(|x, y| rank_key(x).cmp(&rank_key(y))))
}

fn decide<'m>(decision: Option<&'m Mention>, ra: Option<&'m Mention>, rb: Option<&'m Mention>) -> Option<(&'m Mention, Provenance)> {
    if let Some(d) = decision {
        return Some((d, Provenance::AdjQueueDecision));
    }
    if let (Some(ra), Some(rb)) = (ra, rb) {
        if ra.mention_type == rb.mention_type && ra.certainty.rank() > 0 && rb.certainty.rank() > 0 {
            return Some((ra, Provenance::AutoAgreedAb));
        }
    }
    [ra, rb].into_iter().flatten().min_by(|x, y| rank_key(x).cmp(&rank_key(y))).map(|m| (m, Provenance::AutoTiebreak))
}

/// Merge annotator streams `a` and `b` with adjudicated `decisions` into gold.
pub(crate) fn consolidate(a: &[Mention], b: &[Mention], decisions: &[Mention], ctx: &Context) -> ConsolidationRun {
    let by_a = by_key(a);
    let by_b = by_key(b);

    let mut by_decision: BTreeMap<SpanKey, &Mention> = BTreeMap::new();
    for row in decisions {
        let key = SpanKey::from_mention(row);
        if by_decision.insert(key.clone(), row).is_some() {
            warn!(passage_id = %key.passage_id, start = key.start, end = key.end, "duplicate adjudicated decision; keeping the last one");
        }
    }

    let keys: BTreeSet<&SpanKey> = by_a.keys().chain(by_b.keys()).chain(by_decision.keys()).collect();
    let timestamp = ctx.timestamp_string();
    let mut summary = ConsolidationSummary::default();
    let mut gold = Vec::with_capacity(keys.len());

    for key in keys {
        let Some((chosen, provenance)) =
            decide(by_decision.get(key).copied(), top(by_a.get(key)), top(by_b.get(key)))
        else {
            continue;
        };

        let mut row = chosen.clone();
        if provenance != Provenance::AdjQueueDecision {
            row.mention_id = Some(gold_mention_id(&row.work_slug, &row.passage_id, row.span()));
        }
        row.annotator_id = ctx.merge_annotator_id.clone();
        row.timestamp = timestamp.clone();
        row.push_note(provenance.as_str());
        summary.record(provenance);
        gold.push(row);
    }

    gold.sort_by(|x, y| x.output_order().cmp(&y.output_order()));
    debug!(
        gold = gold.len(),
        adjudicated = summary.adjudicated,
        agreed = summary.agreed,
        tiebreak = summary.tiebreak,
        "gold consolidated"
    );
    ConsolidationRun { gold, summary }
}
