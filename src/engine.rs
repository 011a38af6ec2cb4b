//! Reconciliation and linking engine.
//!
//! This module is the algorithmic core. Everything here is a pure,
//! synchronous transform over immutable inputs: no stage mutates a mention
//! in place, every stage returns a fresh collection, and every output is
//! sorted with an explicit total order so reruns are byte-identical.
//!
//! ## How the parts work together
//!
//! ```text
//! DocNode tree ── span_index::build ──▶ TokenIndex (tokens + passages)
//!                                          │
//!        annotator A ──┐                   │
//!        annotator B ──┼─ matcher ─┬─ agreement::compute  (IAA report)
//!                      │           └─ queue::build        (adjudication queue)
//!                      │                     │
//!                      │            adjudicated decisions
//!                      │                     │
//!                      └──── consolidate::consolidate ──▶ gold mentions
//!                                                   │
//!                    lexicon (entities/variants) ◀──┘
//!                         │            │
//!   TokenIndex ── tagger::tag     linker::link ◀── gold mentions
//!                         │            │
//!                 auto mentions   linked + unlinked side channel
//!                         │
//!                  review::build (overlap / low-confidence queue)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `span_index.rs`: iterative depth-first walk of a `DocNode` tree into
//!   passages over one contiguous token stream.
//! - `matcher.rs`: Jaccard overlap and greedy one-to-one matching per passage.
//!   Shared by agreement measurement and queue construction.
//! - `agreement.rs`: confusion counts and disagreement rows on top of a match.
//! - `queue.rs`: which mentions need adjudication, with evidence windows.
//! - `consolidate.rs`: the gold fold over A, B and adjudicated decisions.
//! - `tagger.rs`: leftmost-longest lexicon tagging with ambiguity suppression.
//! - `linker.rs`: exact normalized-surface linking with routed failures.
//! - `review.rs`: review queue for automatically produced mentions.
//! - `keys.rs`: span keys and stable identifier derivation.
//! - `metrics.rs`: per-stage timing and row counts for reports.
//!
//! ## Determinism
//!
//! Work is independent per passage; only the final cross-passage sort couples
//! passages. Tie-breaks (ascending B order in matching, certainty then
//! annotator id in consolidation) are part of each algorithm's contract.
//!
//! ## Debugging
//!
//! Stages emit `tracing` events; run the CLI with `GOLDWEAVE_LOG=debug` to see
//! skipped ambiguous n-grams, duplicate decisions and per-stage counts.

#[path = "engine/agreement.rs"]
mod agreement;
#[path = "engine/consolidate.rs"]
mod consolidate;
#[path = "engine/keys.rs"]
mod keys;
#[path = "engine/linker.rs"]
mod linker;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/queue.rs"]
mod queue;
#[path = "engine/review.rs"]
mod review;
#[path = "engine/span_index.rs"]
mod span_index;
#[path = "engine/tagger.rs"]
mod tagger;

#[cfg(test)]
#[path = "engine/fixtures.rs"]
pub(crate) mod fixtures;

pub use agreement::{AgreementReport, Disagreement, DisagreementReason};
pub use consolidate::{ConsolidationRun, ConsolidationSummary, Provenance};
pub use keys::{entity_id, gold_mention_id, mention_id};
pub use linker::{LinkRun, Unlinked};
pub use matcher::{MatchMode, MatchedPair, PassageMatching, match_mentions, overlap_score};
pub use metrics::StageMetrics;
pub use queue::{QueueEntry, QueueReasons};
pub use review::{ReviewEntry, ReviewFlags};
pub use span_index::DocNode;
pub use tagger::{CoverageReport, TaggerRun};

pub(crate) use agreement::compute as compute_agreement;
pub(crate) use consolidate::consolidate;
pub(crate) use linker::link;
pub(crate) use queue::build as build_queue;
pub(crate) use review::build as build_review;
pub(crate) use span_index::build as build_index;
pub(crate) use tagger::tag;
