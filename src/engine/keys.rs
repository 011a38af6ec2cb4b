//! Span keys and stable identifiers.
//!
//! Reconciliation groups mentions by *where* they are, not by who produced
//! them. `SpanKey` is that grouping key: passage plus half-open bounds. It is
//! `Ord` so that any map keyed by it iterates in document order.
//!
//! Identifiers are content-derived so that re-running a stage on unchanged
//! input never changes identity:
//!
//! - annotator mention: `m_` + digest of `work_slug|passage|start|end|annotator`
//! - gold mention:      `g_` + digest of `work_slug|passage|start|end`
//! - entity:            `ent_<type>_` + digest of `TYPE|preferred_label_norm`
//!
//! The digest is the first 12 hex characters of SHA-1 over the UTF-8
//! preimage, matching ids already written by earlier pipeline runs.

use sha1::{Digest, Sha1};

use crate::{Mention, Span};

const DIGEST_CHARS: usize = 12;

/// Grouping key for mentions claiming the same span of the same passage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SpanKey {
    pub(crate) passage_id: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl SpanKey {
    pub(crate) fn from_mention(mention: &Mention) -> Self {
        SpanKey { passage_id: mention.passage_id.clone(), start: mention.token_start, end: mention.token_end }
    }
}

/// Stable id of one annotator's mention.
pub fn mention_id(work_slug: &str, passage_id: &str, span: Span, annotator_id: &str) -> String {
    let raw = format!("{work_slug}|{passage_id}|{}|{}|{annotator_id}", span.start, span.end);
    format!("m_{}", short_digest(&raw))
}

/// Stable id of a gold mention; independent of which annotator supplied it.
pub fn gold_mention_id(work_slug: &str, passage_id: &str, span: Span) -> String {
    let raw = format!("{work_slug}|{passage_id}|{}|{}", span.start, span.end);
    format!("g_{}", short_digest(&raw))
}

/// Stable entity id for a linking type and normalized preferred label.
pub fn entity_id(entity_type: &str, preferred_label_norm: &str) -> String {
    let raw = format!("{entity_type}|{preferred_label_norm}");
    format!("ent_{}_{}", entity_type.to_lowercase(), short_digest(&raw))
}

fn short_digest(raw: &str) -> String {
    let mut hex = format!("{:x}", Sha1::digest(raw.as_bytes()));
    hex.truncate(DIGEST_CHARS);
    hex
}
