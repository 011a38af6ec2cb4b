//! Passage indexing.
//!
//! Turns a structural document tree into one contiguous token stream plus a
//! document-order list of passages. Each `Block` under at least one `Section`
//! becomes a passage; its reference path is the section labels from root to
//! leaf followed by a 1-based counter that restarts for every distinct
//! ancestry. The passage id prefixes the work id to that path.
//!
//! ```text
//! Section "1"                 tokens:  [0 .. 3) [3 .. 5) [5 .. 9)
//! ├─ Section "2"
//! │  ├─ Block "..."   ──▶ 1.2.1   [0,3)
//! │  └─ Block "..."   ──▶ 1.2.2   [3,5)
//! └─ Section "3"
//!    ├─ Block ""      ──▶ (no tokens, no passage)
//!    └─ Block "..."   ──▶ 1.3.1   [5,9)
//! ```
//!
//! The walk is an explicit depth-first traversal over a work stack of
//! `Visit`s; the ancestry stack, counters and token cursor live on one
//! `IndexBuilder` value. The cursor only moves forward.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::{NORMALIZER_VERSION, Passage, TOKENIZER_VERSION, TokenIndex, normalize, tokenize};

/// Structural document tree handed over by the markup reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocNode {
    /// A labelled structural division (book, chapter, ...). Contributes one
    /// level of the reference path. Missing or blank labels become `?`.
    Section {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        children: Vec<DocNode>,
    },
    /// An unlabelled wrapper; transparent for reference paths.
    Group {
        #[serde(default)]
        children: Vec<DocNode>,
    },
    /// Leaf content unit.
    Block { text: String },
}

enum Visit<'a> {
    Enter(&'a DocNode),
    Leave,
}

#[derive(Default)]
struct IndexBuilder {
    ancestry: Vec<String>,
    counters: HashMap<Vec<String>, usize>,
    cursor: usize,
    tokens: Vec<String>,
    tokens_norm: Vec<String>,
    passages: Vec<Passage>,
}

impl IndexBuilder {
    fn block(&mut self, work_id: &str, text: &str) {
        if self.ancestry.is_empty() {
            return;
        }
        let block_tokens = tokenize(text);
        if block_tokens.is_empty() {
            return;
        }

        let count = self.counters.entry(self.ancestry.clone()).or_insert(0);
        *count += 1;
        let reference_path = format!("{}.{}", self.ancestry.join("."), count);

        let token_start = self.cursor;
        let token_end = token_start + block_tokens.len();
        self.cursor = token_end;

        self.tokens_norm.extend(block_tokens.iter().map(|t| normalize(t)));
        self.tokens.extend(block_tokens);
        self.passages.push(Passage {
            passage_id: format!("{work_id}:{reference_path}"),
            reference_path,
            token_start,
            token_end,
        });
    }
}

fn section_label(label: &Option<String>) -> String {
    match label.as_deref().map(str::trim) {
        Some(l) if !l.is_empty() => l.to_string(),
        _ => "?".to_string(),
    }
}

/// Index `root` for `work_id`. `max_passages` stops the walk early.
pub(crate) fn build(work_id: &str, work_slug: &str, root: &DocNode, max_passages: Option<usize>) -> TokenIndex {
    let mut builder = IndexBuilder::default();
    let mut pending = vec![Visit::Enter(root)];

    while let Some(visit) = pending.pop() {
        if max_passages.is_some_and(|cap| builder.passages.len() >= cap) {
            debug!(work_id, cap = ?max_passages, "passage cap reached; remaining document left unindexed");
            break;
        }
        match visit {
            Visit::Leave => {
                builder.ancestry.pop();
            }
            Visit::Enter(DocNode::Section { label, children }) => {
                builder.ancestry.push(section_label(label));
                pending.push(Visit::Leave);
                pending.extend(children.iter().rev().map(Visit::Enter));
            }
            Visit::Enter(DocNode::Group { children }) => {
                pending.extend(children.iter().rev().map(Visit::Enter));
            }
            Visit::Enter(DocNode::Block { text }) => builder.block(work_id, text),
        }
    }

    debug!(work_id, passages = builder.passages.len(), tokens = builder.tokens.len(), "token index built");

    TokenIndex {
        work_id: work_id.to_string(),
        work_slug: work_slug.to_string(),
        tokenizer_version: TOKENIZER_VERSION.to_string(),
        normalizer_version: NORMALIZER_VERSION.to_string(),
        tokens: builder.tokens,
        tokens_norm: builder.tokens_norm,
        passages: builder.passages,
    }
}
