//! Exact-norm entity linking.
//!
//! Each mention's `surface_norm` is looked up in the exact table of its
//! linking type. Exactly one id links the mention; anything else goes to the
//! unlinked side channel together with the original row and the lookup key,
//! so a later run can replay it without re-deriving anything.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lexicon::ExactTable;
use crate::{Certainty, LinkMethod, Mention, Vocabulary};

/// A mention that could not be linked, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unlinked {
    /// The mention type has no linking type.
    UnknownType { row: Mention },
    NoMatch { entity_type: String, lookup_key: String, row: Mention },
    Ambiguous { entity_type: String, lookup_key: String, candidates: Vec<String>, row: Mention },
}

impl Unlinked {
    pub fn reason(&self) -> &'static str {
        match self {
            Unlinked::UnknownType { .. } => "unknown_type",
            Unlinked::NoMatch { .. } => "no_match",
            Unlinked::Ambiguous { .. } => "ambiguous",
        }
    }

    pub fn row(&self) -> &Mention {
        match self {
            Unlinked::UnknownType { row } | Unlinked::NoMatch { row, .. } | Unlinked::Ambiguous { row, .. } => row,
        }
    }

    fn sort_key(&self) -> (&'static str, &str, &str) {
        match self {
            Unlinked::UnknownType { .. } => (self.reason(), "", ""),
            Unlinked::NoMatch { entity_type, lookup_key, .. } | Unlinked::Ambiguous { entity_type, lookup_key, .. } => {
                (self.reason(), entity_type.as_str(), lookup_key.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkRun {
    /// Sorted by (work slug, passage, start, end).
    pub linked: Vec<Mention>,
    /// Sorted by (reason, linking type, lookup key); stable within a key.
    pub unlinked: Vec<Unlinked>,
}

pub(crate) fn link(mentions: &[Mention], table: &ExactTable, vocab: &Vocabulary) -> LinkRun {
    let mut run = LinkRun::default();

    for row in mentions {
        let Some(entity_type) = vocab.linking_type(&row.mention_type) else {
            run.unlinked.push(Unlinked::UnknownType { row: row.clone() });
            continue;
        };
        let lookup_key = row.surface_norm.trim();
        let candidates: Vec<&String> = table.lookup(entity_type, lookup_key).map(|c| c.iter().collect()).unwrap_or_default();

        match candidates.as_slice() {
            [only] => {
                let mut out = row.clone();
                out.entity_type = Some(entity_type.to_string());
                out.entity_id = Some((*only).clone());
                out.link_method = Some(LinkMethod::ExactNorm);
                out.link_confidence = Some(Certainty::High);
                run.linked.push(out);
            }
            [] => run.unlinked.push(Unlinked::NoMatch {
                entity_type: entity_type.to_string(),
                lookup_key: lookup_key.to_string(),
                row: row.clone(),
            }),
            many => run.unlinked.push(Unlinked::Ambiguous {
                entity_type: entity_type.to_string(),
                lookup_key: lookup_key.to_string(),
                candidates: many.iter().map(|c| (*c).clone()).collect(),
                row: row.clone(),
            }),
        }
    }

    run.linked.sort_by(|x, y| {
        (&x.work_slug, &x.passage_id, x.token_start, x.token_end).cmp(&(
            &y.work_slug,
            &y.passage_id,
            y.token_start,
            y.token_end,
        ))
    });
    run.unlinked.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
    debug!(linked = run.linked.len(), unlinked = run.unlinked.len(), "linking finished");
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Certainty::*;
    use crate::LexiconVariant;
    use crate::engine::fixtures::{mention, with_surface};
    use crate::lexicon::Lexicon;
    use crate::normalize;

    fn table() -> ExactTable {
        let mut lexicon = Lexicon::default();
        for (t, id, text) in [
            ("MATERIAL", "ent_material_water", "ὕδωρ"),
            ("PLACE", "ent_place_1", "Πέργαμον"),
            ("PLACE", "ent_place_2", "Πέργαμον"),
        ] {
            lexicon.insert(
                t,
                LexiconVariant {
                    entity_id: id.to_string(),
                    preferred_label: text.to_string(),
                    variant: text.to_string(),
                    variant_norm: normalize(text),
                },
            );
        }
        lexicon.exact_table()
    }

    #[test]
    fn routes_every_outcome() {
        let vocab = Vocabulary::standard();
        let rows = vec![
            with_surface(mention("1", 0, 1, "MATERIAL", High, "G"), "ὕδωρ"),
            with_surface(mention("1", 1, 2, "PLACE", High, "G"), "Πέργαμον"),
            with_surface(mention("1", 2, 3, "QUALITY", High, "G"), "θερμόν"),
            with_surface(mention("1", 3, 4, "DEITY", High, "G"), "Ἀσκληπιός"),
        ];
        let run = link(&rows, &table(), &vocab);

        assert_eq!(run.linked.len(), 1);
        let linked = &run.linked[0];
        assert_eq!(linked.entity_id.as_deref(), Some("ent_material_water"));
        assert_eq!(linked.link_method, Some(LinkMethod::ExactNorm));
        assert_eq!(linked.link_confidence, Some(High));
        assert_eq!(linked.mention_type, "MATERIAL");

        let reasons: Vec<_> = run.unlinked.iter().map(Unlinked::reason).collect();
        assert_eq!(reasons, vec!["ambiguous", "no_match", "unknown_type"]);
        match &run.unlinked[0] {
            Unlinked::Ambiguous { candidates, lookup_key, .. } => {
                assert_eq!(candidates, &vec!["ent_place_1".to_string(), "ent_place_2".to_string()]);
                assert_eq!(lookup_key, "περγαμον");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &run.unlinked[1] {
            Unlinked::NoMatch { entity_type, .. } => assert_eq!(entity_type, "PROPERTY"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(run.unlinked[2].row().surface, "Ἀσκληπιός");
    }

    #[test]
    fn unlinked_rows_serialize_with_reason_tag() {
        let row = with_surface(mention("1", 2, 3, "QUALITY", High, "G"), "θερμόν");
        let unlinked = Unlinked::NoMatch { entity_type: "PROPERTY".into(), lookup_key: "θερμον".into(), row };
        let raw = serde_json::to_string(&unlinked).unwrap();
        assert!(raw.starts_with(r#"{"reason":"no_match","entity_type":"PROPERTY","lookup_key":"θερμον","row":{"#));
        let back: Unlinked = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, unlinked);
    }
}
