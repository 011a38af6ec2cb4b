//! Entity registry and lexicon tables.
//!
//! Entities are derived from gold mentions and fully regenerated on every
//! build. The lexicon holds the known surface variants per linking type and
//! compiles into two lookup shapes:
//!
//! - [`PhraseTable`]: normalized token n-gram → candidates (tagger)
//! - [`ExactTable`]: linking type → `variant_norm` → entity ids (linker)
//!
//! Candidate collections are ordered sets, so a variant listed twice for the
//! same entity never turns into a spurious ambiguity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::engine::entity_id;
use crate::{Entity, LexiconVariant, Mention, Vocabulary, normalize, tokenize};

// --- Entity bootstrap -------------------------------------------------------

/// Derive entities from gold mentions.
///
/// Mentions are bucketed by (linking type, `surface_norm`). The preferred
/// label is the most frequent raw surface in the bucket; equal counts go to
/// the lexicographically smallest surface. Mentions whose type has no
/// linking type, or with an empty surface, are skipped.
///
/// Output is sorted by (type, entity id).
pub fn bootstrap_entities(gold: &[Mention], vocab: &Vocabulary) -> Vec<Entity> {
    let mut buckets: BTreeMap<(&str, String), BTreeMap<&str, usize>> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in gold {
        let Some(entity_type) = vocab.linking_type(&row.mention_type) else {
            skipped += 1;
            continue;
        };
        let norm = if row.surface_norm.is_empty() { normalize(&row.surface) } else { row.surface_norm.clone() };
        if norm.is_empty() || row.surface.is_empty() {
            skipped += 1;
            continue;
        }
        *buckets.entry((entity_type, norm)).or_default().entry(row.surface.as_str()).or_default() += 1;
    }

    let mut entities: Vec<Entity> = buckets
        .into_iter()
        .filter_map(|((entity_type, norm), surfaces)| {
            let mut preferred: Option<(&str, usize)> = None;
            for (surface, count) in surfaces {
                if preferred.is_none_or(|(_, best)| count > best) {
                    preferred = Some((surface, count));
                }
            }
            let (label, _) = preferred?;
            Some(Entity {
                entity_id: entity_id(entity_type, &norm),
                entity_type: entity_type.to_string(),
                preferred_label: label.to_string(),
                preferred_label_norm: norm,
            })
        })
        .collect();

    entities.sort_by(|x, y| (&x.entity_type, &x.entity_id).cmp(&(&y.entity_type, &y.entity_id)));
    debug!(entities = entities.len(), skipped, "entities bootstrapped from gold");
    entities
}

// --- Lexicon ----------------------------------------------------------------

/// Surface variants grouped by linking type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    by_type: BTreeMap<String, Vec<LexiconVariant>>,
}

impl Lexicon {
    /// One variant per entity (its preferred label). Every linking type in
    /// `vocab` gets an entry, empty or not.
    pub fn from_entities(entities: &[Entity], vocab: &Vocabulary) -> Self {
        let mut lexicon = Lexicon::default();
        for entity_type in vocab.linking_types() {
            lexicon.by_type.entry(entity_type.to_string()).or_default();
        }
        for entity in entities {
            lexicon.insert(
                &entity.entity_type,
                LexiconVariant {
                    entity_id: entity.entity_id.clone(),
                    preferred_label: entity.preferred_label.clone(),
                    variant: entity.preferred_label.clone(),
                    variant_norm: normalize(&entity.preferred_label),
                },
            );
        }
        lexicon
    }

    /// Add a variant, keeping each type's rows sorted by
    /// (entity id, variant_norm, variant).
    pub fn insert(&mut self, entity_type: &str, variant: LexiconVariant) {
        let rows = self.by_type.entry(entity_type.to_string()).or_default();
        let at = rows.partition_point(|r| {
            (&r.entity_id, &r.variant_norm, &r.variant) <= (&variant.entity_id, &variant.variant_norm, &variant.variant)
        });
        rows.insert(at, variant);
    }

    pub fn variants(&self, entity_type: &str) -> &[LexiconVariant] {
        self.by_type.get(entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    /// Total number of variants across all types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compile the n-gram table used by the tagger.
    ///
    /// Each variant is tokenized and normalized token by token. Variants
    /// that produce no tokens or more than `max_ngram` tokens are left out.
    /// Types the vocabulary cannot map back to a mention type are skipped.
    pub fn phrase_table(&self, vocab: &Vocabulary, max_ngram: usize) -> PhraseTable {
        let mut phrases: HashMap<Vec<String>, BTreeSet<Candidate>> = HashMap::new();
        for (entity_type, rows) in &self.by_type {
            let Some(mention_type) = vocab.mention_type_for(entity_type) else {
                if !rows.is_empty() {
                    warn!(entity_type = %entity_type, variants = rows.len(), "no mention type maps to this linking type; variants ignored");
                }
                continue;
            };
            for row in rows {
                if row.entity_id.trim().is_empty() {
                    continue;
                }
                let key: Vec<String> = tokenize(row.variant.trim()).iter().map(|t| normalize(t)).collect();
                if key.is_empty() || key.len() > max_ngram {
                    continue;
                }
                phrases.entry(key).or_default().insert(Candidate {
                    entity_id: row.entity_id.trim().to_string(),
                    entity_type: entity_type.clone(),
                    mention_type: mention_type.to_string(),
                });
            }
        }
        debug!(phrases = phrases.len(), max_ngram, "phrase table compiled");
        PhraseTable { phrases, max_ngram }
    }

    /// Compile the exact lookup used by the linker, keyed by the stored
    /// `variant_norm`.
    pub fn exact_table(&self) -> ExactTable {
        let mut by_type: HashMap<String, HashMap<String, BTreeSet<String>>> = HashMap::new();
        for (entity_type, rows) in &self.by_type {
            let table = by_type.entry(entity_type.clone()).or_default();
            for row in rows {
                let key = row.variant_norm.trim();
                let id = row.entity_id.trim();
                if key.is_empty() || id.is_empty() {
                    continue;
                }
                table.entry(key.to_string()).or_default().insert(id.to_string());
            }
        }
        ExactTable { by_type }
    }
}

// --- Lookup tables ----------------------------------------------------------

/// An entity a phrase may refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: String,
    /// Linking type.
    pub entity_type: String,
    /// Mention type emitted when this candidate is chosen.
    pub mention_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct PhraseTable {
    phrases: HashMap<Vec<String>, BTreeSet<Candidate>>,
    max_ngram: usize,
}

impl PhraseTable {
    /// Candidates for a normalized n-gram; `None` when nothing is known.
    pub fn lookup(&self, ngram: &[String]) -> Option<&BTreeSet<Candidate>> {
        self.phrases.get(ngram).filter(|c| !c.is_empty())
    }

    pub fn max_ngram(&self) -> usize {
        self.max_ngram
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExactTable {
    by_type: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl ExactTable {
    /// Entity ids for `key` within `entity_type`.
    pub fn lookup(&self, entity_type: &str, key: &str) -> Option<&BTreeSet<String>> {
        self.by_type.get(entity_type).and_then(|t| t.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Certainty::*;
    use crate::engine::fixtures::{mention, with_surface};

    fn variant(entity_id: &str, text: &str) -> LexiconVariant {
        LexiconVariant {
            entity_id: entity_id.to_string(),
            preferred_label: text.to_string(),
            variant: text.to_string(),
            variant_norm: normalize(text),
        }
    }

    #[test]
    fn bootstrap_picks_most_common_surface() {
        let vocab = Vocabulary::standard();
        let gold = vec![
            with_surface(mention("1", 0, 1, "MATERIAL", High, "G"), "ὕδωρ"),
            with_surface(mention("1", 3, 4, "MATERIAL", High, "G"), "ὑδωρ"),
            with_surface(mention("1", 5, 6, "MATERIAL", High, "G"), "ὑδωρ"),
            with_surface(mention("2", 0, 1, "QUALITY", High, "G"), "ψυχρόν"),
            with_surface(mention("2", 2, 3, "UNKNOWN", High, "G"), "ψυχρόν"),
        ];
        let entities = bootstrap_entities(&gold, &vocab);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].entity_type, "MATERIAL");
        assert_eq!(entities[0].preferred_label, "ὑδωρ");
        assert_eq!(entities[0].preferred_label_norm, "υδωρ");
        assert_eq!(entities[0].entity_id, entity_id("MATERIAL", "υδωρ"));
        assert_eq!(entities[1].entity_type, "PROPERTY");
        assert!(entities[1].entity_id.starts_with("ent_property_"));
    }

    #[test]
    fn bootstrap_ties_go_to_smallest_surface() {
        let vocab = Vocabulary::standard();
        let gold = vec![
            with_surface(mention("1", 0, 1, "PLACE", High, "G"), "Ῥώμη"),
            with_surface(mention("1", 1, 2, "PLACE", High, "G"), "ῬΩΜΗ"),
        ];
        let entities = bootstrap_entities(&gold, &vocab);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].preferred_label, "ῬΩΜΗ".min("Ῥώμη"));
    }

    #[test]
    fn lexicon_covers_every_linking_type() {
        let vocab = Vocabulary::standard();
        let lexicon = Lexicon::from_entities(&[], &vocab);
        assert_eq!(lexicon.types().count(), 7);
        assert!(lexicon.is_empty());
        assert!(lexicon.variants("TOOL").is_empty());
    }

    #[test]
    fn insert_keeps_rows_sorted() {
        let mut lexicon = Lexicon::default();
        lexicon.insert("MATERIAL", variant("ent_b", "μέλι"));
        lexicon.insert("MATERIAL", variant("ent_a", "οἶνος"));
        lexicon.insert("MATERIAL", variant("ent_a", "ἔλαιον"));
        let ids: Vec<_> = lexicon.variants("MATERIAL").iter().map(|v| (v.entity_id.as_str(), v.variant_norm.as_str())).collect();
        assert_eq!(ids, vec![("ent_a", "ελαιον"), ("ent_a", "οινος"), ("ent_b", "μελι")]);
    }

    #[test]
    fn phrase_table_keys_multiword_variants() {
        let vocab = Vocabulary::standard();
        let mut lexicon = Lexicon::default();
        lexicon.insert("TOOL", variant("ent_tool_1", "χαλκοῦν ἀγγεῖον"));
        lexicon.insert("MATERIAL", variant("ent_mat_1", "ὕδωρ"));
        lexicon.insert("MATERIAL", variant("ent_mat_1", "ὕδωρ"));
        lexicon.insert("MATERIAL", variant("ent_mat_2", "a b c d e f"));
        lexicon.insert("NOWHERE", variant("ent_x", "τόπος"));

        let table = lexicon.phrase_table(&vocab, 5);
        let key = vec!["χαλκουν".to_string(), "αγγειον".to_string()];
        let hit = table.lookup(&key).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit.iter().next().unwrap().mention_type, "INSTRUMENT");
        assert_eq!(table.lookup(&["υδωρ".to_string()]).map(BTreeSet::len), Some(1));
        assert!(table.lookup(&["τοπος".to_string()]).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn exact_table_reports_every_candidate() {
        let mut lexicon = Lexicon::default();
        lexicon.insert("PLACE", variant("ent_place_1", "Πέργαμον"));
        lexicon.insert("PLACE", variant("ent_place_2", "Πέργαμον"));
        let table = lexicon.exact_table();
        assert_eq!(table.lookup("PLACE", "περγαμον").map(BTreeSet::len), Some(2));
        assert!(table.lookup("TOOL", "περγαμον").is_none());
    }

    #[test]
    fn lexicon_json_is_keyed_by_type() {
        let mut lexicon = Lexicon::default();
        lexicon.insert("PLACE", variant("ent_place_1", "Ῥώμη"));
        let raw = serde_json::to_string(&lexicon).unwrap();
        assert!(raw.starts_with(r#"{"PLACE":[{"entity_id":"ent_place_1""#));
        let back: Lexicon = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, lexicon);
    }
}
