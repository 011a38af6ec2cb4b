//! Tokenization and comparison-form normalization.
//!
//! Every span in the system is an offset into the token list produced here,
//! so both functions are pure and total: the same input under the same
//! version tags always yields the same output, byte for byte. Any change to
//! their behavior must bump the matching version constant so stored token
//! indexes can be detected as stale.

use unicode_normalization::UnicodeNormalization;

/// Version tag of [`tokenize`].
pub const TOKENIZER_VERSION: &str = "unicode_alnum_v1";

/// Version tag of [`normalize`].
pub const NORMALIZER_VERSION: &str = "greek_nfd_v1";

/// Combining Greek ypogegrammeni, folded onto a full iota before marks are stripped.
const YPOGEGRAMMENI: char = '\u{0345}';
const IOTA: char = 'ι';

/// Split `text` into maximal runs of alphanumeric code points.
///
/// The input is NFC-composed first. Everything that is not alphanumeric is a
/// separator and is dropped, so no token is ever empty.
///
/// "Alphanumeric" is the Unicode `Alphabetic` or `Numeric` property, which
/// includes `Other_Alphabetic` combining marks (a lone ypogegrammeni, Indic
/// vowel signs). Those stay inside their word; other combining marks that
/// survive composition split it.
///
/// ```
/// use goldweave::tokenize;
///
/// assert_eq!(tokenize("ὕδωρ, καὶ — πῦρ."), vec!["ὕδωρ", "καὶ", "πῦρ"]);
/// assert!(tokenize("  ;; ").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    for ch in text.nfc() {
        if ch.is_alphanumeric() {
            buf.push(ch);
        } else if !buf.is_empty() {
            tokens.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        tokens.push(buf);
    }
    tokens
}

/// Case- and diacritic-folded comparison form.
///
/// NFD, ypogegrammeni → `ι`, strip U+0300..=U+036F, lowercase. The fold is
/// re-applied after lowercasing because a few lowercase mappings produce
/// combining marks (`İ` → `i̇`); without it the function would not be
/// idempotent.
///
/// ```
/// use goldweave::normalize;
///
/// assert_eq!(normalize("Ὕδωρ"), "υδωρ");
/// assert_eq!(normalize("ᾠδῇ"), "ωιδηι");
/// ```
pub fn normalize(text: &str) -> String {
    let lowered = fold_marks(text).to_lowercase();
    fold_marks(&lowered)
}

fn fold_marks(text: &str) -> String {
    text.nfd().map(|c| if c == YPOGEGRAMMENI { IOTA } else { c }).filter(|c| !is_stripped_mark(*c)).collect()
}

fn is_stripped_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tokenize_drops_separators() {
        assert_eq!(tokenize("a-b  c"), vec!["a", "b", "c"]);
        assert_eq!(tokenize("Περὶ κράσεως, 12."), vec!["Περὶ", "κράσεως", "12"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("... --- !!!").is_empty());
    }

    #[test]
    fn tokenize_composes_before_grouping() {
        // "ά" as alpha + combining acute stays inside the token after NFC.
        let decomposed = "κα\u{0301}λλος";
        assert_eq!(tokenize(decomposed), vec!["κάλλος"]);
    }

    #[test]
    fn normalize_folds_case_and_diacritics() {
        assert_eq!(normalize("Περὶ"), "περι");
        assert_eq!(normalize("ὕδωρ"), "υδωρ");
        assert_eq!(normalize("τῷ"), "τωι");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("ABC def"), "abc def");
    }

    #[test]
    fn normalize_is_idempotent_for_dotted_capital_i() {
        let once = normalize("İstanbul");
        assert_eq!(once, "istanbul");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn alphabetic_marks_stay_inside_words() {
        assert_eq!(tokenize("α\u{0345}"), vec!["ᾳ"]);
        assert_eq!(tokenize("ρ\u{0345}α"), vec!["ρ\u{0345}α"]);
        assert_eq!(tokenize("कि तो"), vec!["कि", "तो"]);
        // U+0301 has no composed form on `x`; it is not alphabetic.
        assert_eq!(tokenize("x\u{0301}y"), vec!["x", "y"]);
    }

    proptest! {
        #[test]
        fn normalize_idempotent(s in "\\PC{0,40}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn tokenize_total_and_deterministic(s in "\\PC{0,60}") {
            let first = tokenize(&s);
            prop_assert!(first.iter().all(|t| !t.is_empty()));
            prop_assert_eq!(tokenize(&s), first);
        }
    }
}
