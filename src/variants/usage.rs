//! Static scan of recipe text for the variant keys it consults.
//!
//! No template evaluation happens here. A `compiler('<lang>')` call (single or double
//! quotes, optionally backslash-escaped) means the recipe needs both the per-language
//! compiler key and `target_platform`, because that is what `compiler()` reads.

use regex::Regex;
use std::sync::OnceLock;

use super::{TARGET_PLATFORM_KEY, VariantKeySet};
use crate::compilers::Language;

fn compiler_patterns() -> &'static [(Language, Regex)] {
    static PATTERNS: OnceLock<Vec<(Language, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Language::ALL
            .iter()
            .filter_map(|lang| {
                let language = regex::escape(lang.as_str());
                let pattern = format!(r#"compiler\(\\?['"]{language}\\?['"]\)"#);
                Regex::new(&pattern).ok().map(|re| (*lang, re))
            })
            .collect()
    })
}

/// Variant keys consulted by `text` through `compiler()` calls.
///
/// For each language whose compiler is requested, the result contains
/// `<lang>_compiler` and `target_platform`. Text without compiler calls yields an
/// empty set.
///
/// # Examples
///
/// ```rust
/// use recipe_render::variants::used_variant_keys;
///
/// let keys = used_variant_keys("requirements:\n  build:\n    - {{ compiler('c') }}\n");
/// let keys: Vec<_> = keys.into_iter().collect();
/// assert_eq!(keys, vec!["c_compiler", "target_platform"]);
/// ```
#[must_use]
pub fn used_variant_keys(text: &str) -> VariantKeySet {
    let mut used = VariantKeySet::new();
    for (lang, re) in compiler_patterns() {
        if re.is_match(text) {
            used.insert(lang.compiler_key());
            used.insert(TARGET_PLATFORM_KEY.to_string());
        }
    }
    used
}

/// Like [`used_variant_keys`], additionally reporting every key of `universe` that
/// appears in `text` as a whole word.
///
/// This is how a variant matrix is pruned to the dimensions a recipe can observe.
#[must_use]
pub fn used_variant_keys_in<'a, I>(text: &str, universe: I) -> VariantKeySet
where
    I: IntoIterator<Item = &'a String>,
{
    let mut used = used_variant_keys(text);
    for key in universe {
        if mentions_word(text, key) {
            used.insert(key.clone());
        }
    }
    used
}

fn mentions_word(text: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    if word.is_empty() {
        return false;
    }
    text.match_indices(word).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(set: &VariantKeySet) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_compiler_calls_in_all_quote_styles() {
        let text = r#"
  - {{ compiler('c') }}
  - {{ compiler("cxx") }}
  - "{{ compiler(\'fortran\') }}"
"#;
        assert_eq!(
            keys(&used_variant_keys(text)),
            vec!["c_compiler", "cxx_compiler", "fortran_compiler", "target_platform"]
        );
    }

    #[test]
    fn test_no_compiler_calls() {
        assert!(used_variant_keys("package:\n  name: foo\n").is_empty());
        // runtime() is not a compiler request
        assert!(used_variant_keys("{{ runtime('c') }}").is_empty());
        assert!(used_variant_keys("{{ compiler('rust') }}").is_empty());
    }

    #[test]
    fn test_universe_keys_as_whole_words() {
        let universe: Vec<String> = vec!["python".into(), "numpy".into(), "perl".into()];
        let text = "{{ variant.python }} {{ pythonic }} {{ compiler('c') }}";
        assert_eq!(
            keys(&used_variant_keys_in(text, &universe)),
            vec!["c_compiler", "python", "target_platform"]
        );
    }

    #[test]
    fn test_result_is_subset_of_universe_and_compiler_keys() {
        let universe: Vec<String> = vec!["numpy".into()];
        let used = used_variant_keys_in("{{ numpy }} {{ compiler('cxx') }} {{ other }}", &universe);
        for key in &used {
            assert!(universe.contains(key) || key == "cxx_compiler" || key == "target_platform");
        }
    }
}
