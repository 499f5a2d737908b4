//! Process-wide registry of per-locale tokenization settings.
//!
//! A locale entry overrides the defaults field by field; anything it leaves
//! out is inherited. Lookups for regional codes fall back to the part after
//! the first `-` (`nl-BE` retries as `BE`) before falling back to defaults.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// The word pattern used when a locale does not define its own.
pub const DEFAULT_PATTERN: &str = "[A-Za-z0-9']+";

/// Regex flags applied to the word pattern of a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
}

impl Default for PatternFlags {
    fn default() -> PatternFlags {
        PatternFlags { case_insensitive: true, multi_line: true }
    }
}

/// Fully resolved settings for one locale.
#[derive(Debug, Clone)]
pub struct LocaleSettings {
    pub pattern: &'static str,
    pub flags: PatternFlags,
    pub stop_words: Option<&'static [&'static str]>,
}

#[derive(Default)]
struct LocaleOverride {
    pattern: Option<&'static str>,
    flags: Option<PatternFlags>,
    stop_words: Option<&'static [&'static str]>,
}

static LOCALES: Lazy<HashMap<&'static str, LocaleOverride>> = Lazy::new(|| {
    let mut locales = HashMap::new();
    locales.insert("default", LocaleOverride::default());
    locales.insert(
        "en",
        LocaleOverride { stop_words: Some(STOP_WORDS_EN), ..LocaleOverride::default() },
    );
    locales
});

/// Resolves the settings for `locale`, merging its overrides into the
/// defaults. Unknown regional locales retry with the segment after the
/// first `-`; anything still unknown resolves to the defaults.
pub fn get(locale: &str) -> LocaleSettings {
    let entry = LOCALES.get(locale).or_else(|| {
        locale
            .split_once('-')
            .and_then(|(_, region)| LOCALES.get(region))
    });

    let defaults = LocaleSettings {
        pattern: DEFAULT_PATTERN,
        flags: PatternFlags::default(),
        stop_words: None,
    };

    match entry {
        Some(overrides) => LocaleSettings {
            pattern: overrides.pattern.unwrap_or(defaults.pattern),
            flags: overrides.flags.unwrap_or(defaults.flags),
            stop_words: overrides.stop_words.or(defaults.stop_words),
        },
        None => defaults,
    }
}

/// The standard English stoplist, opted into with `use_stoplist`.
pub static STOP_WORDS_EN: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your",
    "yours", "yourself", "yourselves", "he", "him", "his", "himself", "she",
    "her", "hers", "herself", "it", "its", "itself", "they", "them", "their",
    "theirs", "themselves", "what", "which", "who", "whom", "this", "that",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of",
    "at", "by", "for", "with", "about", "against", "between", "into",
    "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again",
    "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some",
    "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
    "very", "s", "t", "can", "will", "just", "don", "should", "now",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_locale() {
        let settings = get("default");
        assert_eq!(settings.pattern, DEFAULT_PATTERN);
        assert!(settings.flags.case_insensitive);
        assert!(settings.flags.multi_line);
        assert!(settings.stop_words.is_none());
    }

    #[test]
    fn english_inherits_pattern_and_carries_stop_words() {
        let settings = get("en");
        assert_eq!(settings.pattern, DEFAULT_PATTERN);
        assert_eq!(settings.stop_words, Some(STOP_WORDS_EN));
        assert_eq!(STOP_WORDS_EN.len(), 127);
    }

    #[test]
    fn regional_locale_retries_with_region() {
        // `x-en` resolves through the region segment.
        let settings = get("x-en");
        assert_eq!(settings.stop_words, Some(STOP_WORDS_EN));

        // `nl-BE` knows neither part and resolves to the defaults.
        let settings = get("nl-BE");
        assert_eq!(settings.pattern, DEFAULT_PATTERN);
        assert!(settings.stop_words.is_none());
    }

    #[test]
    fn unknown_locale_resolves_to_defaults() {
        let settings = get("zz");
        assert_eq!(settings.pattern, DEFAULT_PATTERN);
        assert!(settings.stop_words.is_none());
    }
}
