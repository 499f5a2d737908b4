//! Text tokenization for the full-text index.
//!
//! Turns a raw text value into a [`TextInfo`]: the set of normalized words
//! it contains, the position and source offset of every occurrence, and the
//! list of words that were ignored along the way. The same pipeline is used
//! when indexing record values and when interpreting query strings, so both
//! sides agree on what a "word" is.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use deunicode::deunicode_with_tofu;
use regex::RegexBuilder;

pub mod locale;

pub use locale::{LocaleSettings, PatternFlags, DEFAULT_PATTERN};

/// Hook replacing the text before any matching happens. Receives the text,
/// the resolved locale and the characters that must be kept intact.
pub type PrepareFn = Arc<dyn Fn(&str, &str, &str) -> String + Send + Sync>;

/// Stemming hook applied to every matched word. Returning `None` routes the
/// word to the ignored list.
pub type StemmingFn = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

pub type TokenizeResult<T> = Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot include extra characters in a word pattern without a character class: `{pattern}`")]
    PatternShape { pattern: String },
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// All the knobs of the tokenization pipeline. The defaults match what the
/// index uses when the caller configures nothing: locale-driven pattern and
/// flags, single-character words kept, words clamped at 25 characters, no
/// stoplist.
#[derive(Clone)]
pub struct TokenizeOptions {
    pub locale: Option<String>,
    /// Overrides the locale word pattern when set.
    pub pattern: Option<String>,
    /// Overrides the locale pattern flags when set.
    pub flags: Option<PatternFlags>,
    /// Extra characters spliced into every character class of the pattern,
    /// e.g. `*?` to keep wildcards alive in query strings.
    pub include_chars: Option<String>,
    pub prepare: Option<PrepareFn>,
    pub stemming: Option<StemmingFn>,
    pub min_length: usize,
    pub max_length: usize,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub use_stoplist: bool,
}

impl Default for TokenizeOptions {
    fn default() -> TokenizeOptions {
        TokenizeOptions {
            locale: None,
            pattern: None,
            flags: None,
            include_chars: None,
            prepare: None,
            stemming: None,
            min_length: 1,
            max_length: 25,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            use_stoplist: false,
        }
    }
}

/// Positions of one normalized word within a text: the word indexes in the
/// sequence of kept words and the matching byte offsets in the normalized
/// source. Both lists grow in tokenization order and always have the same
/// length.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordInfo {
    pub indexes: Vec<u32>,
    pub source_indexes: Vec<u32>,
}

impl WordInfo {
    pub fn occurs(&self) -> usize {
        self.indexes.len()
    }
}

/// The outcome of tokenizing one text value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextInfo {
    pub locale: String,
    pub words: BTreeMap<String, WordInfo>,
    /// Words routed away by stemming, length or blacklist criteria, unique
    /// and in first-seen order.
    pub ignored: Vec<String>,
}

impl TextInfo {
    /// Tokenizes `text` with the given options. A missing text produces an
    /// empty `TextInfo`, never an error.
    pub fn from_text(text: Option<&str>, options: &TokenizeOptions) -> TokenizeResult<TextInfo> {
        let locale = options.locale.as_deref().unwrap_or("default");
        let settings = locale::get(locale);

        let mut pattern = match &options.pattern {
            Some(pattern) => pattern.clone(),
            None => settings.pattern.to_string(),
        };
        if let Some(chars) = options.include_chars.as_deref() {
            if !pattern.contains('[') {
                return Err(Error::PatternShape { pattern });
            }
            let mut escaped = String::new();
            for c in chars.chars() {
                escaped.push_str(&regex::escape(&c.to_string()));
            }
            // splice after every character class opening
            pattern = pattern.replace('[', &format!("[{}", escaped));
        }
        let flags = options.flags.unwrap_or(settings.flags);

        let mut blacklist: HashSet<&str> =
            options.blacklist.iter().map(String::as_str).collect();
        if options.use_stoplist {
            if let Some(stop_words) = settings.stop_words {
                blacklist.extend(stop_words.iter().copied());
            }
        }
        let whitelist: HashSet<&str> = options.whitelist.iter().map(String::as_str).collect();

        let mut info = TextInfo { locale: locale.to_string(), ..TextInfo::default() };
        let mut text = match text {
            Some(text) => text.to_string(),
            None => return Ok(info),
        };

        if let Some(prepare) = &options.prepare {
            let keep_chars = format!("\"{}", options.include_chars.as_deref().unwrap_or(""));
            text = prepare(&text, locale, &keep_chars);
        }

        // Some transliterators decompose in multiple passes, run until the
        // text no longer changes.
        loop {
            let transliterated = deunicode_with_tofu(&text, "");
            if transliterated == text {
                break;
            }
            text = transliterated;
        }

        text.retain(|c| c != '\'');

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(flags.case_insensitive)
            .multi_line(flags.multi_line)
            .build()?;

        let mut word_index = 0u32;
        for found in regex.find_iter(&text) {
            let mut word = found.as_str().to_string();

            if let Some(stemming) = &options.stemming {
                match stemming(&word, locale) {
                    Some(stemmed) => word = stemmed,
                    None => {
                        // the word index must not advance for ignored words,
                        // and the ignored list only holds lowercased forms
                        info.push_ignored(&word.to_lowercase());
                        continue;
                    }
                }
            }

            word = word.to_lowercase();

            if word.chars().count() < options.min_length || blacklist.contains(word.as_str()) {
                if !whitelist.contains(word.as_str()) {
                    info.push_ignored(&word);
                    continue;
                }
            }

            if word.chars().count() > options.max_length {
                word = word.chars().take(options.max_length).collect();
            }

            let word_info = info.words.entry(word).or_default();
            word_info.indexes.push(word_index);
            word_info.source_indexes.push(found.start() as u32);
            word_index += 1;
        }

        Ok(info)
    }

    pub fn get(&self, word: &str) -> Option<&WordInfo> {
        self.words.get(word)
    }

    /// Reconstructs the sequence of kept words, ordered by word index.
    pub fn to_sequence(&self) -> Vec<&str> {
        let mut sequence = vec![""; self.word_count()];
        for (word, info) in &self.words {
            for &index in &info.indexes {
                sequence[index as usize] = word.as_str();
            }
        }
        sequence
    }

    /// The unique words of the text.
    pub fn to_array(&self) -> Vec<&str> {
        self.words.keys().map(String::as_str).collect()
    }

    /// Total number of kept word occurrences.
    pub fn word_count(&self) -> usize {
        self.words.values().map(WordInfo::occurs).sum()
    }

    pub fn unique_word_count(&self) -> usize {
        self.words.len()
    }

    fn push_ignored(&mut self, word: &str) {
        if !self.ignored.iter().any(|ignored| ignored == word) {
            self.ignored.push(word.to_string());
        }
    }
}
