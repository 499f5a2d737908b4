use arbordb_tokenizer::{PrepareFn, StemmingFn, TextInfo, TokenizeOptions};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::metadata::{encode_occurs, OCCURS_KEY};
use crate::query_builder::{self, FullTextOp, QueryOptions, QueryValue};
use crate::store::{
    AddWord, BuildEnv, BuildOptions, IndexMetadata, QueryResults, RecordIndex, RecordPointer,
    ValueType,
};
use crate::{Error, FtResult};

/// Key that records use to reference themselves; it carries no text and
/// cannot be fulltext indexed.
const RESERVED_KEY: &str = "{key}";

/// Type tag of fulltext indexes in the index header.
pub const INDEX_TYPE: &str = "fulltext";

/// Construction-time configuration of a fulltext index.
#[derive(Clone)]
pub struct FullTextIndexOptions {
    /// Default locale of the indexed texts.
    pub locale: String,
    /// Record key holding the locale of that record's text, when records
    /// carry mixed languages.
    pub locale_key: Option<String>,
    /// Hook rewriting the text before tokenization.
    pub prepare: Option<PrepareFn>,
    /// Word transform applied to every matched word, e.g. a stemmer.
    pub transform: Option<StemmingFn>,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub use_stoplist: bool,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for FullTextIndexOptions {
    fn default() -> FullTextIndexOptions {
        FullTextIndexOptions {
            locale: "en".to_string(),
            locale_key: None,
            prepare: None,
            transform: None,
            blacklist: Vec::new(),
            whitelist: Vec::new(),
            use_stoplist: false,
            min_length: 1,
            max_length: 25,
        }
    }
}

/// A fulltext secondary index over one string key of the records at a path.
///
/// The index owns tokenization, diffing and query planning only; postings
/// live in the underlying record index, one logical record per contained
/// word, all sharing the record's pointer.
pub struct FullTextIndex {
    key: String,
    options: FullTextIndexOptions,
}

/// Self-description of an index, the shape the database lists indexes in.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDescription {
    #[serde(rename = "type")]
    pub index_type: &'static str,
    pub key: String,
    pub locale: String,
    pub locale_key: Option<String>,
    pub metadata_keys: Vec<&'static str>,
}

impl FullTextIndex {
    pub fn new(key: impl Into<String>, options: FullTextIndexOptions) -> FtResult<FullTextIndex> {
        let key = key.into();
        if key == RESERVED_KEY {
            return Err(Error::InvalidKey);
        }
        Ok(FullTextIndex { key, options })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &FullTextIndexOptions {
        &self.options
    }

    /// The operators answerable by this index type.
    pub fn valid_operators() -> &'static [&'static str] {
        &["fulltext:contains", "fulltext:!contains"]
    }

    pub fn describe(&self) -> IndexDescription {
        IndexDescription {
            index_type: INDEX_TYPE,
            key: self.key.clone(),
            locale: self.options.locale.clone(),
            locale_key: self.options.locale_key.clone(),
            metadata_keys: vec![OCCURS_KEY],
        }
    }

    /// Reflects one record update into the underlying tree: tokenizes the
    /// old and new text, diffs the word sets and delegates one keyed
    /// mutation per removed or added word. Words whose positions changed
    /// are removed and re-added to refresh their metadata.
    pub fn handle_record_update(
        &self,
        store: &dyn RecordIndex,
        path: &str,
        old_record: &Value,
        new_record: &Value,
    ) -> FtResult<()> {
        let old_text = text_from_value(old_record.get(&self.key));
        let new_text = text_from_value(new_record.get(&self.key));

        let old_locale = self.record_locale(old_record);
        let new_locale = self.record_locale(new_record);
        let old_info =
            TextInfo::from_text(old_text.as_deref(), &self.tokenize_options(&old_locale, None))?;
        let new_info =
            TextInfo::from_text(new_text.as_deref(), &self.tokenize_options(&new_locale, None))?;

        if new_text.is_some() && new_info.unique_word_count() == 0 {
            warn!("no words to index for \"{}/{}\"", path, self.key);
        }

        let mut removed: Vec<&str> = old_info
            .words
            .keys()
            .filter(|word| !new_info.words.contains_key(*word))
            .map(String::as_str)
            .collect();
        let mut added: Vec<&str> = new_info
            .words
            .keys()
            .filter(|word| !old_info.words.contains_key(*word))
            .map(String::as_str)
            .collect();
        for (word, old_word) in &old_info.words {
            if let Some(new_word) = new_info.words.get(word) {
                if old_word.indexes != new_word.indexes {
                    removed.push(word.as_str());
                    added.push(word.as_str());
                }
            }
        }

        for word in removed {
            store.handle_record_update(
                path,
                &self.keyed(Value::String(word.to_string())),
                &self.keyed(Value::Null),
                None,
            )?;
        }
        for word in added {
            let Some(word_info) = new_info.get(word) else { continue };
            let metadata = IndexMetadata::from([(
                OCCURS_KEY.to_string(),
                encode_occurs(&word_info.indexes, word, path),
            )]);
            let mutated = match new_record {
                Value::Object(map) => {
                    let mut map = map.clone();
                    map.insert(self.key.clone(), Value::String(word.to_string()));
                    Value::Object(map)
                }
                _ => self.keyed(Value::String(word.to_string())),
            };
            store.handle_record_update(path, &self.keyed(Value::Null), &mutated, Some(metadata))?;
        }

        Ok(())
    }

    /// Full rebuild: hands the record index a callback posting every word
    /// of every string value it encounters.
    pub fn build(&self, store: &dyn RecordIndex) -> FtResult<()> {
        let add_callback = Box::new(
            |add: &mut AddWord,
             raw_value: &Value,
             pointer: &RecordPointer,
             _metadata: Option<&IndexMetadata>,
             env: &BuildEnv|
             -> FtResult<Vec<String>> {
                let locale = env.locale.as_deref().unwrap_or(&self.options.locale);
                let text = text_from_value(Some(raw_value));
                let info =
                    TextInfo::from_text(text.as_deref(), &self.tokenize_options(locale, None))?;

                if info.unique_word_count() == 0 {
                    warn!("no words to index for \"{}/{}\"", pointer.0, self.key);
                    return Ok(Vec::new());
                }

                let mut posted = Vec::with_capacity(info.unique_word_count());
                for (word, word_info) in &info.words {
                    let metadata = IndexMetadata::from([(
                        OCCURS_KEY.to_string(),
                        encode_occurs(&word_info.indexes, word, &pointer.0),
                    )]);
                    add(word, pointer, Some(metadata));
                    posted.push(word.clone());
                }
                Ok(posted)
            },
        );

        store.build(BuildOptions { add_callback, value_types: vec![ValueType::String] })
    }

    /// Runs a fulltext query against the underlying tree.
    pub fn query(
        &self,
        store: &dyn RecordIndex,
        op: &str,
        value: &QueryValue<'_>,
        options: &QueryOptions,
    ) -> FtResult<QueryResults> {
        let op = FullTextOp::parse(op)?;
        let query = match value {
            QueryValue::Text(query) => query,
            QueryValue::Blacklisting(_) => return Err(Error::NotImplemented),
        };
        query_builder::execute(self, store, op, query, options)
    }

    /// Decides whether an already loaded record matches the query, without
    /// consulting the underlying tree.
    pub fn test_record(&self, record: &Value, op: &str, query: &str) -> FtResult<bool> {
        let op = FullTextOp::parse(op)?;
        let locale = self.record_locale(record);
        let text = text_from_value(record.get(&self.key));
        let info = TextInfo::from_text(text.as_deref(), &self.tokenize_options(&locale, None))?;
        let contains = query_builder::record_contains(self, &info, query, &QueryOptions::default())?;
        Ok(match op {
            FullTextOp::Contains => contains,
            FullTextOp::NotContains => !contains,
        })
    }

    pub(crate) fn tokenize_options(
        &self,
        locale: &str,
        include_chars: Option<&str>,
    ) -> TokenizeOptions {
        TokenizeOptions {
            locale: Some(locale.to_string()),
            include_chars: include_chars.map(str::to_string),
            prepare: self.options.prepare.clone(),
            stemming: self.options.transform.clone(),
            min_length: self.options.min_length,
            max_length: self.options.max_length,
            blacklist: self.options.blacklist.clone(),
            whitelist: self.options.whitelist.clone(),
            use_stoplist: self.options.use_stoplist,
            ..TokenizeOptions::default()
        }
    }

    pub(crate) fn query_tokenize_options(&self, options: &QueryOptions) -> TokenizeOptions {
        let locale = options.locale.as_deref().unwrap_or(&self.options.locale);
        self.tokenize_options(locale, Some("*?"))
    }

    fn record_locale(&self, record: &Value) -> String {
        self.options
            .locale_key
            .as_deref()
            .and_then(|key| record.get(key))
            .and_then(Value::as_str)
            .unwrap_or(&self.options.locale)
            .to_string()
    }

    fn keyed(&self, value: Value) -> Value {
        let mut map = Map::new();
        map.insert(self.key.clone(), value);
        Value::Object(map)
    }
}

/// The text carried by an indexed value: strings index as-is, string arrays
/// join with a single space, anything else holds no text.
fn text_from_value(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Array(values)) => {
            let parts: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
            Some(parts.join(" "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use big_s::S;
    use serde_json::json;

    use super::*;
    use crate::store::{BlacklistingSearchOperator, ValueOp};

    /// Records every keyed mutation the maintainer delegates.
    struct RecordingIndex {
        key: String,
        calls: RefCell<Vec<Call>>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        path: String,
        old: Option<String>,
        new: Option<String>,
        occurs: Option<String>,
    }

    impl RecordingIndex {
        fn new(key: &str) -> RecordingIndex {
            RecordingIndex { key: key.to_string(), calls: RefCell::new(Vec::new()) }
        }

        fn added(&self) -> Vec<Call> {
            self.calls.borrow().iter().filter(|call| call.new.is_some()).cloned().collect()
        }

        fn removed(&self) -> Vec<Call> {
            self.calls.borrow().iter().filter(|call| call.old.is_some()).cloned().collect()
        }
    }

    impl RecordIndex for RecordingIndex {
        fn handle_record_update(
            &self,
            path: &str,
            old: &Value,
            new: &Value,
            metadata: Option<IndexMetadata>,
        ) -> FtResult<()> {
            self.calls.borrow_mut().push(Call {
                path: path.to_string(),
                old: old.get(&self.key).and_then(Value::as_str).map(str::to_string),
                new: new.get(&self.key).and_then(Value::as_str).map(str::to_string),
                occurs: metadata.and_then(|metadata| metadata.get(OCCURS_KEY).cloned()),
            });
            Ok(())
        }

        fn count(&self, _op: ValueOp, _value: &str) -> FtResult<usize> {
            unimplemented!()
        }

        fn query(
            &self,
            _op: ValueOp,
            _value: &str,
            _filter: Option<&QueryResults>,
        ) -> FtResult<QueryResults> {
            unimplemented!()
        }

        fn query_blacklisting(
            &self,
            _operator: &BlacklistingSearchOperator<'_>,
        ) -> FtResult<QueryResults> {
            unimplemented!()
        }

        fn build(&self, _options: BuildOptions<'_>) -> FtResult<()> {
            unimplemented!()
        }

        fn cached(&self, _op: &str, _query: &str) -> FtResult<Option<QueryResults>> {
            Ok(None)
        }

        fn cache(&self, _op: &str, _query: &str, _results: &QueryResults) -> FtResult<()> {
            Ok(())
        }
    }

    #[test]
    fn the_reserved_key_is_rejected() {
        let result = FullTextIndex::new("{key}", FullTextIndexOptions::default());
        assert!(matches!(result, Err(Error::InvalidKey)));
    }

    #[test]
    fn describes_itself() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let description = index.describe();

        assert_eq!(description.index_type, "fulltext");
        assert_eq!(description.key, "text");
        assert_eq!(description.metadata_keys, vec!["_occurs_"]);
        assert_eq!(
            FullTextIndex::valid_operators(),
            &["fulltext:contains", "fulltext:!contains"],
        );
    }

    #[test]
    fn a_first_write_adds_every_word() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");

        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({}),
                &json!({ "text": "The quick brown fox" }),
            )
            .unwrap();

        assert!(store.removed().is_empty());
        let added = store.added();
        let words: Vec<(&str, &str)> = added
            .iter()
            .map(|call| (call.new.as_deref().unwrap(), call.occurs.as_deref().unwrap()))
            .collect();
        assert_eq!(words, vec![("brown", "2"), ("fox", "3"), ("quick", "1"), ("the", "0")]);
    }

    #[test]
    fn deleting_the_text_removes_every_word() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");

        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({ "text": "slow green turtles" }),
                &json!({}),
            )
            .unwrap();

        assert!(store.added().is_empty());
        let removed: Vec<String> =
            store.removed().iter().map(|call| call.old.clone().unwrap()).collect();
        assert_eq!(removed, vec![S("green"), S("slow"), S("turtles")]);
    }

    #[test]
    fn unchanged_text_issues_no_mutations() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");
        let record = json!({ "text": "same old song" });

        index.handle_record_update(&store, "songs/r1", &record, &record).unwrap();
        assert!(store.calls.borrow().is_empty());
    }

    #[test]
    fn position_changes_remove_and_re_add() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");

        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({ "text": "night train" }),
                &json!({ "text": "train night" }),
            )
            .unwrap();

        let removed: Vec<String> =
            store.removed().iter().map(|call| call.old.clone().unwrap()).collect();
        let added: Vec<(String, String)> = store
            .added()
            .iter()
            .map(|call| (call.new.clone().unwrap(), call.occurs.clone().unwrap()))
            .collect();
        assert_eq!(removed, vec![S("night"), S("train")]);
        assert_eq!(added, vec![(S("night"), S("1")), (S("train"), S("0"))]);
    }

    #[test]
    fn repeated_words_encode_every_position() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");

        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({}),
                &json!({ "text": "tea for two and tea for me" }),
            )
            .unwrap();

        let added = store.added();
        let tea = added.iter().find(|call| call.new.as_deref() == Some("tea")).unwrap();
        assert_eq!(tea.occurs.as_deref(), Some("0,4"));
    }

    #[test]
    fn array_values_join_with_a_space() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let store = RecordingIndex::new("text");

        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({}),
                &json!({ "text": ["quick brown", "fox"] }),
            )
            .unwrap();

        let added: Vec<(String, String)> = store
            .added()
            .iter()
            .map(|call| (call.new.clone().unwrap(), call.occurs.clone().unwrap()))
            .collect();
        assert_eq!(added, vec![(S("brown"), S("1")), (S("fox"), S("2")), (S("quick"), S("0"))]);
    }

    #[test]
    fn the_record_locale_drives_tokenization() {
        let options = FullTextIndexOptions {
            locale_key: Some(S("lang")),
            use_stoplist: true,
            ..FullTextIndexOptions::default()
        };
        let index = FullTextIndex::new("text", options).unwrap();

        // English record: `the` is stoplisted away
        let store = RecordingIndex::new("text");
        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({}),
                &json!({ "text": "the fox", "lang": "en" }),
            )
            .unwrap();
        let added: Vec<String> =
            store.added().iter().map(|call| call.new.clone().unwrap()).collect();
        assert_eq!(added, vec![S("fox")]);

        // unknown locale: no stoplist applies
        let store = RecordingIndex::new("text");
        index
            .handle_record_update(
                &store,
                "songs/r1",
                &json!({}),
                &json!({ "text": "the fox", "lang": "zz" }),
            )
            .unwrap();
        let added: Vec<String> =
            store.added().iter().map(|call| call.new.clone().unwrap()).collect();
        assert_eq!(added, vec![S("fox"), S("the")]);
    }

    #[test]
    fn tests_a_loaded_record_without_the_tree() {
        let index = FullTextIndex::new("text", FullTextIndexOptions::default()).unwrap();
        let record = json!({ "text": "The quick brown fox" });

        assert!(index.test_record(&record, "fulltext:contains", "brown fox").unwrap());
        assert!(index.test_record(&record, "fulltext:contains", "\"brown fox\"").unwrap());
        assert!(!index.test_record(&record, "fulltext:contains", "\"fox brown\"").unwrap());
        assert!(index.test_record(&record, "fulltext:contains", "br*").unwrap());
        assert!(index.test_record(&record, "fulltext:contains", "turtles OR quick").unwrap());
        assert!(!index.test_record(&record, "fulltext:contains", "turtles").unwrap());
        assert!(index.test_record(&record, "fulltext:!contains", "turtles").unwrap());
        assert!(!index.test_record(&record, "fulltext:!contains", "brown").unwrap());

        // repeated phrase words each claim their own slot
        let record = json!({ "text": "the cat and the dog" });
        assert!(index
            .test_record(&record, "fulltext:contains", "\"the cat and the dog\"")
            .unwrap());
        let record = json!({ "text": "the cat and dog sat" });
        assert!(!index
            .test_record(&record, "fulltext:contains", "\"the cat and the dog\"")
            .unwrap());
    }
}
