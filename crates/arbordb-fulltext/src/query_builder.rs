use std::collections::{BTreeSet, HashSet};
use std::mem;

use arbordb_tokenizer::TextInfo;
use regex::RegexBuilder;
use tracing::debug;

use crate::metadata::{decode_occurs, OCCURS_KEY};
use crate::query_parser::{parse_query, QueryBranch};
use crate::store::{
    BlacklistingSearchOperator, QueryHint, QueryResults, QueryStats, RecordIndex, ValueOp,
};
use crate::{Error, FtResult, FullTextIndex};

/// Options of one query execution.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Locale used to tokenize the query, the index default when absent.
    pub locale: Option<String>,
    /// Requires the bare words of the query to occur contiguously in order.
    pub phrase: bool,
    /// Wildcard words whose first `*` sits before this offset are ignored.
    pub minimum_wildcard_word_length: usize,
}

impl Default for QueryOptions {
    fn default() -> QueryOptions {
        QueryOptions { locale: None, phrase: false, minimum_wildcard_word_length: 2 }
    }
}

/// The value side of a query invocation.
pub enum QueryValue<'a> {
    Text(&'a str),
    Blacklisting(BlacklistingSearchOperator<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FullTextOp {
    Contains,
    NotContains,
}

impl FullTextOp {
    pub(crate) fn parse(op: &str) -> FtResult<FullTextOp> {
        match op {
            "fulltext:contains" => Ok(FullTextOp::Contains),
            "fulltext:!contains" => Ok(FullTextOp::NotContains),
            other => Err(Error::UnsupportedOperator(other.to_string())),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            FullTextOp::Contains => "fulltext:contains",
            FullTextOp::NotContains => "fulltext:!contains",
        }
    }
}

pub(crate) fn execute(
    index: &FullTextIndex,
    store: &dyn RecordIndex,
    op: FullTextOp,
    query: &str,
    options: &QueryOptions,
) -> FtResult<QueryResults> {
    let normalized = query.trim().to_lowercase();
    if let Some(results) = store.cached(op.as_str(), &normalized)? {
        debug!("fulltext cache hit for {} \"{}\"", op.as_str(), normalized);
        return Ok(results);
    }

    let results = match op {
        FullTextOp::Contains => execute_contains(index, store, query, options, options.phrase)?,
        FullTextOp::NotContains => execute_not_contains(index, store, query, options)?,
    };

    store.cache(op.as_str(), &normalized, &strip_for_cache(&results))?;
    Ok(results)
}

fn execute_contains(
    index: &FullTextIndex,
    store: &dyn RecordIndex,
    query: &str,
    options: &QueryOptions,
    phrase: bool,
) -> FtResult<QueryResults> {
    let parsed = parse_query(query);

    if parsed.branches.len() > 1 {
        let mut branch_results = Vec::with_capacity(parsed.branches.len());
        for branch in &parsed.branches {
            branch_results.push(execute_branch(index, store, branch, options, phrase)?);
        }
        return Ok(union_results(index.key(), query, branch_results));
    }

    match parsed.branches.first() {
        Some(branch) => execute_branch(index, store, branch, options, phrase),
        None => Ok(QueryResults::with_filter_key(index.key())),
    }
}

fn execute_branch(
    index: &FullTextIndex,
    store: &dyn RecordIndex,
    branch: &QueryBranch,
    options: &QueryOptions,
    phrase: bool,
) -> FtResult<QueryResults> {
    if branch.phrases.is_empty() {
        let residual = branch.residual.as_deref().unwrap_or("");
        return execute_words(index, store, residual, options, phrase);
    }

    let mut args = branch.phrases.clone();
    let mut subsets = Vec::with_capacity(branch.phrases.len() + 1);
    for phrase_text in &branch.phrases {
        subsets.push(execute_words(index, store, phrase_text, options, true)?);
    }
    if let Some(residual) = &branch.residual {
        args.push(residual.clone());
        subsets.push(execute_words(index, store, residual, options, phrase)?);
    }

    Ok(intersect_results(index.key(), args, subsets))
}

/// Executes the bare words of one (sub)query: tokenize, prune, order by
/// cardinality, then chain the per-word tree queries so that each one only
/// sees the paths the previous one kept.
fn execute_words(
    index: &FullTextIndex,
    store: &dyn RecordIndex,
    query: &str,
    options: &QueryOptions,
    phrase: bool,
) -> FtResult<QueryResults> {
    let mut hints = Vec::new();
    let sequence = query_words(index, query, options, &mut hints)?;
    let words = unique_words(&sequence);
    let mut stats = QueryStats::new("fulltext_query", vec![query.trim().to_string()]);

    if words.is_empty() {
        let mut results = QueryResults::with_filter_key(index.key());
        results.stats = stats;
        results.hints = hints;
        return Ok(results);
    }

    let mut counted = Vec::with_capacity(words.len());
    for (position, word) in words.iter().enumerate() {
        let count = store.count(word_value_op(word), word)?;
        counted.push((position, word.clone(), count));
    }

    if counted.iter().any(|(_, _, count)| *count == 0) {
        for (_, word, count) in &counted {
            if *count == 0 {
                hints.push(QueryHint::MissingWord(word.clone()));
            }
        }
        let mut results = QueryResults::with_filter_key(index.key());
        results.stats = stats;
        results.hints = hints;
        return Ok(results);
    }

    // most selective word first
    counted.sort_by_key(|(_, _, count)| *count);

    let mut word_results: Vec<QueryResults> = vec![QueryResults::default(); words.len()];
    let mut chained: Option<QueryResults> = None;
    for (position, word, _count) in counted {
        let step = store.query(word_value_op(&word), &word, chained.as_ref())?;
        stats.steps.push(step.stats.clone());
        word_results[position] = step.clone();
        chained = Some(step);
    }
    let mut results = chained.unwrap_or_default();

    // The phrase walk runs over the full token sequence, repeats included:
    // a repeated word claims one slot per occurrence.
    if phrase && sequence.len() >= 2 {
        results.entries.retain(|entry| {
            let mut position_lists = Vec::with_capacity(sequence.len());
            for word in &sequence {
                let Some(word_index) = words.iter().position(|known| known == word) else {
                    return false;
                };
                let positions = word_results[word_index]
                    .entries
                    .iter()
                    .find(|candidate| candidate.path == entry.path)
                    .and_then(|candidate| candidate.metadata.as_ref())
                    .and_then(|metadata| metadata.get(OCCURS_KEY))
                    .map(|encoded| decode_occurs(encoded));
                match positions {
                    Some(positions) => position_lists.push(positions),
                    None => return false,
                }
            }
            phrase_match(&position_lists)
        });
    }

    results.filter_key = Some(index.key().to_string());
    results.stats = stats;
    results.hints = hints;
    Ok(results)
}

fn execute_not_contains(
    index: &FullTextIndex,
    store: &dyn RecordIndex,
    query: &str,
    options: &QueryOptions,
) -> FtResult<QueryResults> {
    let mut hints = Vec::new();
    let words = unique_words(&query_words(index, query, options, &mut hints)?);
    let mut checks = Vec::with_capacity(words.len());
    for word in &words {
        checks.push(word_check(word)?);
    }

    let operator = BlacklistingSearchOperator::new(move |entry| {
        checks
            .iter()
            .any(|check| check.matches(&entry.key))
            .then(|| entry.values.clone())
    });

    let mut results = store.query_blacklisting(&operator)?;
    let mut stats = QueryStats::new("fulltext_not_contains", vec![query.trim().to_string()]);
    stats.steps.push(mem::take(&mut results.stats));
    results.filter_key = Some(index.key().to_string());
    results.stats = stats;
    results.hints = hints;
    Ok(results)
}

/// Tokenizes a query fragment into the ordered sequence of its kept words,
/// repeats included, pruning wildcard words that cannot be answered.
/// Everything pruned ends up in `hints`, once per distinct word.
fn query_words(
    index: &FullTextIndex,
    text: &str,
    options: &QueryOptions,
    hints: &mut Vec<QueryHint>,
) -> FtResult<Vec<String>> {
    let info = TextInfo::from_text(Some(text), &index.query_tokenize_options(options))?;
    for word in &info.ignored {
        hints.push(QueryHint::IgnoredWord(word.clone()));
    }

    let mut sequence: Vec<String> = Vec::new();
    for word in info.to_sequence() {
        let pruned = word.chars().all(|c| c == '*' || c == '?')
            || word.find('*').is_some_and(|position| {
                position < options.minimum_wildcard_word_length
            });
        if pruned {
            let hint = QueryHint::IgnoredWord(word.to_string());
            if !hints.contains(&hint) {
                hints.push(hint);
            }
            continue;
        }
        sequence.push(word.to_string());
    }

    Ok(sequence)
}

/// The distinct words of a token sequence, in first-occurrence order.
fn unique_words(sequence: &[String]) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in sequence {
        if !words.contains(word) {
            words.push(word.clone());
        }
    }
    words
}

fn word_value_op(word: &str) -> ValueOp {
    if word.contains(['*', '?']) {
        ValueOp::Like
    } else {
        ValueOp::Eq
    }
}

enum WordCheck {
    Literal(String),
    Pattern(regex::Regex),
}

impl WordCheck {
    fn matches(&self, key: &str) -> bool {
        match self {
            WordCheck::Literal(word) => key == word,
            WordCheck::Pattern(pattern) => pattern.is_match(key),
        }
    }
}

fn word_check(word: &str) -> FtResult<WordCheck> {
    if !word.contains(['*', '?']) {
        return Ok(WordCheck::Literal(word.to_string()));
    }

    let mut pattern = String::from("^");
    for c in word.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    let pattern = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
    Ok(WordCheck::Pattern(pattern))
}

/// A record holds the phrase iff some starting position `p` has the i-th
/// phrase word occurring at `p + i` for every i.
fn phrase_match(position_lists: &[Vec<u32>]) -> bool {
    let Some((first, rest)) = position_lists.split_first() else {
        return false;
    };
    'candidates: for &start in first {
        for (offset, positions) in rest.iter().enumerate() {
            let expected = start + offset as u32 + 1;
            if positions.binary_search(&expected).is_err() {
                continue 'candidates;
            }
        }
        return true;
    }
    false
}

fn union_results(key: &str, query: &str, sets: Vec<QueryResults>) -> QueryResults {
    let mut union = QueryResults::with_filter_key(key);
    union.stats = QueryStats::new("fulltext_or", vec![query.trim().to_string()]);
    let mut seen = HashSet::new();
    for set in sets {
        union.stats.steps.push(set.stats);
        union.hints.extend(set.hints);
        for entry in set.entries {
            if seen.insert(entry.path.clone()) {
                union.entries.push(entry);
            }
        }
    }
    union
}

fn intersect_results(key: &str, args: Vec<String>, sets: Vec<QueryResults>) -> QueryResults {
    let mut intersection = QueryResults::with_filter_key(key);
    intersection.stats = QueryStats::new("fulltext_and", args);
    for set in &sets {
        intersection.stats.steps.push(set.stats.clone());
        intersection.hints.extend(set.hints.iter().cloned());
    }

    // pivot on the smallest set, keep what every other set also holds
    let pivot = sets.iter().enumerate().min_by_key(|(_, set)| set.len()).map(|(i, _)| i);
    let Some(pivot) = pivot else { return intersection };
    let others: Vec<HashSet<&str>> = sets
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pivot)
        .map(|(_, set)| set.entries.iter().map(|entry| entry.path.as_str()).collect())
        .collect();

    for entry in &sets[pivot].entries {
        if others.iter().all(|paths| paths.contains(entry.path.as_str())) {
            intersection.entries.push(entry.clone());
        }
    }
    intersection
}

fn strip_for_cache(results: &QueryResults) -> QueryResults {
    let mut stripped = results.clone();
    for entry in &mut stripped.entries {
        entry.metadata = None;
    }
    stripped
}

/// Index-free counterpart of the executor, deciding whether an already
/// loaded record text matches the query.
pub(crate) fn record_contains(
    index: &FullTextIndex,
    info: &TextInfo,
    query: &str,
    options: &QueryOptions,
) -> FtResult<bool> {
    for branch in parse_query(query).branches {
        if branch_matches(index, info, &branch, options)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn branch_matches(
    index: &FullTextIndex,
    info: &TextInfo,
    branch: &QueryBranch,
    options: &QueryOptions,
) -> FtResult<bool> {
    let mut hints = Vec::new();

    for phrase in &branch.phrases {
        // one slot per occurrence, repeated phrase words included
        let sequence = query_words(index, phrase, options, &mut hints)?;
        let mut position_lists = Vec::with_capacity(sequence.len());
        for word in &sequence {
            let positions = word_positions(info, word)?;
            if positions.is_empty() {
                return Ok(false);
            }
            position_lists.push(positions);
        }
        if !position_lists.is_empty() && !phrase_match(&position_lists) {
            return Ok(false);
        }
    }

    if let Some(residual) = &branch.residual {
        for word in query_words(index, residual, options, &mut hints)? {
            if word_positions(info, &word)?.is_empty() {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn word_positions(info: &TextInfo, word: &str) -> FtResult<Vec<u32>> {
    if word.contains(['*', '?']) {
        let check = word_check(word)?;
        let mut positions = BTreeSet::new();
        for (candidate, word_info) in &info.words {
            if check.matches(candidate) {
                positions.extend(word_info.indexes.iter().copied());
            }
        }
        Ok(positions.into_iter().collect())
    } else {
        Ok(info.get(word).map(|word_info| word_info.indexes.clone()).unwrap_or_default())
    }
}
