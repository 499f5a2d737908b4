//! Splits a raw query string into OR branches, quoted phrases and residual
//! words. Word-level concerns (wildcards, stoplists, lengths) are left to
//! the tokenizer at execution time.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedQuery {
    pub branches: Vec<QueryBranch>,
}

/// One disjunct of the query: its quoted phrases in order of appearance and
/// whatever bare words remain once the phrases are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueryBranch {
    pub phrases: Vec<String>,
    pub residual: Option<String>,
}

fn phrase_regex() -> &'static Regex {
    static PHRASE: OnceLock<Regex> = OnceLock::new();
    PHRASE.get_or_init(|| Regex::new("\"(.*?)\"").expect("the phrase pattern is valid"))
}

pub(crate) fn parse_query(query: &str) -> ParsedQuery {
    let branches = query.split(" OR ").map(parse_branch).collect();
    ParsedQuery { branches }
}

fn parse_branch(branch: &str) -> QueryBranch {
    let mut phrases = Vec::new();
    let residual = phrase_regex().replace_all(branch, |captures: &regex::Captures| {
        if !captures[1].trim().is_empty() {
            phrases.push(captures[1].to_string());
        }
        String::new()
    });

    let residual = residual.trim();
    let residual = (!residual.is_empty()).then(|| residual.to_string());
    QueryBranch { phrases, residual }
}
