//! Contract consumed from the underlying record index.
//!
//! The fulltext index owns tokenization, diffing and query planning; the
//! record index (a generic B+tree over scalar keys) owns durability, layout
//! and concurrency. A full-text field is modeled as one logical record per
//! contained word, all sharing the same record pointer, which is why every
//! operation here is keyed on a single word.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::FtResult;

/// Metadata attached to one index entry value.
pub type IndexMetadata = BTreeMap<String, String>;

/// Opaque identifier of a record in the underlying database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordPointer(pub String);

/// Scalar comparison operators understood by the record index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    Eq,
    Like,
}

impl fmt::Display for ValueOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueOp::Eq => write!(f, "=="),
            ValueOp::Like => write!(f, "like"),
        }
    }
}

/// One matching record in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub path: String,
    pub metadata: Option<IndexMetadata>,
}

/// Non-error metadata describing why a query returned fewer or zero results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryHint {
    /// The word was dropped before execution: stoplisted, too short, or a
    /// wildcard token below the minimum length.
    IgnoredWord(String),
    /// The word occurs in no record at all.
    MissingWord(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub operation: String,
    pub args: Vec<String>,
    pub steps: Vec<QueryStats>,
}

impl QueryStats {
    pub fn new(operation: impl Into<String>, args: Vec<String>) -> QueryStats {
        QueryStats { operation: operation.into(), args, steps: Vec::new() }
    }
}

/// An ordered set of matching records with its stats block and hints.
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    pub filter_key: Option<String>,
    pub entries: Vec<QueryResult>,
    pub stats: QueryStats,
    pub hints: Vec<QueryHint>,
}

impl QueryResults {
    pub fn with_filter_key(key: &str) -> QueryResults {
        QueryResults { filter_key: Some(key.to_string()), ..QueryResults::default() }
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One entry of the underlying tree as seen by a blacklisting scan.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: String,
    pub values: Vec<QueryResult>,
}

/// Scan-time negation: the record index walks every entry, calls the check,
/// and excludes the returned values from the ultimate record set.
pub struct BlacklistingSearchOperator<'a> {
    check: Box<dyn Fn(&IndexEntry) -> Option<Vec<QueryResult>> + 'a>,
}

impl<'a> BlacklistingSearchOperator<'a> {
    pub fn new(check: impl Fn(&IndexEntry) -> Option<Vec<QueryResult>> + 'a) -> Self {
        BlacklistingSearchOperator { check: Box::new(check) }
    }

    /// Returns the values of `entry` that must be excluded, if any.
    pub fn check_entry(&self, entry: &IndexEntry) -> Option<Vec<QueryResult>> {
        (self.check)(entry)
    }
}

impl fmt::Debug for BlacklistingSearchOperator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BlacklistingSearchOperator").finish_non_exhaustive()
    }
}

/// Value types a rebuild may encounter; the fulltext index only posts words
/// for string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
}

/// Environment handed to the rebuild callback for each record.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    pub locale: Option<String>,
}

/// Callback posting one word of one record during a rebuild.
pub type AddWord<'a> = dyn FnMut(&str, &RecordPointer, Option<IndexMetadata>) + 'a;

/// Full-rebuild wiring: for every indexed record the record index calls
/// `add_callback` with the raw value and expects back the words it posted.
pub struct BuildOptions<'a> {
    #[allow(clippy::type_complexity)]
    pub add_callback: Box<
        dyn Fn(
                &mut AddWord,
                &Value,
                &RecordPointer,
                Option<&IndexMetadata>,
                &BuildEnv,
            ) -> FtResult<Vec<String>>
            + 'a,
    >,
    pub value_types: Vec<ValueType>,
}

/// The operations the fulltext index consumes from the record index.
///
/// All mutations are keyed on the scalar value found at `key` in the passed
/// old/new likes; `filter` restricts a query to the paths of a previous
/// result set. The cache pair memoizes result sets per `(operator, query)`.
pub trait RecordIndex {
    fn handle_record_update(
        &self,
        path: &str,
        old: &Value,
        new: &Value,
        metadata: Option<IndexMetadata>,
    ) -> FtResult<()>;

    fn count(&self, op: ValueOp, value: &str) -> FtResult<usize>;

    fn query(
        &self,
        op: ValueOp,
        value: &str,
        filter: Option<&QueryResults>,
    ) -> FtResult<QueryResults>;

    fn query_blacklisting(
        &self,
        operator: &BlacklistingSearchOperator<'_>,
    ) -> FtResult<QueryResults>;

    fn build(&self, options: BuildOptions<'_>) -> FtResult<()>;

    fn cached(&self, op: &str, query: &str) -> FtResult<Option<QueryResults>>;

    fn cache(&self, op: &str, query: &str, results: &QueryResults) -> FtResult<()>;
}
