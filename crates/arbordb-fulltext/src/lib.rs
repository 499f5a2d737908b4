//! Full-text secondary indexing for hierarchical key-value records.
//!
//! Given a string key of the records stored at a path, [`FullTextIndex`]
//! tokenizes the text, maintains an inverted word → record mapping inside a
//! generic record index (the [`store::RecordIndex`] contract) and answers
//! containment queries: bags of words, quoted phrases, `OR` disjunctions,
//! `*`/`?` wildcards and negation.

mod error;
mod index;
mod metadata;
mod query_builder;
mod query_parser;
pub mod store;

pub use arbordb_tokenizer as tokenizer;

pub use self::error::{Error, FtResult};
pub use self::index::{FullTextIndex, FullTextIndexOptions, IndexDescription, INDEX_TYPE};
pub use self::metadata::{decode_occurs, encode_occurs, OCCURS_KEY};
pub use self::query_builder::{QueryOptions, QueryValue};
