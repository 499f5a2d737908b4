use std::error;

pub type FtResult<T> = Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fulltext indexes cannot be created on the record key itself")]
    InvalidKey,
    #[error(transparent)]
    Tokenize(#[from] arbordb_tokenizer::Error),
    #[error("operator `{0}` is not supported by fulltext indexes")]
    UnsupportedOperator(String),
    #[error("fulltext indexes cannot be queried with a blacklisting search operator")]
    NotImplemented,
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error("record index error: {0}")]
    Substrate(#[source] Box<dyn error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a failure coming from the underlying record index.
    pub fn substrate(error: impl error::Error + Send + Sync + 'static) -> Error {
        Error::Substrate(Box::new(error))
    }
}
