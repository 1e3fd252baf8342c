use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The underlying catalog store failed.
    #[display("catalog store error")]
    Store,
    /// A filter word produced an unusable pattern.
    #[display("invalid filter word: {_0}")]
    InvalidFilterWord(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store)
    }
}
