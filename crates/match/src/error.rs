use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The external metadata service failed or returned garbage.
    #[display("metadata provider error")]
    Provider,
    /// The catalog store failed.
    #[display("catalog store error")]
    Store,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        true
    }
}
