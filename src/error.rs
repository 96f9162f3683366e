use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not load metadata from {}", _0.display())]
    Catalog(#[error(not(source))] PathBuf),
    #[display("could not write patched metadata for {_0}")]
    Persist(#[error(not(source))] String),
    #[display("could not read {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A store could not be opened or named no configured store.
    #[display("store {_0}")]
    Store(#[error(not(source))] String),
    #[display("{_0}")]
    Plan(#[error(not(source))] String),
    #[display("could not write output")]
    Output,
}
