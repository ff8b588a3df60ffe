//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the metadata database")]
    Database,
    #[display("account operation failed")]
    Account,
    #[display("storage pool operation failed")]
    Pool,
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
}
