//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not set up the source")]
    Source,
    #[display("could not set up the destination")]
    Destination,
    #[display("transfer aborted")]
    Transfer,
    #[display("restructure aborted")]
    Restructure,
}
