use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid address")]
    InvalidAddress,
    #[error("Invalid 256-bit word")]
    InvalidWord,
}
