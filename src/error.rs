//! Error types for the qmx codec

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("output buffer too small for encoded stream")]
    OutputTooSmall,

    #[error("value requires more than 32 bits")]
    WidthOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;
