use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpError>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] minirel_io::Error),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl From<minirel_core::Error> for OpError {
    fn from(e: minirel_core::Error) -> Self {
        match e {
            minirel_core::Error::Config(msg) => OpError::Config(msg),
            minirel_core::Error::Invariant(msg) => OpError::Invariant(msg),
        }
    }
}
