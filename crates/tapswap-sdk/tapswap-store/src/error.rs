use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("SDK error: {0}")]
    Sdk(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

impl From<tapswap_sdk::Error> for StoreError {
    fn from(e: tapswap_sdk::Error) -> Self {
        StoreError::Sdk(e.to_string())
    }
}

impl From<StoreError> for tapswap_sdk::Error {
    fn from(e: StoreError) -> Self {
        tapswap_sdk::Error::Repository(e.to_string())
    }
}
