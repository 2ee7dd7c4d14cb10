use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("script compilation failed: {0}")]
    ScriptCompile(String),

    #[error("taproot tree construction failed: {0}")]
    ScriptTree(String),

    #[error("insufficient funding: have {have}, need {need}")]
    InsufficientFunding { have: u64, need: u64 },

    #[error("UTXO selection failed: {0}")]
    UtxoSelection(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("finalize error: {0}")]
    Finalize(String),

    #[error("broadcast error: {0}")]
    Broadcast(String),

    #[error("PSET construction error: {0}")]
    Pset(String),

    #[error("electrum error: {0}")]
    Electrum(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the [`OrderWatcher`](crate::watcher::OrderWatcher) sweep loop.
#[derive(Debug)]
pub enum WatcherError {
    /// A shared mutex was poisoned by a prior panic.
    MutexPoisoned,
    /// The order repository failed while listing or updating orders.
    Repository(Error),
    /// The watcher thread could not be spawned.
    Spawn(String),
}

impl std::fmt::Display for WatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherError::MutexPoisoned => write!(f, "internal mutex poisoned by a prior panic"),
            WatcherError::Repository(e) => write!(f, "repository error: {e}"),
            WatcherError::Spawn(e) => write!(f, "failed to spawn order watcher: {e}"),
        }
    }
}

impl std::error::Error for WatcherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatcherError::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for WatcherError {
    fn from(e: Error) -> Self {
        WatcherError::Repository(e)
    }
}
