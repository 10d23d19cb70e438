use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("a page fetch is already in flight for this loader")]
    FetchInFlight,

    #[error("search exhausted: no continuation state to resume from")]
    NoContinuation,

    #[error("no refresh state: the current search cannot be refreshed")]
    NoRefresh,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, QuarryError>;
