use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider is currently running")]
    AlreadyRunning,

    #[error("process not started")]
    NotStarted,

    /// A sync run failed; the message carries the translated subprocess
    /// error and ends up in the job's `errorMsg`.
    #[error("{0}")]
    Sync(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
