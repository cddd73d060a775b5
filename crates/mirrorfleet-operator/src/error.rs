use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("no active manager in this namespace")]
    NoActiveManager,

    #[error("already have one active manager in this namespace")]
    ManagerConflict,

    #[error("upstream not set")]
    UpstreamNotSet,

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::KubeError(_) | Error::NoActiveManager)
    }
}
