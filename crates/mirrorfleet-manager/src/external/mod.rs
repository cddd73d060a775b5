//! External mirror systems expanded at list time.
//!
//! An external `Job` entry is data-only: instead of running a worker, the
//! coordinator asks the external system for its mirror list on every read.

mod gitea;

use async_trait::async_trait;

use mirrorfleet_api::{JobConfig, MirrorStatus};

use crate::mirrorz;

pub use gitea::GiteaProvider;

#[derive(thiserror::Error, Debug)]
pub enum ExternalError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Invalid(String),
}

#[async_trait]
pub trait External: Send + Sync {
    /// Mirror list as `/jobs` entries.
    async fn list(&self) -> Result<Vec<MirrorStatus>, ExternalError>;
    /// Mirror list as mirrorz catalogue entries.
    async fn list_z(&self) -> Result<Vec<mirrorz::Mirror>, ExternalError>;
}

/// Resolve the provider named in the job config, if any.
pub fn provider(cfg: &JobConfig, http: &reqwest::Client) -> Option<Box<dyn External>> {
    match cfg.provider.as_str() {
        "gitea" => Some(Box::new(GiteaProvider::new(
            cfg.upstream.clone(),
            http.clone(),
        ))),
        _ => None,
    }
}
