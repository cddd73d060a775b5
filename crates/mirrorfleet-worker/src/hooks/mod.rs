//! Pre/post-execution hooks on a provider.
//!
//! A hook implements whichever phases it cares about; call sites iterate the
//! provider's hook list in order at each phase.

mod exec_post;
mod log_rotate;
mod snapshot;

use async_trait::async_trait;

use crate::error::Result;

pub use exec_post::{ExecOn, ExecPostHook};
pub use log_rotate::LogRotateHook;
pub use snapshot::SnapshotHook;

#[async_trait]
pub trait JobHook: Send + Sync {
    /// Once per trigger, before any attempt.
    async fn pre_job(&self) -> Result<()> {
        Ok(())
    }
    /// Before each sync attempt.
    async fn pre_exec(&self) -> Result<()> {
        Ok(())
    }
    /// After each sync attempt, success or not.
    async fn post_exec(&self) -> Result<()> {
        Ok(())
    }
    /// After a successful attempt.
    async fn post_success(&self) -> Result<()> {
        Ok(())
    }
    /// After a failed attempt.
    async fn post_fail(&self) -> Result<()> {
        Ok(())
    }
}
