use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::JobHook;
use crate::error::{Error, Result};
use crate::runner::CmdJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOn {
    Success,
    Failure,
}

/// Runs one configured shell line after a sync attempt.
pub struct ExecPostHook {
    on: ExecOn,
    command: String,
    working_dir: PathBuf,
    env: HashMap<String, String>,
}

impl ExecPostHook {
    pub fn new(
        on: ExecOn,
        command: &str,
        working_dir: PathBuf,
        env: HashMap<String, String>,
    ) -> Result<Self> {
        if command.trim().is_empty() {
            return Err(Error::Config("empty exec-on hook command".to_string()));
        }
        Ok(Self {
            on,
            command: command.to_string(),
            working_dir,
            env,
        })
    }

    async fn run(&self) -> Result<()> {
        info!("running exec hook: {}", self.command);
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            self.command.clone(),
        ];
        let job = CmdJob::spawn(&argv, &self.working_dir, &self.env, None)?;
        let status = job.wait().await?;
        if !status.success() {
            return Err(Error::Sync(format!(
                "exec hook `{}` exited with {status}",
                self.command
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobHook for ExecPostHook {
    async fn post_success(&self) -> Result<()> {
        if self.on == ExecOn::Success {
            self.run().await?;
        }
        Ok(())
    }

    async fn post_fail(&self) -> Result<()> {
        if self.on == ExecOn::Failure {
            self.run().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_only_on_its_phase() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let hook = ExecPostHook::new(
            ExecOn::Success,
            &format!("touch {}", marker.display()),
            dir.path().to_path_buf(),
            HashMap::new(),
        )
        .unwrap();

        hook.post_fail().await.unwrap();
        assert!(!marker.exists());

        hook.post_success().await.unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn failing_hook_surfaces_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let hook = ExecPostHook::new(
            ExecOn::Failure,
            "exit 1",
            dir.path().to_path_buf(),
            HashMap::new(),
        )
        .unwrap();
        assert!(hook.post_fail().await.is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(ExecPostHook::new(
            ExecOn::Success,
            "  ",
            PathBuf::from("/tmp"),
            HashMap::new()
        )
        .is_err());
    }
}
