//! Subprocess runner: one command wired to a log file, with idempotent wait
//! and SIGTERM→SIGKILL termination.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};

struct ChildState {
    child: Option<Child>,
    status: Option<ExitStatus>,
}

pub struct CmdJob {
    pid: i32,
    state: Mutex<ChildState>,
    finished_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<bool>,
}

impl CmdJob {
    /// Spawn `cmd_and_args` in `working_dir` (created if missing) with the
    /// process environment plus `env` (the per-run map wins on collisions).
    /// When a log file is given, stdout and stderr are appended to it.
    pub fn spawn(
        cmd_and_args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
        log_file: Option<std::fs::File>,
    ) -> Result<Self> {
        let program = cmd_and_args
            .first()
            .ok_or_else(|| Error::Config("empty command".to_string()))?;

        if !working_dir.exists() {
            debug!("making dir {}", working_dir.display());
            std::fs::create_dir_all(working_dir)?;
        }

        let mut cmd = Command::new(program);
        cmd.args(&cmd_and_args[1..])
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::null());
        if let Some(file) = log_file {
            cmd.stdout(Stdio::from(file.try_clone()?));
            cmd.stderr(Stdio::from(file));
        }

        debug!("command start: {:?}", cmd_and_args);
        let child = cmd.spawn()?;
        let pid = child.id().ok_or(Error::NotStarted)? as i32;

        let (finished_tx, finished_rx) = watch::channel(false);
        Ok(Self {
            pid,
            state: Mutex::new(ChildState {
                child: Some(child),
                status: None,
            }),
            finished_tx,
            finished_rx,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Wait for the process to exit. Safe to call more than once; later
    /// calls return the recorded exit status.
    pub async fn wait(&self) -> Result<ExitStatus> {
        let mut state = self.state.lock().await;
        if let Some(status) = state.status {
            return Ok(status);
        }
        let mut child = state.child.take().ok_or(Error::NotStarted)?;
        let status = child.wait().await?;
        state.status = Some(status);
        let _ = self.finished_tx.send(true);
        Ok(status)
    }

    /// SIGTERM the process; if it has not exited within two seconds, SIGKILL.
    pub async fn terminate(&self) -> Result<()> {
        if *self.finished_rx.borrow() {
            return Ok(());
        }

        match signal::kill(Pid::from_raw(self.pid), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => return Err(Error::Sync(format!("failed to signal process: {e}"))),
        }

        let mut rx = self.finished_rx.clone();
        if tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|done| *done))
            .await
            .is_err()
        {
            warn!("SIGTERM failed to kill the job in 2s. SIGKILL sent");
            let _ = signal::kill(Pid::from_raw(self.pid), Signal::SIGKILL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(line: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), line.to_string()]
    }

    #[tokio::test]
    async fn runs_and_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("latest.log");
        let log = std::fs::File::create(&log_path).unwrap();

        let job = CmdJob::spawn(&sh("echo hello"), dir.path(), &HashMap::new(), Some(log)).unwrap();
        let status = job.wait().await.unwrap();
        assert!(status.success());
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.trim(), "hello");
    }

    #[tokio::test]
    async fn wait_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let job = CmdJob::spawn(&sh("exit 3"), dir.path(), &HashMap::new(), None).unwrap();
        let first = job.wait().await.unwrap();
        let second = job.wait().await.unwrap();
        assert_eq!(first.code(), Some(3));
        assert_eq!(second.code(), Some(3));
    }

    #[tokio::test]
    async fn per_run_env_wins_over_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("latest.log");
        let log = std::fs::File::create(&log_path).unwrap();
        std::env::set_var("RUNNER_TEST_VAR", "parent");

        let env = HashMap::from([("RUNNER_TEST_VAR".to_string(), "child".to_string())]);
        let job = CmdJob::spawn(&sh("echo $RUNNER_TEST_VAR"), dir.path(), &env, Some(log)).unwrap();
        job.wait().await.unwrap();
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.trim(), "child");
    }

    #[tokio::test]
    async fn terminate_interrupts_a_long_run() {
        let dir = tempfile::tempdir().unwrap();
        let job = std::sync::Arc::new(
            CmdJob::spawn(&sh("sleep 30"), dir.path(), &HashMap::new(), None).unwrap(),
        );

        let waiter = tokio::spawn({
            let job = job.clone();
            async move { job.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        job.terminate().await.unwrap();
        let status = waiter.await.unwrap().unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn creates_missing_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let job = CmdJob::spawn(&sh("pwd"), &nested, &HashMap::new(), None).unwrap();
        job.wait().await.unwrap();
        assert!(nested.exists());
    }
}
