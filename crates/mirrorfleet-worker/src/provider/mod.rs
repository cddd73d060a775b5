//! Sync providers.
//!
//! A [`Provider`] runs one sync to completion. The mechanism is a tagged
//! variant (`rsync`, `two-stage-rsync`, `command`) behind one capability
//! surface: run, terminate, is-running, data size, the directory accessors,
//! and the ordered hook list.

mod command;
mod rsync;
mod two_stage;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::config::{flag, split_list, Config};
use crate::error::{Error, Result};
use crate::hooks::{ExecOn, ExecPostHook, JobHook, LogRotateHook, SnapshotHook};
use crate::runner::CmdJob;
use crate::util::{dir_size, extract_size_from_log, extract_size_from_rsync_log};

use command::CommandOptions;
pub use rsync::rsync_exit_message;
use rsync::RsyncOptions;
use two_stage::TwoStageOptions;

const DEFAULT_MAX_RETRY: usize = 2;

enum ProviderKind {
    Rsync(RsyncOptions),
    TwoStageRsync(TwoStageOptions),
    Command(CommandOptions),
}

struct Stage {
    argv: Vec<String>,
    append_log: bool,
}

pub struct Provider {
    name: String,
    upstream: String,
    interval: Duration,
    retry: usize,
    timeout: Duration,
    working_dir: PathBuf,
    log_dir: PathBuf,
    log_file: PathBuf,

    kind: ProviderKind,
    hooks: Vec<Box<dyn JobHook>>,

    active: Mutex<Option<Arc<CmdJob>>>,
    running: AtomicBool,
    data_size: AtomicU64,
}

impl Provider {
    pub fn from_config(cfg: &Config) -> Result<Arc<Self>> {
        let working_dir = Path::new(&cfg.mirror_dir).join(&cfg.name);
        let log_dir = PathBuf::from(&cfg.log_dir);
        let log_file = log_dir.join("latest.log");

        let kind = match cfg.provider.as_str() {
            "rsync" => ProviderKind::Rsync(RsyncOptions::from_config(cfg)?),
            "two-stage-rsync" => ProviderKind::TwoStageRsync(TwoStageOptions::from_config(cfg)?),
            "command" => ProviderKind::Command(CommandOptions::from_config(cfg)?),
            other => return Err(Error::Config(format!("invalid mirror provider: {other}"))),
        };

        let mut provider = Self {
            name: cfg.name.clone(),
            upstream: cfg.upstream.clone(),
            interval: Duration::from_secs(cfg.interval * 60),
            retry: if cfg.retry == 0 {
                DEFAULT_MAX_RETRY
            } else {
                cfg.retry
            },
            timeout: Duration::from_secs(cfg.timeout),
            working_dir: working_dir.clone(),
            log_dir: log_dir.clone(),
            log_file: log_file.clone(),
            kind,
            hooks: Vec::new(),
            active: Mutex::new(None),
            running: AtomicBool::new(false),
            data_size: AtomicU64::new(0),
        };

        provider.hooks.push(Box::new(LogRotateHook::new(
            &cfg.name,
            log_dir.clone(),
            log_file.clone(),
        )));
        if flag(&cfg.zfs) && !cfg.zpool.is_empty() {
            provider.hooks.push(Box::new(SnapshotHook::zfs(
                &cfg.name,
                working_dir.clone(),
                &cfg.zpool,
            )));
        }
        if flag(&cfg.btrfs) && !cfg.snapshot_path.is_empty() {
            provider.hooks.push(Box::new(SnapshotHook::btrfs(
                &cfg.name,
                working_dir.clone(),
                &cfg.snapshot_path,
            )));
        }

        let hook_env = CommandOptions::job_env(
            &cfg.name,
            &cfg.upstream,
            &working_dir,
            &log_dir,
            &log_file,
        );
        for line in split_list(&cfg.exec_on_success) {
            provider.hooks.push(Box::new(ExecPostHook::new(
                ExecOn::Success,
                &line,
                working_dir.clone(),
                hook_env.clone(),
            )?));
        }
        for line in split_list(&cfg.exec_on_failure) {
            provider.hooks.push(Box::new(ExecPostHook::new(
                ExecOn::Failure,
                &line,
                working_dir.clone(),
                hook_env.clone(),
            )?));
        }

        Ok(Arc::new(provider))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry(&self) -> usize {
        self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn data_size(&self) -> u64 {
        self.data_size.load(Ordering::SeqCst)
    }

    pub fn hooks(&self) -> &[Box<dyn JobHook>] {
        &self.hooks
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stages(&self) -> Vec<Stage> {
        let upstream = self.upstream.as_str();
        let dest = self.working_dir.display().to_string();
        match &self.kind {
            ProviderKind::Rsync(opts) => vec![Stage {
                argv: opts.argv(upstream, &dest),
                append_log: false,
            }],
            ProviderKind::TwoStageRsync(opts) => vec![
                Stage {
                    argv: opts.stage1_argv(upstream, &dest),
                    append_log: false,
                },
                Stage {
                    argv: opts.stage2_argv(upstream, &dest),
                    append_log: true,
                },
            ],
            ProviderKind::Command(opts) => vec![Stage {
                argv: opts.argv(),
                append_log: false,
            }],
        }
    }

    fn job_env(&self) -> HashMap<String, String> {
        CommandOptions::job_env(
            &self.name,
            &self.upstream,
            &self.working_dir,
            &self.log_dir,
            &self.log_file,
        )
    }

    fn open_log(&self, append: bool) -> Result<std::fs::File> {
        std::fs::create_dir_all(&self.log_dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.log_file)?;
        Ok(file)
    }

    /// Run one sync to completion. Returns [`Error::AlreadyRunning`] while a
    /// prior run is still in flight.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        let result = self.run_stages().await;
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_stages(&self) -> Result<()> {
        self.data_size.store(0, Ordering::SeqCst);
        let env = self.job_env();

        for stage in self.stages() {
            let log = self.open_log(stage.append_log)?;
            let cmd = Arc::new(CmdJob::spawn(
                &stage.argv,
                &self.working_dir,
                &env,
                Some(log),
            )?);
            if let Ok(mut active) = self.active.lock() {
                *active = Some(cmd.clone());
            }
            let status = cmd.wait().await?;
            if !status.success() {
                return Err(self.translate_failure(status.code()));
            }
        }

        match &self.kind {
            ProviderKind::Rsync(_) | ProviderKind::TwoStageRsync(_) => {
                self.data_size.store(
                    extract_size_from_rsync_log(&self.log_file),
                    Ordering::SeqCst,
                );
            }
            ProviderKind::Command(opts) => {
                if let Some(re) = &opts.fail_on_match {
                    let content = std::fs::read_to_string(&self.log_file).unwrap_or_default();
                    if re.is_match(&content) {
                        return Err(Error::Sync(format!(
                            "matched fail-on-match pattern: {re}"
                        )));
                    }
                }
                let size = match &opts.size_pattern {
                    Some(re) => extract_size_from_log(&self.log_file, re),
                    None => dir_size(&self.working_dir),
                };
                self.data_size.store(size, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn translate_failure(&self, code: Option<i32>) -> Error {
        let rsyncish = matches!(
            self.kind,
            ProviderKind::Rsync(_) | ProviderKind::TwoStageRsync(_)
        );
        if rsyncish {
            if let Some(msg) = code.and_then(rsync_exit_message) {
                let msg = format!("rsync error: {msg}");
                debug!("rsync exitcode {:?} ({msg})", code);
                if let Ok(mut log) = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&self.log_file)
                {
                    let _ = writeln!(log, "{msg}");
                }
                return Error::Sync(msg);
            }
        }
        match code {
            Some(code) => Error::Sync(format!("sync command exited with code {code}")),
            None => Error::Sync("sync command killed by signal".to_string()),
        }
    }

    /// Terminate the in-flight subprocess, if any.
    pub async fn terminate(&self) -> Result<()> {
        let cmd = self.active.lock().ok().and_then(|a| a.clone());
        match cmd {
            Some(cmd) => cmd.terminate().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_config(dir: &Path, command: &str) -> Config {
        Config {
            name: "unit".into(),
            provider: "command".into(),
            upstream: "https://example.org/repo".into(),
            command: command.into(),
            mirror_dir: dir.join("data").display().to_string(),
            log_dir: dir.join("log").display().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = command_config(dir.path(), "true");
        cfg.provider = "ftp".into();
        assert!(Provider::from_config(&cfg).is_err());
    }

    #[test]
    fn retry_defaults_to_two() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Provider::from_config(&command_config(dir.path(), "true")).unwrap();
        assert_eq!(provider.retry(), 2);
    }

    #[test]
    fn exec_hooks_join_the_hook_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = command_config(dir.path(), "true");
        cfg.exec_on_success = "echo ok".into();
        cfg.exec_on_failure = "echo bad;echo worse".into();
        let provider = Provider::from_config(&cfg).unwrap();
        // log rotation + one success hook + two failure hooks
        assert_eq!(provider.hooks().len(), 4);
    }

    #[tokio::test]
    async fn command_run_writes_log_and_sizes_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = command_config(
            dir.path(),
            "echo syncing $NAME && dd if=/dev/zero of=payload bs=1 count=64 2>/dev/null",
        );
        let provider = Provider::from_config(&cfg).unwrap();

        provider.run().await.unwrap();

        let log = std::fs::read_to_string(provider.log_file()).unwrap();
        assert!(log.contains("syncing unit"));
        assert_eq!(provider.data_size(), 64);
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn failing_command_surfaces_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Provider::from_config(&command_config(dir.path(), "exit 7")).unwrap();
        let err = provider.run().await.unwrap_err();
        assert!(err.to_string().contains("exited with code 7"));
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn fail_on_match_fails_a_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = command_config(dir.path(), "echo '@ERROR something'");
        cfg.fail_on_match = "@ERROR".into();
        let provider = Provider::from_config(&cfg).unwrap();
        assert!(provider.run().await.is_err());
    }

    #[tokio::test]
    async fn size_pattern_overrides_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = command_config(dir.path(), "echo 'Mirror size: 3.00M'");
        cfg.size_pattern = r"Mirror size: ([0-9.]+[KMGT]?)".into();
        let provider = Provider::from_config(&cfg).unwrap();
        provider.run().await.unwrap();
        assert_eq!(provider.data_size(), 3 * 1024 * 1024);
    }

    #[tokio::test]
    async fn second_run_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Provider::from_config(&command_config(dir.path(), "sleep 5")).unwrap();
        let p = provider.clone();
        let task = tokio::spawn(async move { p.run().await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(provider.is_running());
        assert!(matches!(
            provider.run().await.unwrap_err(),
            Error::AlreadyRunning
        ));

        provider.terminate().await.unwrap();
        let _ = task.await.unwrap();
        assert!(!provider.is_running());
    }
}
