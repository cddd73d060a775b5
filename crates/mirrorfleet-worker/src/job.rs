//! The per-job state machine driving one provider.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mirrorfleet_api::SyncStatus;

use crate::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    None = 0,
    Ready = 1,
    Paused = 2,
    Disabled = 3,
    Halting = 4,
}

impl JobState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => JobState::Ready,
            2 => JobState::Paused,
            3 => JobState::Disabled,
            4 => JobState::Halting,
            _ => JobState::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCtrl {
    Start,
    ForceStart,
    Stop,
    Restart,
    Halt,
}

/// Status report emitted by the run loop; `schedule` asks the worker to arm
/// the next run.
#[derive(Debug, Clone)]
pub struct JobMessage {
    pub status: SyncStatus,
    pub msg: String,
    pub schedule: bool,
}

pub struct MirrorJob {
    pub provider: Arc<Provider>,
    state: AtomicU8,
    ctrl_tx: mpsc::Sender<JobCtrl>,
    ctrl_rx: tokio::sync::Mutex<mpsc::Receiver<JobCtrl>>,
}

impl MirrorJob {
    pub fn new(provider: Arc<Provider>) -> Arc<Self> {
        let (ctrl_tx, ctrl_rx) = mpsc::channel(16);
        Arc::new(Self {
            provider,
            state: AtomicU8::new(JobState::None as u8),
            ctrl_tx,
            ctrl_rx: tokio::sync::Mutex::new(ctrl_rx),
        })
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub async fn send_ctrl(&self, ctrl: JobCtrl) {
        if self.ctrl_tx.send(ctrl).await.is_err() {
            warn!("job {} control channel closed", self.name());
        }
    }

    /// The job run loop. Consumes control messages and supervises one sync at
    /// a time; at most one instance runs per job (the control receiver is
    /// exclusive).
    pub async fn run(
        self: Arc<Self>,
        manager_tx: mpsc::Sender<JobMessage>,
        semaphore: Arc<Semaphore>,
    ) {
        let mut rx = self.ctrl_rx.lock().await;

        loop {
            let Some(ctrl) = rx.recv().await else { return };
            let start = match ctrl {
                JobCtrl::Start => self.state() == JobState::Ready,
                JobCtrl::ForceStart | JobCtrl::Restart => self.state() != JobState::Disabled,
                JobCtrl::Stop => {
                    // stop never disables; the job stays startable
                    self.set_state(JobState::Ready);
                    false
                }
                JobCtrl::Halt => {
                    self.set_state(JobState::Halting);
                    return;
                }
            };
            if !start {
                continue;
            }

            self.set_state(JobState::Ready);
            let force = ctrl != JobCtrl::Start;
            let permit = if force {
                None
            } else {
                semaphore.clone().acquire_owned().await.ok()
            };

            let (mut task, mut stop) = self.spawn_sync(manager_tx.clone(), permit);

            // supervise the running sync
            let halt = loop {
                tokio::select! {
                    res = &mut task => {
                        if let Err(e) = res {
                            warn!("sync task for {} aborted: {e}", self.name());
                        }
                        break false;
                    }
                    Some(ctrl) = rx.recv() => match ctrl {
                        JobCtrl::Stop => {
                            self.set_state(JobState::Ready);
                            self.terminate_and_join(&stop, &mut task).await;
                            break false;
                        }
                        JobCtrl::Restart => {
                            self.terminate_and_join(&stop, &mut task).await;
                            (task, stop) = self.spawn_sync(manager_tx.clone(), None);
                        }
                        JobCtrl::Halt => {
                            self.set_state(JobState::Halting);
                            self.terminate_and_join(&stop, &mut task).await;
                            break true;
                        }
                        JobCtrl::Start | JobCtrl::ForceStart => {
                            // a sync is already in flight
                            info!("job {} is already running", self.name());
                        }
                    }
                }
            };
            if halt {
                return;
            }
        }
    }

    fn spawn_sync(
        &self,
        manager_tx: mpsc::Sender<JobMessage>,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let provider = self.provider.clone();
        let task = tokio::spawn(async move {
            let _permit = permit;
            run_sync(provider, manager_tx, stop_rx).await;
        });
        (task, stop_tx)
    }

    async fn terminate_and_join(&self, stop: &watch::Sender<bool>, task: &mut JoinHandle<()>) {
        let _ = stop.send(true);
        if let Err(e) = self.provider.terminate().await {
            warn!("failed to terminate provider {}: {e}", self.name());
        }
        if let Err(e) = task.await {
            warn!("sync task for {} aborted: {e}", self.name());
        }
    }
}

async fn send(tx: &mpsc::Sender<JobMessage>, status: SyncStatus, msg: String, schedule: bool) {
    let _ = tx
        .send(JobMessage {
            status,
            msg,
            schedule,
        })
        .await;
}

/// One trigger: pre-job hooks, then up to `retry` attempts with pre/post
/// hooks, a timeout guard, and a final status message that re-arms the
/// schedule. A raised stop flag ends the retry loop after the current
/// attempt.
async fn run_sync(
    provider: Arc<Provider>,
    tx: mpsc::Sender<JobMessage>,
    stop: watch::Receiver<bool>,
) {
    send(&tx, SyncStatus::PreSyncing, String::new(), false).await;

    for hook in provider.hooks() {
        if let Err(e) = hook.pre_job().await {
            warn!("pre-job hook failed for {}: {e}", provider.name());
            send(&tx, SyncStatus::Failed, e.to_string(), true).await;
            return;
        }
    }

    let mut last_err = String::new();
    let retry = provider.retry().max(1);
    for attempt in 0..retry {
        send(&tx, SyncStatus::Syncing, String::new(), false).await;

        let mut hook_err = None;
        for hook in provider.hooks() {
            if let Err(e) = hook.pre_exec().await {
                hook_err = Some(e);
                break;
            }
        }
        if let Some(e) = hook_err {
            warn!("pre-exec hook failed for {}: {e}", provider.name());
            last_err = e.to_string();
            break;
        }

        let timeout = provider.timeout();
        let result = if timeout > Duration::ZERO {
            match tokio::time::timeout(timeout, provider.run()).await {
                Ok(res) => res,
                Err(_) => {
                    if let Err(e) = provider.terminate().await {
                        warn!("failed to terminate timed-out sync: {e}");
                    }
                    Err(crate::error::Error::Sync(format!(
                        "sync timed out after {}s",
                        timeout.as_secs()
                    )))
                }
            }
        } else {
            provider.run().await
        };

        for hook in provider.hooks() {
            if let Err(e) = hook.post_exec().await {
                warn!("post-exec hook failed for {}: {e}", provider.name());
            }
        }

        match result {
            Ok(()) => {
                for hook in provider.hooks() {
                    if let Err(e) = hook.post_success().await {
                        warn!("post-success hook failed for {}: {e}", provider.name());
                    }
                }
                send(&tx, SyncStatus::Success, String::new(), true).await;
                return;
            }
            Err(e) => {
                last_err = e.to_string();
                warn!(
                    "sync attempt {}/{} for {} failed: {e}",
                    attempt + 1,
                    retry,
                    provider.name()
                );
                for hook in provider.hooks() {
                    if let Err(e) = hook.post_fail().await {
                        warn!("post-fail hook failed for {}: {e}", provider.name());
                    }
                }
                if *stop.borrow() {
                    break;
                }
                if attempt + 1 < retry {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    send(&tx, SyncStatus::Failed, last_err, true).await;
}
