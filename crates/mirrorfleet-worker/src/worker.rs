//! Worker orchestration: one job, one schedule slot, one control endpoint.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use mirrorfleet_api::{ClientCmd, CmdVerb, SyncStatus};

use crate::api::ManagerClient;
use crate::config::Config;
use crate::error::Result;
use crate::job::{JobCtrl, JobMessage, JobState, MirrorJob};
use crate::provider::Provider;
use crate::schedule::Schedule;
use crate::server;

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub struct Worker {
    cfg: Config,
    pub(crate) job: Arc<MirrorJob>,
    pub(crate) schedule: Arc<Schedule>,
    client: ManagerClient,
    semaphore: Arc<Semaphore>,
    manager_tx: mpsc::Sender<JobMessage>,
    manager_rx: Mutex<Option<mpsc::Receiver<JobMessage>>>,
    exit_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<bool>,
    job_task: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(cfg: Config) -> Result<Arc<Self>> {
        let provider = Provider::from_config(&cfg)?;
        let job = MirrorJob::new(provider);
        let client = ManagerClient::new(&cfg.api, &cfg.name)?;
        let (manager_tx, manager_rx) = mpsc::channel(32);
        let (exit_tx, exit_rx) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(cfg.concurrent));

        Ok(Arc::new(Self {
            cfg,
            job,
            schedule: Arc::new(Schedule::new()),
            client,
            semaphore,
            manager_tx,
            manager_rx: Mutex::new(Some(manager_rx)),
            exit_tx,
            exit_rx,
            job_task: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    /// Run the worker until halted: register, start the control endpoint,
    /// then drive the schedule loop.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.client.register().await;

        let listener = server::bind(&self.cfg.addr).await?;
        tokio::spawn(server::serve(listener, self.clone()));

        self.run_schedule().await;
        Ok(())
    }

    /// Stop the job (terminating any running sync) and wind the worker down.
    pub async fn halt(&self) {
        info!("stopping all the jobs");
        if self.job.state() != JobState::Disabled {
            self.job.send_ctrl(JobCtrl::Halt).await;
        }
        if let Some(task) = self.job_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("job loop ended abnormally: {e}");
            }
        }
        info!("all the jobs are stopped");
        let _ = self.exit_tx.send(true);
    }

    async fn spawn_job_loop(&self) {
        let task = tokio::spawn(
            self.job
                .clone()
                .run(self.manager_tx.clone(), self.semaphore.clone()),
        );
        *self.job_task.lock().await = Some(task);
    }

    /// Restore remote state, arm the first run, then serve the loop: status
    /// messages from the job, a 5-second schedule tick, and the exit signal.
    async fn run_schedule(self: &Arc<Self>) {
        let mirror = self.client.fetch_status().await.unwrap_or_default();

        match mirror.status {
            SyncStatus::Disabled => self.job.set_state(JobState::Disabled),
            SyncStatus::Paused => {
                self.job.set_state(JobState::Paused);
                self.spawn_job_loop().await;
            }
            _ => {
                self.job.set_state(JobState::Ready);
                self.spawn_job_loop().await;
                let stime = mirror.last_update + self.job.provider.interval().as_secs() as i64;
                self.schedule.add_job(stime);
            }
        }

        self.report_schedule().await;

        let Some(mut rx) = self.manager_rx.lock().await.take() else {
            warn!("schedule loop already running");
            return;
        };
        let mut exit = self.exit_rx.clone();
        let mut tick = tokio::time::interval(Duration::from_secs(5));

        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    // a paused or disabled job still emits a final failure
                    // signal for the sync that was torn down; ignore it
                    if self.job.state() != JobState::Ready
                        && self.job.state() != JobState::Halting
                    {
                        info!("job {} state is not ready, skip adding new schedule", self.name());
                        continue;
                    }

                    self.report_status(&msg).await;

                    // only a final success or failure re-arms the schedule
                    if msg.schedule {
                        let next = now_unix() + self.job.provider.interval().as_secs() as i64;
                        info!("next scheduled time for {}: @{next}", self.name());
                        self.schedule.add_job(next);
                    }
                    self.report_schedule().await;
                }
                _ = tick.tick() => {
                    if self.schedule.pop(now_unix()) {
                        self.job.send_ctrl(JobCtrl::Start).await;
                    }
                }
                _ = exit.changed() => {
                    // flush terminal status updates before leaving
                    while let Ok(msg) = rx.try_recv() {
                        if msg.status == SyncStatus::Failed || msg.status == SyncStatus::Success {
                            self.report_status(&msg).await;
                        }
                    }
                    return;
                }
            }
        }
    }

    async fn report_status(&self, msg: &JobMessage) {
        let provider = &self.job.provider;
        if let Err(e) = self
            .client
            .report_status(msg.status, &msg.msg, provider.upstream(), provider.data_size())
            .await
        {
            error!("failed to update mirror({}) status: {e}", self.name());
        }
    }

    async fn report_schedule(&self) {
        if let Err(e) = self
            .client
            .report_schedule(self.schedule.next_scheduled())
            .await
        {
            error!("failed to upload schedule: {e}");
        }
    }

    /// Dispatch a command from the control endpoint. Returns false for verbs
    /// the worker does not accept.
    pub async fn handle_client_cmd(self: &Arc<Self>, cmd: ClientCmd) -> bool {
        info!("received command: {:?}", cmd);

        // whatever the command, the pending schedule no longer applies
        self.schedule.remove();

        if matches!(cmd.cmd, CmdVerb::Start | CmdVerb::Restart)
            && self.job.state() == JobState::Disabled
        {
            self.job.set_state(JobState::Ready);
            self.spawn_job_loop().await;
        }

        match cmd.cmd {
            CmdVerb::Start => {
                let ctrl = if cmd.force {
                    JobCtrl::ForceStart
                } else {
                    JobCtrl::Start
                };
                self.job.send_ctrl(ctrl).await;
            }
            CmdVerb::Restart => self.job.send_ctrl(JobCtrl::Restart).await,
            CmdVerb::Stop => {
                // a disabled job has no run loop listening
                if self.job.state() != JobState::Disabled {
                    self.job.send_ctrl(JobCtrl::Stop).await;
                }
            }
            CmdVerb::Ping => {}
            CmdVerb::Unknown => return false,
        }
        true
    }

    pub fn log_dir(&self) -> &str {
        &self.cfg.log_dir
    }
}
