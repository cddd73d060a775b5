//! Client for the coordinator's reporting API.

use std::time::Duration;

use tracing::{debug, error, info};

use mirrorfleet_api::{JobStatus, MirrorSchedule, SyncStatus};

use crate::error::{Error, Result};

const REGISTER_RETRIES: usize = 10;

pub struct ManagerClient {
    base: String,
    name: String,
    http: reqwest::Client,
}

impl ManagerClient {
    pub fn new(api_base: &str, name: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            base: api_base.trim_end_matches('/').to_string(),
            name: name.to_string(),
            http,
        })
    }

    fn job_url(&self, suffix: &str) -> String {
        format!("{}/job/{}{}", self.base, self.name, suffix)
    }

    /// Announce this worker to the coordinator. Retried up to ten times one
    /// second apart; failure to register is logged but not fatal.
    pub async fn register(&self) {
        let url = self.job_url("");
        debug!("registering on manager url: {url}");
        for attempt in (0..REGISTER_RETRIES).rev() {
            match self.http.head(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("registered worker {}", self.name);
                    return;
                }
                Ok(resp) => error!("failed to register worker: HTTP {}", resp.status()),
                Err(e) => error!("failed to register worker: {e}"),
            }
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                info!("retrying... ({attempt})");
            }
        }
    }

    /// Status stored on the coordinator, used to restore state at startup.
    pub async fn fetch_status(&self) -> Result<JobStatus> {
        let resp = self
            .http
            .get(self.job_url(""))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Report a status transition. Failures are returned for the caller to
    /// log; they never change worker state.
    pub async fn report_status(
        &self,
        status: SyncStatus,
        msg: &str,
        upstream: &str,
        size: u64,
    ) -> Result<()> {
        let body = JobStatus {
            status,
            upstream: upstream.to_string(),
            size,
            error_msg: msg.to_string(),
            ..Default::default()
        };
        debug!("reporting status {:?} for {}", status, self.name);
        self.http
            .patch(self.job_url(""))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Publish the next scheduled run time.
    pub async fn report_schedule(&self, next_schedule: i64) -> Result<()> {
        let body = MirrorSchedule { next_schedule };
        self.http
            .post(self.job_url("/schedule"))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
