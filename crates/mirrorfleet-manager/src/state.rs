use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::reflector;
use kube::runtime::reflector::{store::Store, ObjectRef};
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Client;
use tokio::sync::RwLock;
use tracing::warn;

use mirrorfleet_api::{Announcement, File, Job, WORKER_PORT};

use crate::error::{ApiError, Result};
use crate::mirrorz::MirrorZ;

/// Field manager for the coordinator's server-side applies.
pub const FIELD_MANAGER: &str = "mirror-manager";

/// Startup options read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Base mirrorz document (site block, endpoints) when the catalogue is
    /// exposed; `None` disables `/api/mirrorz.json`.
    pub mirrorz: Option<MirrorZ>,
    /// Total disk capacity appended to the catalogue's `disk` field.
    pub total: String,
}

/// Shared state of every request handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub namespace: String,
    pub http: reqwest::Client,
    /// Serializes the read-modify-write status paths inside this process.
    /// Writers take it exclusively, readers share it.
    pub lock: Arc<RwLock<()>>,
    pub jobs: Store<Job>,
    pub announcements: Store<Announcement>,
    pub files: Store<File>,
    pub options: Arc<ManagerOptions>,
}

fn spawn_reflector<K>(api: Api<K>) -> Store<K>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Clone + std::hash::Hash + Eq + Unpin,
{
    let (reader, writer) = reflector::store();
    tokio::spawn(async move {
        let stream = reflector(writer, watcher(api, watcher::Config::default()).default_backoff())
            .applied_objects();
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            if let Err(e) = item {
                warn!("watch error: {e}");
            }
        }
    });
    reader
}

impl AppState {
    pub async fn new(client: Client, namespace: String, options: ManagerOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let jobs = spawn_reflector(Api::<Job>::namespaced(client.clone(), &namespace));
        let announcements =
            spawn_reflector(Api::<Announcement>::namespaced(client.clone(), &namespace));
        let files = spawn_reflector(Api::<File>::namespaced(client.clone(), &namespace));

        Ok(Self {
            client,
            namespace,
            http,
            lock: Arc::new(RwLock::new(())),
            jobs,
            announcements,
            files,
            options: Arc::new(options),
        })
    }

    /// Block until every cache has seen its initial list.
    pub async fn wait_for_cache_sync(&self) {
        self.jobs.wait_until_ready().await.ok();
        self.announcements.wait_until_ready().await.ok();
        self.files.wait_until_ready().await.ok();
    }

    pub fn job_api(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn announcement_api(&self) -> Api<Announcement> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn file_api(&self) -> Api<File> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Cached job lookup.
    pub fn get_job(&self, id: &str) -> Result<Arc<Job>> {
        self.jobs
            .get(&ObjectRef::new(id).within(&self.namespace))
            .ok_or_else(|| ApiError::NotFound(format!("mirror {id}")))
    }

    pub fn get_announcement(&self, id: &str) -> Result<Arc<Announcement>> {
        self.announcements
            .get(&ObjectRef::new(id).within(&self.namespace))
            .ok_or_else(|| ApiError::NotFound(format!("announcement {id}")))
    }

    pub fn get_file(&self, id: &str) -> Result<Arc<File>> {
        self.files
            .get(&ObjectRef::new(id).within(&self.namespace))
            .ok_or_else(|| ApiError::NotFound(format!("file {id}")))
    }

    /// Control endpoint of the worker backing `id`.
    pub fn worker_url(&self, id: &str, path: &str) -> String {
        format!("http://{id}:{WORKER_PORT}{path}")
    }
}
