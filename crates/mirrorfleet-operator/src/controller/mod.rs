pub mod announcement_controller;
pub mod job_controller;
mod job_resources;
pub mod manager_controller;
mod manager_resources;

use std::sync::Arc;

use kube::api::{Api, DeleteParams};
use kube::Client;

use crate::config::ControllerConfig;
use crate::error::Result;

/// Field manager name used for every server-side apply.
pub const FIELD_MANAGER: &str = "mirror-operator";

pub struct Context {
    pub client: Client,
    pub config: ControllerConfig,
}

impl Context {
    pub fn new(client: Client, config: ControllerConfig) -> Arc<Self> {
        Arc::new(Self { client, config })
    }
}

/// Delete a child object, treating "already gone" as success.
pub(crate) async fn delete_ignore_missing<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}
