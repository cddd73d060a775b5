use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::manager::DeployConfig;

/// How a mirror entry is realized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MirrorType {
    /// A locally synced tree driven by a worker pod.
    #[default]
    Mirror,
    /// A reverse proxy to the upstream; nothing is stored locally.
    Proxy,
    /// A git mirror managed elsewhere, listed for completeness.
    Git,
    /// An external system (e.g. a Gitea instance) queried at list time.
    External,
}

/// Lifecycle state of a sync job as reported by its worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    None,
    Created,
    PreSyncing,
    Syncing,
    Success,
    Failed,
    Paused,
    Disabled,
    Cached,
}

/// Mirror configuration handed down to the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help_url: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub mirror_type: Option<MirrorType>,
    pub upstream: String,
    /// Sync mechanism: `rsync`, `two-stage-rsync`, `command`, or an external
    /// provider name such as `gitea`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mirror_dir: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent: Option<i32>,
    /// Minutes between syncs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<i32>,
    /// Seconds before a running sync is force-terminated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fail_on_match: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv6_only: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipv4_only: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exclude_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rsync_options: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rsync_override: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stage1_profile: String,
    /// `;`-separated shell lines run after a successful sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exec_on_success: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exec_on_failure: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size_pattern: String,
    /// `;`-separated extra `K=V` environment entries for the worker.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub addition_envs: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug: String,
}

/// Deployment knobs for the worker pod and its sidecars.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDeploy {
    #[serde(flatten)]
    pub base: DeployConfig,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disable_front: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub front_mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub front_image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub front_cmd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disable_rsync: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rsync_image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rsync_cmd: String,
}

/// Backing volume request for the mirror tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    /// Requested capacity, e.g. `500Gi`. Empty means the 50Gi default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_mode: String,
}

/// Ingress exposure of the front sidecar.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tls_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Desired state of one mirror job.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mirrorfleet.dev",
    version = "v1beta1",
    kind = "Job",
    plural = "jobs",
    namespaced,
    status = "JobStatus",
    printcolumn = r#"{"name":"Upstream", "type":"string", "jsonPath":".spec.config.upstream"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub config: JobConfig,
    #[serde(default)]
    pub deploy: JobDeploy,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Observed state of one mirror job. Timestamps are Unix seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub status: SyncStatus,
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub last_started: i64,
    #[serde(default)]
    pub last_ended: i64,
    #[serde(default, rename = "nextSchedule")]
    pub scheduled: i64,
    #[serde(default)]
    pub upstream: String,
    /// Mirror tree size in bytes; 0 means unknown.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub last_online: i64,
    #[serde(default)]
    pub last_register: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::PreSyncing).unwrap(),
            r#""pre-syncing""#
        );
        assert_eq!(
            serde_json::from_str::<SyncStatus>(r#""disabled""#).unwrap(),
            SyncStatus::Disabled
        );
    }

    #[test]
    fn job_spec_minimal_document() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"config": {"upstream": "rsync://rsync.alpinelinux.org/alpine/"}}"#,
        )
        .unwrap();
        assert_eq!(spec.config.upstream, "rsync://rsync.alpinelinux.org/alpine/");
        assert!(spec.config.mirror_type.is_none());
        assert!(spec.volume.size.is_empty());
    }

    #[test]
    fn job_status_scheduled_field_name() {
        let status = JobStatus {
            scheduled: 42,
            ..Default::default()
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["nextSchedule"], 42);
    }
}
