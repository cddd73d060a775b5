use k8s_openapi::api::core::v1::{Affinity, LocalObjectReference, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::job::IngressConfig;

/// Common container deployment knobs shared by jobs and the manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_limit: String,
    #[serde(default, rename = "memLimit", skip_serializing_if = "String::is_empty")]
    pub memory_limit: String,
}

/// Workload kind the manager is reconciled into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeployType {
    #[default]
    Deployment,
    DaemonSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeployPhase {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Desired state of the coordinator deployment. At most one manager per
/// namespace may reach `Succeeded`.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mirrorfleet.dev",
    version = "v1beta1",
    kind = "Manager",
    plural = "managers",
    namespaced,
    status = "ManagerStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSpec {
    #[serde(flatten)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_type: Option<DeployType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    #[serde(default)]
    pub phase: DeployPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_type_defaults_to_deployment() {
        let spec: ManagerSpec = serde_json::from_str(r#"{"image": "mirrorfleet/manager"}"#).unwrap();
        assert!(spec.deploy_type.is_none());
        assert_eq!(spec.deploy_type.unwrap_or_default(), DeployType::Deployment);
        assert_eq!(spec.deploy.image, "mirrorfleet/manager");
    }

    #[test]
    fn phase_round_trip() {
        let s = serde_json::to_string(&DeployPhase::Succeeded).unwrap();
        assert_eq!(s, r#""Succeeded""#);
        assert_eq!(
            serde_json::from_str::<DeployPhase>(&s).unwrap(),
            DeployPhase::Succeeded
        );
    }
}
