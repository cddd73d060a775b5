use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A site announcement shown on the mirror portal.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mirrorfleet.dev",
    version = "v1beta1",
    kind = "Announcement",
    plural = "announcements",
    namespaced,
    status = "AnnouncementStatus",
    printcolumn = r#"{"name":"Title", "type":"string", "jsonPath":".spec.title"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
}

/// `pub_time` is set once on first reconcile; `edit_time` follows every spec
/// change. Unix seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementStatus {
    #[serde(default)]
    pub pub_time: i64,
    #[serde(default)]
    pub edit_time: i64,
}
