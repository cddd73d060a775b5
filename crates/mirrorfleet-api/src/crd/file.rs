use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Os,
    App,
}

/// One recognized installer image / artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Human-readable label; empty when the path was not recognized.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub major_version: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub edition: String,
    #[serde(default)]
    pub edition_type: String,
    #[serde(default)]
    pub part: i32,
    #[serde(default)]
    pub path: String,
}

/// A download listing (e.g. "ubuntu ISOs") fed by clients posting raw paths.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mirrorfleet.dev",
    version = "v1beta1",
    kind = "File",
    plural = "files",
    namespaced,
    status = "FileStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    #[serde(default, rename = "type")]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    #[serde(default)]
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub update_time: i64,
}
