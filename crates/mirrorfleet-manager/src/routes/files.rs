use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use kube::api::{Patch, PatchParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use mirrorfleet_api::recognizer::recognize;
use mirrorfleet_api::{File, FileSpec, FileStatus, FileType};

use super::now_unix;
use crate::error::{info_body, ApiError, Result};
use crate::state::{AppState, FIELD_MANAGER};

/// Body of `POST /file/<id>`: listing metadata plus raw paths to recognize.
#[derive(Debug, Deserialize)]
pub struct FileBase {
    #[serde(default, rename = "type")]
    pub file_type: Option<FileType>,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub id: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub alias: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

fn listing_of(id: String, file: &File) -> FileListing {
    FileListing {
        id,
        file_type: file.spec.file_type,
        alias: file.spec.alias.clone(),
        status: file.status.clone().unwrap_or_default(),
    }
}

pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileListing>>> {
    let _g = state.lock.read().await;
    let mut out: Vec<FileListing> = state
        .files
        .state()
        .iter()
        .filter(|f| f.status.as_ref().is_some_and(|s| !s.files.is_empty()))
        .map(|f| listing_of(f.metadata.name.clone().unwrap_or_default(), f))
        .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(out))
}

pub async fn get_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FileListing>> {
    let _g = state.lock.read().await;
    let file = state.get_file(&id)?;
    Ok(Json(listing_of(id, &file)))
}

/// Upsert a listing: raw paths run through the recognizer, unparseable names
/// are dropped, and a non-empty result replaces the stored list. Posting no
/// parseable paths leaves the existing entries untouched.
pub async fn update_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<FileBase>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = super::jobs::bind(payload)?;
    let recognized: Vec<_> = body
        .files
        .iter()
        .map(|p| recognize(p))
        .filter(|f| !f.name.is_empty())
        .collect();

    let _g = state.lock.write().await;

    let existing = state.get_file(&id).ok();
    let spec = FileSpec {
        file_type: body
            .file_type
            .or(existing.as_ref().map(|f| f.spec.file_type))
            .unwrap_or_default(),
        alias: if !body.alias.is_empty() {
            body.alias.clone()
        } else {
            existing
                .as_ref()
                .map(|f| f.spec.alias.clone())
                .unwrap_or_default()
        },
    };

    let mut file = File::new(&id, spec);
    file.metadata.namespace = Some(state.namespace.clone());
    state
        .file_api()
        .patch(
            &id,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&file),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("failed to patch file {id}: {e}")))?;

    if !recognized.is_empty() {
        let status = FileStatus {
            files: recognized,
            update_time: now_unix(),
        };
        state
            .file_api()
            .patch_status(
                &id,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&serde_json::json!({ "status": status })),
            )
            .await
            .map_err(|e| ApiError::Internal(format!("failed to update file {id} list: {e}")))?;
    }

    Ok(info_body(format!("update {id} succeed")))
}

pub async fn delete_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    let _g = state.lock.write().await;
    state.get_file(&id)?;
    state
        .file_api()
        .delete(&id, &Default::default())
        .await
        .map_err(|e| ApiError::Internal(format!("failed to delete file: {e}")))?;
    info!("File <{id}> deleted");
    Ok(info_body("deleted"))
}
