use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use kube::api::{Patch, PatchParams};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use mirrorfleet_api::{Announcement, AnnouncementSpec, AnnouncementStatus};

use crate::error::{info_body, ApiError, Result};
use crate::state::{AppState, FIELD_MANAGER};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementInfo {
    pub id: String,
    pub title: String,
    pub author: String,
    pub content: String,
    #[serde(flatten)]
    pub status: AnnouncementStatus,
}

fn info_of(id: String, news: &Announcement) -> AnnouncementInfo {
    AnnouncementInfo {
        id,
        title: news.spec.title.clone(),
        author: news.spec.author.clone(),
        content: news.spec.content.clone(),
        status: news.status.clone().unwrap_or_default(),
    }
}

pub async fn list_announcements(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnnouncementInfo>>> {
    let _g = state.lock.read().await;
    let mut out: Vec<AnnouncementInfo> = state
        .announcements
        .state()
        .iter()
        .map(|news| info_of(news.metadata.name.clone().unwrap_or_default(), news))
        .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(out))
}

pub async fn get_announcement(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AnnouncementInfo>> {
    let _g = state.lock.read().await;
    let news = state.get_announcement(&id)?;
    Ok(Json(info_of(id, &news)))
}

/// Create an announcement from a full spec, or merge `title` / `content` /
/// `author` into the existing one.
pub async fn create_announcement(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = super::jobs::bind(payload)?;
    let _g = state.lock.write().await;

    let spec = match state.get_announcement(&id) {
        Ok(existing) => {
            let mut spec = existing.spec.clone();
            if let Some(v) = body.get("title").and_then(Value::as_str) {
                spec.title = v.to_string();
            }
            if let Some(v) = body.get("content").and_then(Value::as_str) {
                spec.content = v.to_string();
            }
            if let Some(v) = body.get("author").and_then(Value::as_str) {
                spec.author = v.to_string();
            }
            spec
        }
        Err(_) => serde_json::from_value::<AnnouncementSpec>(body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };

    let mut news = Announcement::new(&id, spec);
    news.metadata.namespace = Some(state.namespace.clone());
    state
        .announcement_api()
        .patch(
            &id,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&news),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("failed to patch announcement {id}: {e}")))?;

    Ok(info_body(format!("patch {id} succeed")))
}

pub async fn delete_announcement(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    let _g = state.lock.write().await;
    state.get_announcement(&id)?;
    state
        .announcement_api()
        .delete(&id, &Default::default())
        .await
        .map_err(|e| ApiError::Internal(format!("failed to delete announcement: {e}")))?;
    info!("Announcement <{id}> deleted");
    Ok(info_body("deleted"))
}
