use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kube::api::{Patch, PatchParams};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use mirrorfleet_api::size::format_size;
use mirrorfleet_api::{
    ClientCmd, CmdVerb, Job, JobSpec, JobStatus, MirrorConfig, MirrorSchedule, MirrorStatus,
    MirrorType, SyncStatus,
};

use super::now_unix;
use crate::error::{info_body, ApiError, Result};
use crate::external;
use crate::state::{AppState, FIELD_MANAGER};

/// Merge a worker-reported status into the stored one.
///
/// Timestamp fields only ever advance: `lastStarted` moves on the edge into
/// `pre-syncing`, `lastUpdate` on success, `lastEnded` on success or failure,
/// `lastOnline` on every report. A zero incoming size never erases a known
/// size, and `lastRegister` is owned by the register endpoint alone.
pub fn merge_status(old: &JobStatus, mut new: JobStatus, now: i64) -> JobStatus {
    new.last_online = now;
    new.last_register = old.last_register;

    if new.status == SyncStatus::PreSyncing && old.status != SyncStatus::PreSyncing {
        new.last_started = now;
    } else {
        new.last_started = old.last_started;
    }
    // Only successful syncing moves last_update
    if new.status == SyncStatus::Success {
        new.last_update = now;
    } else {
        new.last_update = old.last_update;
    }
    if new.status == SyncStatus::Success || new.status == SyncStatus::Failed {
        new.last_ended = now;
    } else {
        new.last_ended = old.last_ended;
    }

    if old.size > 0 && new.size == 0 {
        new.size = old.size;
    }
    new
}

/// Merge a partial spec document into an existing one, section by section
/// (`config`, `deploy`, `volume`, `ingress`).
pub fn merge_spec(old: &JobSpec, patch: &Value) -> Result<JobSpec, serde_json::Error> {
    let mut merged = serde_json::to_value(old)?;
    for section in ["config", "deploy", "volume", "ingress"] {
        let Some(fields) = patch.get(section).and_then(Value::as_object) else {
            continue;
        };
        if !merged[section].is_object() {
            merged[section] = Value::Object(Default::default());
        }
        for (k, v) in fields {
            merged[section][k] = v.clone();
        }
    }
    serde_json::from_value(merged)
}

/// Unwrap a JSON body, turning bind failures into 400s.
pub(crate) fn bind<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) async fn write_status(state: &AppState, id: &str, status: &JobStatus) -> Result<()> {
    state
        .job_api()
        .patch_status(
            id,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&serde_json::json!({ "status": status })),
        )
        .await?;
    Ok(())
}

pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<MirrorStatus>>> {
    let _g = state.lock.read().await;

    let mut out = Vec::new();
    for job in state.jobs.state() {
        let cfg = &job.spec.config;
        if cfg.mirror_type == Some(MirrorType::External) {
            if let Some(provider) = external::provider(cfg, &state.http) {
                if let Ok(mut entries) = provider.list().await {
                    out.append(&mut entries);
                }
            }
            continue;
        }

        let status = job.status.clone().unwrap_or_default();
        let mut entry = MirrorStatus {
            id: job.metadata.name.clone().unwrap_or_default(),
            alias: cfg.alias.clone(),
            desc: cfg.desc.clone(),
            url: cfg.url.clone(),
            help_url: cfg.help_url.clone(),
            mirror_type: cfg.mirror_type.unwrap_or_default(),
            size_str: format_size(status.size),
            status,
        };
        match cfg.mirror_type {
            Some(MirrorType::Proxy) => {
                entry.status.upstream = cfg.upstream.clone();
                entry.status.status = SyncStatus::Cached;
            }
            Some(MirrorType::Git) => {
                entry.status.upstream = cfg.upstream.clone();
                entry.status.status = SyncStatus::Created;
            }
            _ => {}
        }
        out.push(entry);
    }

    out.sort_by(|a, b| a.id.to_lowercase().cmp(&b.id.to_lowercase()));
    Ok(Json(out))
}

/// `GET /job/<id>` returns the job status; `HEAD /job/<id>` registers a
/// newly-online mirror, bumping `lastOnline` and `lastRegister`.
pub async fn get_or_register(
    method: Method,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<JobStatus>> {
    if method == Method::HEAD {
        let _g = state.lock.write().await;
        let job = state.get_job(&id)?;
        let mut status = job.status.clone().unwrap_or_default();
        let now = now_unix();
        status.last_online = now;
        status.last_register = now;
        write_status(&state, &id, &status).await?;
        info!("Mirror <{id}> registered");
        Ok(Json(status))
    } else {
        let _g = state.lock.read().await;
        let job = state.get_job(&id)?;
        Ok(Json(job.status.clone().unwrap_or_default()))
    }
}

pub async fn get_config(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MirrorConfig>> {
    let _g = state.lock.read().await;
    let job = state.get_job(&id)?;
    Ok(Json(MirrorConfig {
        id,
        spec: job.spec.clone(),
    }))
}

pub async fn get_latest_log(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<String> {
    info!("Getting log from <{id}>");
    let resp = state
        .http
        .get(state.worker_url(&id, "/log"))
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("get log from mirror {id} fail: {e}")))?;
    Ok(resp.text().await.unwrap_or_default())
}

/// Create a job from a full spec, or merge a partial document into the
/// existing spec before the apply.
pub async fn create_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = bind(payload)?;
    let _g = state.lock.write().await;

    let spec = match state.get_job(&id) {
        Ok(existing) => merge_spec(&existing.spec, &body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        Err(_) => {
            serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?
        }
    };

    let mut job = Job::new(&id, spec);
    job.metadata.namespace = Some(state.namespace.clone());
    state
        .job_api()
        .patch(
            &id,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&job),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("failed to patch job {id}: {e}")))?;

    Ok(info_body(format!("patch {id} succeed")))
}

pub async fn update_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<JobStatus>, JsonRejection>,
) -> Result<Json<JobStatus>> {
    let incoming = bind(payload)?;
    let _g = state.lock.write().await;
    let job = state.get_job(&id)?;
    let old = job.status.clone().unwrap_or_default();

    let merged = merge_status(&old, incoming, now_unix());

    match merged.status {
        SyncStatus::Syncing => info!("Job [{id}] starts syncing"),
        s => info!("Job [{id}] {s:?}"),
    }

    write_status(&state, &id, &merged).await?;
    Ok(Json(merged))
}

#[derive(Debug, Deserialize)]
pub struct SizeMsg {
    #[serde(default)]
    pub size: u64,
}

pub async fn update_size(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<SizeMsg>, JsonRejection>,
) -> Result<Json<JobStatus>> {
    let msg = bind(payload)?;
    let _g = state.lock.write().await;
    let job = state.get_job(&id)?;
    let mut status = job.status.clone().unwrap_or_default();

    // zero means "worker could not tell"; keep what we know
    if msg.size > 0 {
        status.size = msg.size;
    }
    info!("Mirror size of [{id}]: {}", status.size);

    write_status(&state, &id, &status).await?;
    Ok(Json(status))
}

pub async fn update_schedule(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<MirrorSchedule>, JsonRejection>,
) -> Result<Json<Value>> {
    let schedule = bind(payload)?;
    let _g = state.lock.write().await;
    let job = state.get_job(&id)?;
    let mut status = job.status.clone().unwrap_or_default();

    if status.scheduled == schedule.next_schedule {
        // no changes, skip update
        return Ok(Json(serde_json::json!({})));
    }

    status.scheduled = schedule.next_schedule;
    status.last_online = now_unix();
    write_status(&state, &id, &status).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn enable_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    let _g = state.lock.write().await;
    let job = state.get_job(&id)?;
    let mut status = job.status.clone().unwrap_or_default();
    status.status = SyncStatus::Created;
    status.last_online = now_unix();
    write_status(&state, &id, &status).await?;
    info!("Mirror <{id}> enabled");
    Ok(info_body("enabled"))
}

pub async fn disable_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    let _g = state.lock.write().await;
    let job = state.get_job(&id)?;
    let mut status = job.status.clone().unwrap_or_default();
    status.status = SyncStatus::Disabled;
    status.last_online = now_unix();
    write_status(&state, &id, &status).await?;
    info!("Mirror <{id}> disabled");
    Ok(info_body("disabled"))
}

pub async fn handle_cmd(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<ClientCmd>, JsonRejection>,
) -> Result<Response> {
    let cmd = bind(payload)?;
    if cmd.cmd == CmdVerb::Unknown {
        return Err(ApiError::NotAcceptable);
    }

    if cmd.cmd == CmdVerb::Stop {
        let _g = state.lock.write().await;
        let job = state.get_job(&id)?;
        let mut status = job.status.clone().unwrap_or_default();
        status.status = SyncStatus::Paused;
        status.last_online = now_unix();
        write_status(&state, &id, &status).await?;
    }

    info!("Posting command '{}' to <{id}>", cmd.cmd);
    let resp = state
        .http
        .post(state.worker_url(&id, "/"))
        .json(&cmd)
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("post command to mirror {id} fail: {e}")))?;

    if resp.status().is_success() {
        Ok(info_body(format!("successfully send command to mirror {id}")).into_response())
    } else {
        let code = StatusCode::from_u16(resp.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = resp.text().await.unwrap_or_default();
        Ok((code, body).into_response())
    }
}

pub async fn delete_job(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>> {
    let _g = state.lock.write().await;
    state.get_job(&id)?;
    state
        .job_api()
        .delete(&id, &Default::default())
        .await
        .map_err(|e| ApiError::Internal(format!("failed to delete mirror: {e}")))?;
    info!("Mirror <{id}> deleted");
    Ok(info_body("deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorfleet_api::JobConfig;

    fn old_status() -> JobStatus {
        JobStatus {
            status: SyncStatus::Success,
            last_update: 1000,
            last_started: 900,
            last_ended: 1000,
            last_online: 1000,
            last_register: 800,
            size: 12_345_678,
            ..Default::default()
        }
    }

    #[test]
    fn pre_syncing_edge_sets_last_started() {
        let new = JobStatus {
            status: SyncStatus::PreSyncing,
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.last_started, 2000);
        assert_eq!(merged.last_update, 1000);
        assert_eq!(merged.last_ended, 1000);

        // already pre-syncing: no new start stamp
        let mut old = old_status();
        old.status = SyncStatus::PreSyncing;
        let new = JobStatus {
            status: SyncStatus::PreSyncing,
            ..Default::default()
        };
        let merged = merge_status(&old, new, 3000);
        assert_eq!(merged.last_started, 900);
    }

    #[test]
    fn success_advances_update_and_ended() {
        let new = JobStatus {
            status: SyncStatus::Success,
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.last_update, 2000);
        assert_eq!(merged.last_ended, 2000);
        assert_eq!(merged.last_online, 2000);
    }

    #[test]
    fn failure_ends_but_does_not_update() {
        let new = JobStatus {
            status: SyncStatus::Failed,
            error_msg: "rsync error: timeout in data send/receive".into(),
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.last_update, 1000);
        assert_eq!(merged.last_ended, 2000);
    }

    #[test]
    fn size_never_regresses_to_zero() {
        let new = JobStatus {
            status: SyncStatus::Failed,
            size: 0,
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.size, 12_345_678);

        let new = JobStatus {
            status: SyncStatus::Success,
            size: 999,
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.size, 999);
    }

    #[test]
    fn register_stamp_is_preserved_across_reports() {
        let new = JobStatus {
            status: SyncStatus::Syncing,
            last_register: 999_999,
            ..Default::default()
        };
        let merged = merge_status(&old_status(), new, 2000);
        assert_eq!(merged.last_register, 800);
    }

    #[test]
    fn timestamps_are_monotone_under_merge() {
        let old = old_status();
        for kind in [
            SyncStatus::PreSyncing,
            SyncStatus::Syncing,
            SyncStatus::Success,
            SyncStatus::Failed,
            SyncStatus::Paused,
        ] {
            let merged = merge_status(
                &old,
                JobStatus {
                    status: kind,
                    ..Default::default()
                },
                5000,
            );
            assert!(merged.last_update >= old.last_update, "{kind:?}");
            assert!(merged.last_started >= old.last_started, "{kind:?}");
            assert!(merged.last_ended >= old.last_ended, "{kind:?}");
            assert!(merged.last_online >= old.last_online, "{kind:?}");
            assert!(merged.last_register >= old.last_register, "{kind:?}");
        }
    }

    #[test]
    fn partial_spec_merges_section_fields() {
        let old = JobSpec {
            config: JobConfig {
                upstream: "rsync://a/".into(),
                interval: Some(60),
                alias: "Alpine".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let patch = serde_json::json!({
            "config": { "interval": 120 },
            "volume": { "size": "200Gi" }
        });
        let merged = merge_spec(&old, &patch).unwrap();
        assert_eq!(merged.config.interval, Some(120));
        assert_eq!(merged.config.upstream, "rsync://a/");
        assert_eq!(merged.config.alias, "Alpine");
        assert_eq!(merged.volume.size, "200Gi");
    }

    #[test]
    fn unknown_sections_are_ignored_by_merge() {
        let old = JobSpec {
            config: JobConfig {
                upstream: "rsync://a/".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let patch = serde_json::json!({ "bogus": { "x": 1 } });
        let merged = merge_spec(&old, &patch).unwrap();
        assert_eq!(merged.config.upstream, "rsync://a/");
    }
}
