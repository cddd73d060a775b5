pub mod announcements;
pub mod files;
pub mod jobs;
pub mod mirrorz;

use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

async fn ping(State(_): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/ping", get(ping))
        .route("/jobs", get(jobs::list_jobs))
        .route("/api/mirrors", get(jobs::list_jobs))
        .route(
            "/job/:id",
            get(jobs::get_or_register)
                .post(jobs::create_job)
                .patch(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route("/job/:id/config", get(jobs::get_config))
        .route("/job/:id/log", get(jobs::get_latest_log))
        .route("/job/:id/size", post(jobs::update_size))
        .route("/job/:id/schedule", post(jobs::update_schedule))
        .route("/job/:id/enable", post(jobs::enable_job))
        .route("/job/:id/disable", post(jobs::disable_job))
        .route("/job/:id/cmd", post(jobs::handle_cmd))
        .route("/announcements", get(announcements::list_announcements))
        .route("/api/news", get(announcements::list_announcements))
        .route(
            "/announcement/:id",
            get(announcements::get_announcement)
                .post(announcements::create_announcement)
                .delete(announcements::delete_announcement),
        )
        .route("/files", get(files::list_files))
        .route("/api/files", get(files::list_files))
        .route(
            "/file/:id",
            get(files::get_file)
                .post(files::update_file)
                .delete(files::delete_file),
        );

    if state.options.mirrorz.is_some() {
        router = router.route("/api/mirrorz.json", get(mirrorz::mirrorz_json));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}
