//! The worker's HTTP control surface: `POST /` runs a command, `GET /log`
//! returns the current log.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use mirrorfleet_api::ClientCmd;

use crate::error::{Error, Result};
use crate::worker::Worker;

async fn handle_cmd(
    State(worker): State<Arc<Worker>>,
    body: Option<Json<ClientCmd>>,
) -> impl IntoResponse {
    let Some(Json(cmd)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"msg": "Invalid request"})),
        );
    };

    if worker.handle_client_cmd(cmd).await {
        (StatusCode::OK, Json(serde_json::json!({"msg": "OK"})))
    } else {
        (
            StatusCode::NOT_ACCEPTABLE,
            Json(serde_json::json!({"msg": "Invalid Command"})),
        )
    }
}

async fn latest_log(State(worker): State<Arc<Worker>>) -> impl IntoResponse {
    info!("return latest log");
    let path = Path::new(worker.log_dir()).join("latest.log");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => (StatusCode::OK, content),
        Err(_) => (StatusCode::NOT_FOUND, "log not found".to_string()),
    }
}

pub fn build_router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/", post(handle_cmd))
        .route("/log", get(latest_log))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(10)))
        .with_state(worker)
}

/// Bind the control listener; `addr` accepts the `:6000` shorthand.
pub async fn bind(addr: &str) -> Result<tokio::net::TcpListener> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))
}

pub async fn serve(listener: tokio::net::TcpListener, worker: Arc<Worker>) {
    if let Err(e) = axum::serve(listener, build_router(worker)).await {
        tracing::error!("control server error: {e}");
    }
}
