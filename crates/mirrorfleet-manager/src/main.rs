use std::net::SocketAddr;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tracing::info;

use mirrorfleet_manager::{AppState, ManagerOptions, ManagerServer};

#[derive(Parser, Debug)]
#[command(name = "mirrorfleet-manager")]
#[command(about = "Coordinator API service for mirrorfleet sync jobs")]
struct Args {
    #[arg(long, help = "Listen address, e.g. 0.0.0.0:3000 (defaults from ADDR)")]
    addr: Option<String>,

    #[arg(long, default_value = "info", help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,
}

fn listen_addr(arg: Option<String>) -> anyhow::Result<SocketAddr> {
    let raw = arg
        .or_else(|| std::env::var("ADDR").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| ":3000".to_string());
    // tolerate the ":3000" shorthand
    let raw = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw
    };
    raw.parse().context("invalid listen address")
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = ctrl_c => {},
        _ = term.recv() => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let namespace = std::env::var("NAMESPACE").context("can't get namespace")?;
    let addr = listen_addr(args.addr)?;

    let mirrorz = std::env::var("MIRRORZ")
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let options = ManagerOptions {
        mirrorz,
        total: std::env::var("TOTAL").unwrap_or_default(),
    };

    info!("Starting mirrorfleet manager in namespace {namespace}");

    let client = Client::try_default().await?;
    let state = AppState::new(client, namespace, options).await?;

    ManagerServer::new(addr, state).run(shutdown_signal()).await?;
    Ok(())
}
