use clap::Parser;
use tracing::{error, info};

use mirrorfleet_worker::{Config, Worker};

#[derive(Parser, Debug)]
#[command(name = "mirrorfleet-worker")]
#[command(about = "mirrorfleet per-job sync worker")]
struct Args {
    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, help = "Run worker in debug mode")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error loading config: {e}");
            std::process::exit(1);
        }
    };

    let level = if args.debug || cfg.debug_enabled() {
        "debug"
    } else if args.verbose || cfg.verbose_enabled() {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let worker = Worker::new(cfg)?;

    {
        let worker = worker.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            let mut term =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(term) => term,
                    Err(e) => {
                        error!("failed to install SIGTERM handler: {e}");
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
            worker.halt().await;
        });
    }

    info!("running mirrorfleet worker");
    worker.run().await?;
    Ok(())
}
