use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing::{error, info};

use mirrorfleet_api::{Announcement, File, Job, Manager};
use mirrorfleet_operator::controller::{
    announcement_controller, job_controller, manager_controller, Context,
};
use mirrorfleet_operator::ControllerConfig;

#[derive(Parser, Debug)]
#[command(name = "mirrorfleet-operator")]
#[command(about = "Kubernetes operator for mirrorfleet sync jobs")]
struct Args {
    #[arg(long, help = "Print CRD definitions and exit")]
    crd: bool,

    #[arg(long, default_value = "info", help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,
}

fn print_crds() {
    for crd in [
        Job::crd(),
        Manager::crd(),
        Announcement::crd(),
        File::crd(),
    ] {
        println!("---");
        match serde_yaml::to_string(&crd) {
            Ok(doc) => println!("{doc}"),
            Err(e) => eprintln!("failed to render CRD: {e}"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.crd {
        print_crds();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("Starting mirrorfleet operator");

    let client = Client::try_default().await?;
    let config = ControllerConfig::from_env();
    let ctx = Context::new(client.clone(), config);

    info!("Connected to Kubernetes API");

    let job_ctrl = job_controller::run(client.clone(), ctx.clone());
    let manager_ctrl = manager_controller::run(client.clone(), ctx.clone());
    let announcement_ctrl = announcement_controller::run(client.clone(), ctx.clone());

    info!("All controllers started");

    tokio::select! {
        _ = job_ctrl => error!("Job controller exited"),
        _ = manager_ctrl => error!("Manager controller exited"),
        _ = announcement_ctrl => error!("Announcement controller exited"),
    }

    Ok(())
}
