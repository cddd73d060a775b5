use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        predicates, reflector,
        watcher,
        WatchStreamExt,
    },
    Client, ResourceExt,
};
use tracing::{error, info, warn};

use mirrorfleet_api::{DeployPhase, Job, Manager, MirrorType, SyncStatus};

use crate::controller::job_resources::{
    desired_deployment, desired_front_configmap, desired_ingress, desired_pvc, desired_service,
    desired_service_monitor, sidecar_policy,
};
use crate::controller::{delete_ignore_missing, Context, FIELD_MANAGER};
use crate::error::{Error, Result};
use crate::monitoring::ServiceMonitor;

pub async fn run(client: Client, ctx: Arc<Context>) {
    let jobs: Api<Job> = Api::all(client.clone());
    let (reader, writer) = reflector::store();

    // Spec changes bump metadata.generation; status- or metadata-only writes
    // do not re-reconcile.
    let stream = reflector(writer, watcher(jobs, watcher::Config::default()))
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(stream, reader)
        .owns(
            Api::<PersistentVolumeClaim>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Deployment>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Service>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Ingress>::all(client.clone()),
            watcher::Config::default(),
        )
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled Job {:?}", o),
                Err(e) => error!("Job reconcile failed: {:?}", e),
            }
        })
        .await;
}

/// Locate the one manager with `phase=Succeeded` in the namespace.
async fn active_manager(client: &Client, ns: &str) -> Result<String> {
    let managers: Api<Manager> = Api::namespaced(client.clone(), ns);
    let list = managers.list(&ListParams::default()).await?;
    list.items
        .iter()
        .find(|m| {
            m.status
                .as_ref()
                .is_some_and(|s| s.phase == DeployPhase::Succeeded)
        })
        .map(|m| m.name_any())
        .ok_or(Error::NoActiveManager)
}

async fn reconcile(job: Arc<Job>, ctx: Arc<Context>) -> Result<Action> {
    let ns = job.namespace().unwrap_or_else(|| "default".to_string());
    let name = job.name_any();

    let manager = active_manager(&ctx.client, &ns).await?;

    // Non-mirror entries (proxy, git, external) are data-only: the manager
    // lists them, but no workload is rendered.
    if job
        .spec
        .config
        .mirror_type
        .is_some_and(|t| t != MirrorType::Mirror)
    {
        return Ok(Action::await_change());
    }

    info!("Reconciling Job {}/{}", ns, name);

    let policy = sidecar_policy(&job, &ctx.config);

    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &ns);
    let app_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ns);
    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), &ns);
    let ig_api: Api<Ingress> = Api::namespaced(ctx.client.clone(), &ns);
    let cm_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &ns);
    let sm_api: Api<ServiceMonitor> = Api::namespaced(ctx.client.clone(), &ns);

    let params = PatchParams::apply(FIELD_MANAGER).force();

    let pvc = desired_pvc(&job, &ctx.config);
    pvc_api.patch(&name, &params, &Patch::Apply(&pvc)).await?;

    match desired_deployment(&job, &manager, &ctx.config)? {
        Some(app) => {
            let svc = desired_service(&job, &ctx.config);
            svc_api.patch(&name, &params, &Patch::Apply(&svc)).await?;

            if !policy.disable_front {
                let ig = desired_ingress(&job, &ctx.config);
                ig_api.patch(&name, &params, &Patch::Apply(&ig)).await?;
                if let Some(cm) = desired_front_configmap(&job, &ctx.config) {
                    cm_api.patch(&name, &params, &Patch::Apply(&cm)).await?;
                }
            }

            app_api.patch(&name, &params, &Patch::Apply(&app)).await?;

            if ctx.config.enable_metric {
                let sm = desired_service_monitor(&job);
                sm_api.patch(&name, &params, &Patch::Apply(&sm)).await?;
            }
        }
        None => {
            delete_ignore_missing(&ig_api, &name).await?;
            delete_ignore_missing(&svc_api, &name).await?;
            delete_ignore_missing(&app_api, &name).await?;
            delete_ignore_missing(&cm_api, &name).await?;
            delete_ignore_missing(&sm_api, &name).await?;
        }
    }

    if policy.disable_front {
        delete_ignore_missing(&ig_api, &name).await?;
    }

    let mut status = job.status.clone().unwrap_or_default();
    if status.status == SyncStatus::None {
        status.status = SyncStatus::Created;
    }
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ns);
    jobs.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;

    Ok(Action::await_change())
}

fn error_policy(job: Arc<Job>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!("Job {} reconciliation error: {:?}", job.name_any(), error);

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}
