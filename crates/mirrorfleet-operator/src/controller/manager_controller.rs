use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
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

use mirrorfleet_api::{DeployPhase, Manager};

use crate::controller::manager_resources::{
    desired_ingress, desired_role, desired_role_binding, desired_service, desired_service_account,
    desired_workload, ManagerWorkload,
};
use crate::controller::{delete_ignore_missing, Context, FIELD_MANAGER};
use crate::error::{Error, Result};

pub async fn run(client: Client, ctx: Arc<Context>) {
    let managers: Api<Manager> = Api::all(client.clone());
    let (reader, writer) = reflector::store();

    let stream = reflector(writer, watcher(managers, watcher::Config::default()))
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(stream, reader)
        .owns(
            Api::<ServiceAccount>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(Api::<Role>::all(client.clone()), watcher::Config::default())
        .owns(
            Api::<RoleBinding>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Deployment>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<DaemonSet>::all(client.clone()),
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
                Ok(o) => info!("Reconciled Manager {:?}", o),
                Err(e) => error!("Manager reconcile failed: {:?}", e),
            }
        })
        .await;
}

async fn reconcile(manager: Arc<Manager>, ctx: Arc<Context>) -> Result<Action> {
    let ns = manager.namespace().unwrap_or_else(|| "default".to_string());
    let name = manager.name_any();

    // Singleton admission: a second manager may not take over a namespace
    // that already has an active one.
    let managers: Api<Manager> = Api::namespaced(ctx.client.clone(), &ns);
    let list = managers.list(&ListParams::default()).await?;
    let conflicting = list.items.iter().any(|m| {
        m.name_any() != name
            && m.status
                .as_ref()
                .is_some_and(|s| s.phase == DeployPhase::Succeeded)
    });
    if conflicting {
        return Err(Error::ManagerConflict);
    }

    info!("Reconciling Manager {}/{}", ns, name);

    let sa_api: Api<ServiceAccount> = Api::namespaced(ctx.client.clone(), &ns);
    let role_api: Api<Role> = Api::namespaced(ctx.client.clone(), &ns);
    let rb_api: Api<RoleBinding> = Api::namespaced(ctx.client.clone(), &ns);
    let app_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ns);
    let ds_api: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), &ns);
    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), &ns);
    let ig_api: Api<Ingress> = Api::namespaced(ctx.client.clone(), &ns);

    let params = PatchParams::apply(FIELD_MANAGER).force();

    let sa = desired_service_account(&manager);
    sa_api
        .patch(&format!("{name}-sa"), &params, &Patch::Apply(&sa))
        .await?;

    let role = desired_role(&manager);
    role_api
        .patch(&format!("{name}-role"), &params, &Patch::Apply(&role))
        .await?;

    let rb = desired_role_binding(&manager);
    rb_api.patch(&name, &params, &Patch::Apply(&rb)).await?;

    // Switching deployType tears down the other workload kind.
    match desired_workload(&manager, &ctx.config) {
        ManagerWorkload::Deployment(app) => {
            delete_ignore_missing(&ds_api, &name).await?;
            app_api.patch(&name, &params, &Patch::Apply(&app)).await?;
        }
        ManagerWorkload::DaemonSet(ds) => {
            delete_ignore_missing(&app_api, &name).await?;
            ds_api.patch(&name, &params, &Patch::Apply(&ds)).await?;
        }
    }

    let svc = desired_service(&manager);
    svc_api.patch(&name, &params, &Patch::Apply(&svc)).await?;

    let ig = desired_ingress(&manager, &ctx.config);
    ig_api.patch(&name, &params, &Patch::Apply(&ig)).await?;

    managers
        .patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&serde_json::json!({ "status": { "phase": DeployPhase::Succeeded } })),
        )
        .await?;

    Ok(Action::await_change())
}

fn error_policy(manager: Arc<Manager>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        "Manager {} reconciliation error: {:?}",
        manager.name_any(),
        error
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}
