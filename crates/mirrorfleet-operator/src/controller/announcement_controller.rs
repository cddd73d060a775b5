use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::{
        controller::{Action, Controller},
        predicates, reflector,
        watcher,
        WatchStreamExt,
    },
    Client, ResourceExt,
};
use tracing::{error, info, warn};

use mirrorfleet_api::Announcement;

use crate::controller::{Context, FIELD_MANAGER};
use crate::error::{Error, Result};

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub async fn run(client: Client, ctx: Arc<Context>) {
    let announcements: Api<Announcement> = Api::all(client.clone());
    let (reader, writer) = reflector::store();

    let stream = reflector(writer, watcher(announcements, watcher::Config::default()))
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(stream, reader)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("Reconciled Announcement {:?}", o),
                Err(e) => error!("Announcement reconcile failed: {:?}", e),
            }
        })
        .await;
}

async fn reconcile(news: Arc<Announcement>, ctx: Arc<Context>) -> Result<Action> {
    let ns = news.namespace().unwrap_or_else(|| "default".to_string());
    let name = news.name_any();

    let mut status = news.status.clone().unwrap_or_default();
    if status.pub_time == 0 {
        status.pub_time = now_unix();
    }
    status.edit_time = now_unix();

    let api: Api<Announcement> = Api::namespaced(ctx.client.clone(), &ns);
    api.patch_status(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&serde_json::json!({ "status": status })),
    )
    .await?;

    Ok(Action::await_change())
}

fn error_policy(news: Arc<Announcement>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        "Announcement {} reconciliation error: {:?}",
        news.name_any(),
        error
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}
