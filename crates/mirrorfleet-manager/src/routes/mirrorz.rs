use axum::extract::State;
use axum::Json;

use mirrorfleet_api::size::format_size;
use mirrorfleet_api::MirrorType;

use crate::error::{ApiError, Result};
use crate::external;
use crate::mirrorz::{status_code, Info, InfoUrl, Mirror, MirrorZ};
use crate::state::AppState;

pub async fn mirrorz_json(State(state): State<AppState>) -> Result<Json<MirrorZ>> {
    let Some(base) = state.options.mirrorz.as_ref() else {
        return Err(ApiError::NotFound("mirrorz catalogue".to_string()));
    };

    let _g = state.lock.read().await;
    let mut doc = base.clone();

    for file in state.files.state() {
        let Some(status) = file.status.as_ref().filter(|s| !s.files.is_empty()) else {
            continue;
        };
        let mut distro = file.spec.alias.clone();
        if distro.is_empty() {
            distro = file.metadata.name.clone().unwrap_or_default();
        }
        doc.info.push(Info {
            distro,
            category: serde_json::to_value(file.spec.file_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            urls: status
                .files
                .iter()
                .map(|f| InfoUrl {
                    name: f.name.clone(),
                    url: f.path.clone(),
                })
                .collect(),
        });
    }

    let mut full_size: u64 = 0;
    for job in state.jobs.state() {
        let cfg = &job.spec.config;
        if cfg.mirror_type == Some(MirrorType::External) {
            if let Some(provider) = external::provider(cfg, &state.http) {
                if let Ok(mut entries) = provider.list_z().await {
                    doc.mirrors.append(&mut entries);
                }
            }
            continue;
        }

        let name = job.metadata.name.clone().unwrap_or_default();
        let status = job.status.clone().unwrap_or_default();
        full_size += status.size;

        let mut cname = cfg.alias.clone();
        if cname.is_empty() {
            cname = name.clone();
        }
        let mut url = cfg.url.clone();
        if url.is_empty() {
            url = format!("/{name}");
        }
        let (code, disabled) = status_code(cfg.mirror_type, &status);

        doc.mirrors.push(Mirror {
            cname,
            desc: cfg.desc.clone(),
            url,
            status: code,
            help: cfg.help_url.clone(),
            upstream: cfg.upstream.clone(),
            size: format_size(status.size),
            disable: disabled,
        });
    }

    doc.site.disk = format_size(full_size);
    if !state.options.total.is_empty() {
        doc.site.disk = format!("{}/{}", doc.site.disk, state.options.total);
    }

    Ok(Json(doc))
}
