use std::collections::BTreeMap;
use std::env;

/// Controller-wide defaults, read once at startup from the environment.
///
/// Every field has a code-side default so a bare deployment works; per-job
/// spec fields override these where the Job CRD exposes the same knob.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub manager_image: String,
    pub worker_image: String,
    pub pull_policy: String,
    pub pull_secret: String,
    pub storage_class: String,
    pub access_mode: String,
    /// Front sidecar flavor; empty disables the front container fleet-wide.
    pub front_mode: String,
    pub front_image: String,
    pub front_cmd: String,
    /// Config document mounted into the front container when non-empty.
    pub front_config: String,
    pub rsync_image: String,
    pub rsync_cmd: String,
    pub front_host: String,
    pub front_tls: String,
    pub front_class: String,
    /// Extra ingress annotations, `k=v` pairs separated by `;` in the env.
    pub front_ann: BTreeMap<String, String>,
    pub enable_metric: bool,
    pub debug: bool,
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

pub(crate) fn parse_ann(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|item| {
            let (k, v) = item.split_once('=')?;
            if k.is_empty() {
                None
            } else {
                Some((k.to_string(), v.to_string()))
            }
        })
        .collect()
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        Self {
            manager_image: env_or("MANAGER_IMAGE", "mirrorfleet/manager:latest"),
            worker_image: env_or("WORKER_IMAGE", "mirrorfleet/worker:latest"),
            pull_policy: env_or("PULL_POLICY", ""),
            pull_secret: env_or("PULL_SECRET", ""),
            storage_class: env_or("STORAGE_CLASS", ""),
            access_mode: env_or("ACCESS_MODE", ""),
            front_mode: env_or("FRONT_MODE", "caddy"),
            front_image: env_or("FRONT_IMAGE", ""),
            front_cmd: env_or("FRONT_CMD", ""),
            front_config: env_or("FRONT_CONFIG", ""),
            rsync_image: env_or("RSYNC_IMAGE", ""),
            rsync_cmd: env_or("RSYNC_CMD", ""),
            front_host: env_or("FRONT_HOST", ""),
            front_tls: env_or("FRONT_TLS", ""),
            front_class: env_or("FRONT_CLASS", ""),
            front_ann: parse_ann(&env_or("FRONT_ANN", "")),
            enable_metric: !env_or("ENABLE_METRIC", "").is_empty(),
            debug: !env_or("DEBUG", "").is_empty(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            manager_image: "mirrorfleet/manager:latest".into(),
            worker_image: "mirrorfleet/worker:latest".into(),
            pull_policy: String::new(),
            pull_secret: String::new(),
            storage_class: String::new(),
            access_mode: String::new(),
            front_mode: "caddy".into(),
            front_image: String::new(),
            front_cmd: String::new(),
            front_config: String::new(),
            rsync_image: String::new(),
            rsync_cmd: String::new(),
            front_host: String::new(),
            front_tls: String::new(),
            front_class: String::new(),
            front_ann: BTreeMap::new(),
            enable_metric: false,
            debug: false,
        }
    }
}
