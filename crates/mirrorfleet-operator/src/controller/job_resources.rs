//! Desired-state builders for the objects derived from a `Job`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, LocalObjectReference,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use mirrorfleet_api::{Job, SyncStatus, FRONT_PORT, MANAGER_PORT, RSYNC_PORT, WORKER_PORT};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::monitoring::{MonitorEndpoint, ServiceMonitor, ServiceMonitorSpec};

/// Whether (and with what) the front / rsync sidecars are rendered.
#[derive(Debug, Clone)]
pub struct SidecarPolicy {
    pub disable_front: bool,
    pub disable_rsync: bool,
    pub front_image: String,
    pub rsync_image: String,
    pub front_cmd: Vec<String>,
    pub rsync_cmd: Vec<String>,
}

fn split_cmd(cmd: &str) -> Vec<String> {
    cmd.split_whitespace().map(str::to_string).collect()
}

pub fn sidecar_policy(job: &Job, cfg: &ControllerConfig) -> SidecarPolicy {
    let deploy = &job.spec.deploy;

    let mut front_mode = cfg.front_mode.clone();
    if !deploy.front_mode.is_empty() {
        front_mode = deploy.front_mode.clone();
    }

    let mut disable_front = deploy.disable_front.parse().unwrap_or(false);
    let mut front_image = cfg.front_image.clone();
    if front_mode.is_empty() {
        disable_front = true;
    } else if front_image.is_empty() {
        front_image = format!("{front_mode}:latest");
    }
    let mut front_cmd = split_cmd(&cfg.front_cmd);
    if !deploy.front_cmd.is_empty() {
        front_cmd = split_cmd(&deploy.front_cmd);
    }

    let mut disable_rsync = deploy.disable_rsync.parse().unwrap_or(false);
    let mut rsync_image = cfg.rsync_image.clone();
    if !deploy.rsync_image.is_empty() {
        rsync_image = deploy.rsync_image.clone();
    }
    if rsync_image.is_empty() {
        disable_rsync = true;
    }
    let mut rsync_cmd = split_cmd(&cfg.rsync_cmd);
    if !deploy.rsync_cmd.is_empty() {
        rsync_cmd = split_cmd(&deploy.rsync_cmd);
    }

    SidecarPolicy {
        disable_front,
        disable_rsync,
        front_image,
        rsync_image,
        front_cmd,
        rsync_cmd,
    }
}

pub(crate) fn labels(job_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("job".to_string(), job_name.to_string())])
}

pub(crate) fn owner_reference<K>(obj: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.meta().name.clone().unwrap_or_default(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn child_meta(job: &Job) -> ObjectMeta {
    ObjectMeta {
        name: Some(job.name_any()),
        namespace: job.namespace(),
        labels: Some(labels(&job.name_any())),
        owner_references: Some(vec![owner_reference(job)]),
        ..Default::default()
    }
}

fn env_var(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}

pub(crate) fn tcp_probe(port: u16) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(i32::from(port)),
            ..Default::default()
        }),
        initial_delay_seconds: Some(10),
        timeout_seconds: Some(5),
        period_seconds: Some(30),
        success_threshold: Some(1),
        failure_threshold: Some(5),
        ..Default::default()
    }
}

fn data_mount(job_name: &str) -> VolumeMount {
    VolumeMount {
        name: job_name.to_string(),
        mount_path: format!("/data/{job_name}"),
        ..Default::default()
    }
}

fn limits(cpu: &str, memory: &str) -> Option<ResourceRequirements> {
    if cpu.is_empty() && memory.is_empty() {
        return None;
    }
    let mut map = BTreeMap::new();
    if !cpu.is_empty() {
        map.insert("cpu".to_string(), Quantity(cpu.to_string()));
    }
    if !memory.is_empty() {
        map.insert("memory".to_string(), Quantity(memory.to_string()));
    }
    Some(ResourceRequirements {
        limits: Some(map),
        ..Default::default()
    })
}

pub fn desired_pvc(job: &Job, cfg: &ControllerConfig) -> PersistentVolumeClaim {
    let size = if job.spec.volume.size.is_empty() {
        "50Gi"
    } else {
        &job.spec.volume.size
    };

    let access_mode = if !job.spec.volume.access_mode.is_empty() {
        job.spec.volume.access_mode.clone()
    } else if !cfg.access_mode.is_empty() {
        cfg.access_mode.clone()
    } else {
        "ReadWriteOnce".to_string()
    };

    let storage_class = job
        .spec
        .volume
        .storage_class
        .clone()
        .or_else(|| (!cfg.storage_class.is_empty()).then(|| cfg.storage_class.clone()));

    PersistentVolumeClaim {
        metadata: child_meta(job),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode]),
            storage_class_name: storage_class,
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn worker_env(job: &Job, manager: &str, cfg: &ControllerConfig) -> Vec<EnvVar> {
    let name = job.name_any();
    let c = &job.spec.config;
    let int = |v: Option<i32>| v.unwrap_or(0).to_string();

    let mut env = vec![
        env_var("NAME", name),
        env_var("PROVIDER", c.provider.clone()),
        env_var("UPSTREAM", c.upstream.clone()),
        env_var("MIRROR_DIR", c.mirror_dir.clone()),
        env_var("CONCURRENT", int(c.concurrent)),
        env_var("INTERVAL", int(c.interval)),
        env_var("RETRY", int(c.retry)),
        env_var("TIMEOUT", int(c.timeout)),
        env_var("COMMAND", c.command.clone()),
        env_var("FAIL_ON_MATCH", c.fail_on_match.clone()),
        env_var("SIZE_PATTERN", c.size_pattern.clone()),
        env_var("IPV6", c.ipv6_only.clone()),
        env_var("IPV4", c.ipv4_only.clone()),
        env_var("EXCLUDE_FILE", c.exclude_file.clone()),
        env_var("RSYNC_OPTIONS", c.rsync_options.clone()),
        env_var("RSYNC_OVERRIDE", c.rsync_override.clone()),
        env_var("STAGE1_PROFILE", c.stage1_profile.clone()),
        env_var("EXEC_ON_SUCCESS", c.exec_on_success.clone()),
        env_var("EXEC_ON_FAILURE", c.exec_on_failure.clone()),
        env_var("API", format!("http://{manager}:{MANAGER_PORT}")),
        env_var("ADDR", format!(":{WORKER_PORT}")),
    ];

    for (k, v) in &job.spec.deploy.base.env {
        env.push(env_var(k, v.clone()));
    }
    for item in c.addition_envs.split(';') {
        if let Some((k, v)) = item.split_once('=') {
            if !k.is_empty() {
                env.push(env_var(k, v.to_string()));
            }
        }
    }
    if !c.debug.is_empty() || cfg.debug {
        env.push(env_var("DEBUG", "true".to_string()));
    }
    env
}

/// Render the job Deployment, or `None` when every container is disabled and
/// the existing workload should be torn down instead.
pub fn desired_deployment(
    job: &Job,
    manager: &str,
    cfg: &ControllerConfig,
) -> Result<Option<Deployment>> {
    let name = job.name_any();
    let policy = sidecar_policy(job, cfg);
    let disabled = job
        .status
        .as_ref()
        .is_some_and(|s| s.status == SyncStatus::Disabled);

    let pull_policy = if !job.spec.deploy.base.image_pull_policy.is_empty() {
        job.spec.deploy.base.image_pull_policy.clone()
    } else if !cfg.pull_policy.is_empty() {
        cfg.pull_policy.clone()
    } else {
        "IfNotPresent".to_string()
    };

    let mut containers = Vec::new();

    if !disabled {
        if job.spec.config.upstream.is_empty() {
            return Err(Error::UpstreamNotSet);
        }
        let mut image = job.spec.deploy.base.image.clone();
        if image.is_empty() {
            image = cfg.worker_image.clone();
        }
        if !image.is_empty() {
            containers.push(Container {
                name: name.clone(),
                image: Some(image),
                image_pull_policy: Some(pull_policy.clone()),
                env: Some(worker_env(job, manager, cfg)),
                liveness_probe: Some(tcp_probe(WORKER_PORT)),
                readiness_probe: Some(tcp_probe(WORKER_PORT)),
                volume_mounts: Some(vec![data_mount(&name)]),
                ports: Some(vec![ContainerPort {
                    container_port: i32::from(WORKER_PORT),
                    name: Some("api".to_string()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                resources: limits(
                    &job.spec.deploy.base.cpu_limit,
                    &job.spec.deploy.base.memory_limit,
                ),
                ..Default::default()
            });
        }
    }

    let mut volumes = vec![Volume {
        name: name.clone(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: name.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }];

    if !policy.disable_front {
        let mut mounts = vec![data_mount(&name)];
        if !cfg.front_config.is_empty() {
            mounts.push(VolumeMount {
                name: "front-config".to_string(),
                mount_path: "/etc/caddy".to_string(),
                ..Default::default()
            });
            volumes.push(Volume {
                name: "front-config".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        containers.push(Container {
            name: format!("{name}-front"),
            image: Some(policy.front_image.clone()),
            image_pull_policy: Some(pull_policy.clone()),
            command: (!policy.front_cmd.is_empty()).then(|| policy.front_cmd.clone()),
            liveness_probe: Some(tcp_probe(FRONT_PORT)),
            readiness_probe: Some(tcp_probe(FRONT_PORT)),
            volume_mounts: Some(mounts),
            ports: Some(vec![ContainerPort {
                container_port: i32::from(FRONT_PORT),
                name: Some("front".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    if !policy.disable_rsync {
        containers.push(Container {
            name: format!("{name}-rsync"),
            image: Some(policy.rsync_image.clone()),
            image_pull_policy: Some(pull_policy.clone()),
            command: (!policy.rsync_cmd.is_empty()).then(|| policy.rsync_cmd.clone()),
            liveness_probe: Some(tcp_probe(RSYNC_PORT)),
            readiness_probe: Some(tcp_probe(RSYNC_PORT)),
            volume_mounts: Some(vec![data_mount(&name)]),
            ports: Some(vec![ContainerPort {
                container_port: i32::from(RSYNC_PORT),
                name: Some("rsync".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    if containers.is_empty() {
        return Ok(None);
    }

    let image_pull_secrets = job.spec.deploy.base.image_pull_secrets.clone().or_else(|| {
        (!cfg.pull_secret.is_empty()).then(|| {
            vec![LocalObjectReference {
                name: cfg.pull_secret.clone(),
            }]
        })
    });

    Ok(Some(Deployment {
        metadata: child_meta(job),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(labels(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(&name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    enable_service_links: Some(false),
                    containers,
                    volumes: Some(volumes),
                    image_pull_secrets,
                    node_name: (!job.spec.deploy.base.node_name.is_empty())
                        .then(|| job.spec.deploy.base.node_name.clone()),
                    affinity: job.spec.deploy.base.affinity.clone(),
                    tolerations: job.spec.deploy.base.tolerations.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }))
}

pub fn desired_service(job: &Job, cfg: &ControllerConfig) -> Service {
    let name = job.name_any();
    let policy = sidecar_policy(job, cfg);

    let mut ports = vec![ServicePort {
        name: Some("api".to_string()),
        port: i32::from(WORKER_PORT),
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::String("api".to_string())),
        ..Default::default()
    }];
    if !policy.disable_front {
        ports.push(ServicePort {
            name: Some("front".to_string()),
            port: i32::from(FRONT_PORT),
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::String("front".to_string())),
            ..Default::default()
        });
    }
    if !policy.disable_rsync {
        ports.push(ServicePort {
            name: Some("rsync".to_string()),
            port: i32::from(RSYNC_PORT),
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::String("rsync".to_string())),
            ..Default::default()
        });
    }

    Service {
        metadata: child_meta(job),
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(labels(&name)),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn desired_ingress(job: &Job, cfg: &ControllerConfig) -> Ingress {
    let name = job.name_any();

    let mut annotations = cfg.front_ann.clone();
    annotations.extend(
        job.spec
            .ingress
            .annotations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let mut metadata = child_meta(job);
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    let mut rule = IngressRule {
        host: None,
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(format!("/{name}")),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: name.clone(),
                        port: Some(ServiceBackendPort {
                            name: Some("front".to_string()),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    };
    if !cfg.front_host.is_empty() {
        rule.host = Some(cfg.front_host.clone());
    }
    if !job.spec.ingress.host.is_empty() {
        rule.host = Some(job.spec.ingress.host.clone());
    }

    let mut class = None;
    if !cfg.front_class.is_empty() {
        class = Some(cfg.front_class.clone());
    }
    if !job.spec.ingress.ingress_class.is_empty() {
        class = Some(job.spec.ingress.ingress_class.clone());
    }

    let mut tls = None;
    let secret = if !job.spec.ingress.tls_secret.is_empty() {
        job.spec.ingress.tls_secret.clone()
    } else {
        cfg.front_tls.clone()
    };
    if !secret.is_empty() {
        tls = Some(vec![IngressTLS {
            secret_name: Some(secret),
            ..Default::default()
        }]);
    }

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: class,
            rules: Some(vec![rule]),
            tls,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn desired_front_configmap(job: &Job, cfg: &ControllerConfig) -> Option<ConfigMap> {
    if cfg.front_config.is_empty() {
        return None;
    }
    Some(ConfigMap {
        metadata: child_meta(job),
        data: Some(BTreeMap::from([(
            "config.json".to_string(),
            cfg.front_config.clone(),
        )])),
        ..Default::default()
    })
}

pub fn desired_service_monitor(job: &Job) -> ServiceMonitor {
    let name = job.name_any();
    let mut sm = ServiceMonitor::new(
        &name,
        ServiceMonitorSpec {
            selector: LabelSelector {
                match_labels: Some(labels(&name)),
                ..Default::default()
            },
            endpoints: vec![MonitorEndpoint {
                port: Some("front".to_string()),
                ..Default::default()
            }],
        },
    );
    sm.metadata = child_meta(job);
    sm
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use mirrorfleet_api::{JobConfig, JobSpec, JobStatus};

    fn test_job() -> Job {
        let mut job = Job::new(
            "alpine",
            JobSpec {
                config: JobConfig {
                    upstream: "rsync://rsync.alpinelinux.org/alpine/".into(),
                    provider: "rsync".into(),
                    interval: Some(60),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        job.metadata = ObjectMeta {
            name: Some("alpine".into()),
            namespace: Some("mirrors".into()),
            uid: Some("uid-1".into()),
            ..Default::default()
        };
        job
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig {
            rsync_image: "mirrorfleet/rsyncd:latest".into(),
            ..Default::default()
        }
    }

    #[test]
    fn pvc_defaults_to_fifty_gi() {
        let pvc = desired_pvc(&test_job(), &test_config());
        let spec = pvc.spec.unwrap();
        let req = spec.resources.unwrap().requests.unwrap();
        assert_eq!(req["storage"].0, "50Gi");
        assert_eq!(spec.access_modes.unwrap(), vec!["ReadWriteOnce"]);
        assert!(spec.storage_class_name.is_none());
    }

    #[test]
    fn pvc_honors_spec_overrides() {
        let mut job = test_job();
        job.spec.volume.size = "500Gi".into();
        job.spec.volume.access_mode = "ReadWriteMany".into();
        job.spec.volume.storage_class = Some("fast".into());
        let spec = desired_pvc(&job, &test_config()).spec.unwrap();
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"].0,
            "500Gi"
        );
        assert_eq!(spec.access_modes.unwrap(), vec!["ReadWriteMany"]);
        assert_eq!(spec.storage_class_name.unwrap(), "fast");
    }

    #[test]
    fn deployment_carries_worker_front_and_rsync() {
        let app = desired_deployment(&test_job(), "manager", &test_config())
            .unwrap()
            .unwrap();
        let containers = app.spec.unwrap().template.spec.unwrap().containers;
        let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpine", "alpine-front", "alpine-rsync"]);

        let env = containers[0].env.as_ref().unwrap();
        let get = |k: &str| {
            env.iter()
                .find(|e| e.name == k)
                .and_then(|e| e.value.clone())
                .unwrap_or_default()
        };
        assert_eq!(get("API"), "http://manager:3000");
        assert_eq!(get("ADDR"), ":6000");
        assert_eq!(get("UPSTREAM"), "rsync://rsync.alpinelinux.org/alpine/");
        assert_eq!(get("INTERVAL"), "60");
    }

    #[test]
    fn disabled_job_renders_only_sidecars() {
        let mut job = test_job();
        job.status = Some(JobStatus {
            status: mirrorfleet_api::SyncStatus::Disabled,
            ..Default::default()
        });
        let app = desired_deployment(&job, "manager", &test_config())
            .unwrap()
            .unwrap();
        let containers = app.spec.unwrap().template.spec.unwrap().containers;
        let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpine-front", "alpine-rsync"]);
    }

    #[test]
    fn fully_disabled_job_renders_nothing() {
        let mut job = test_job();
        job.status = Some(JobStatus {
            status: mirrorfleet_api::SyncStatus::Disabled,
            ..Default::default()
        });
        job.spec.deploy.disable_front = "true".into();
        job.spec.deploy.disable_rsync = "true".into();
        let app = desired_deployment(&job, "manager", &test_config()).unwrap();
        assert!(app.is_none());
    }

    #[test]
    fn missing_upstream_is_a_config_error() {
        let mut job = test_job();
        job.spec.config.upstream.clear();
        let err = desired_deployment(&job, "manager", &test_config()).unwrap_err();
        assert!(matches!(err, Error::UpstreamNotSet));
    }

    #[test]
    fn service_exposes_enabled_ports() {
        let svc = desired_service(&test_job(), &test_config());
        let ports = svc.spec.unwrap().ports.unwrap();
        let names: Vec<_> = ports.iter().map(|p| p.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["api", "front", "rsync"]);

        let mut cfg = test_config();
        cfg.rsync_image.clear();
        let svc = desired_service(&test_job(), &cfg);
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn ingress_routes_job_prefix_to_front() {
        let mut cfg = test_config();
        cfg.front_host = "mirrors.example.org".into();
        cfg.front_ann = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let ig = desired_ingress(&test_job(), &cfg);
        assert_eq!(ig.metadata.annotations.unwrap()["a"], "1");
        let rule = &ig.spec.unwrap().rules.unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("mirrors.example.org"));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/alpine"));
        assert_eq!(
            path.backend
                .service
                .as_ref()
                .unwrap()
                .port
                .as_ref()
                .unwrap()
                .name
                .as_deref(),
            Some("front")
        );
    }

    #[test]
    fn children_are_owned_by_the_job() {
        let pvc = desired_pvc(&test_job(), &test_config());
        let owner = &pvc.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "Job");
        assert_eq!(owner.name, "alpine");
        assert_eq!(owner.uid, "uid-1");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn sidecar_policy_disables_on_empty_images() {
        let mut cfg = test_config();
        cfg.front_mode.clear();
        cfg.rsync_image.clear();
        let p = sidecar_policy(&test_job(), &cfg);
        assert!(p.disable_front);
        assert!(p.disable_rsync);
    }

    #[test]
    fn front_configmap_follows_controller_config() {
        assert!(desired_front_configmap(&test_job(), &test_config()).is_none());
        let mut cfg = test_config();
        cfg.front_config = "{}".into();
        let cm = desired_front_configmap(&test_job(), &cfg).unwrap();
        assert_eq!(cm.data.unwrap()["config.json"], "{}");
    }
}
