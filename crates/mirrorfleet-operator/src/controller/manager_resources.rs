//! Desired-state builders for the objects derived from a `Manager`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec, PodTemplateSpec,
    Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use mirrorfleet_api::{DeployType, Manager, GROUP, MANAGER_PORT};

use crate::config::ControllerConfig;
use crate::controller::job_resources::owner_reference;

const API_PATHS: [&str; 4] = ["/api/mirrors", "/api/news", "/api/files", "/api/mirrorz.json"];

fn labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("manager".to_string(), name.to_string())])
}

fn child_meta(manager: &Manager, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: manager.namespace(),
        labels: Some(labels(&manager.name_any())),
        owner_references: Some(vec![owner_reference(manager)]),
        ..Default::default()
    }
}

pub fn desired_service_account(manager: &Manager) -> ServiceAccount {
    ServiceAccount {
        metadata: child_meta(manager, format!("{}-sa", manager.name_any())),
        ..Default::default()
    }
}

pub fn desired_role(manager: &Manager) -> Role {
    let full = ["create", "delete", "get", "list", "patch", "update", "watch"];
    let status = ["get", "patch", "update"];
    let rule = |resource: &str, verbs: &[&str]| PolicyRule {
        api_groups: Some(vec![GROUP.to_string()]),
        resources: Some(vec![resource.to_string()]),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    };

    Role {
        metadata: child_meta(manager, format!("{}-role", manager.name_any())),
        rules: Some(vec![
            rule("jobs", &full),
            rule("jobs/status", &status),
            rule("announcements", &full),
            rule("announcements/status", &status),
            rule("files", &full),
            rule("files/status", &status),
        ]),
    }
}

pub fn desired_role_binding(manager: &Manager) -> RoleBinding {
    let name = manager.name_any();
    RoleBinding {
        metadata: child_meta(manager, name.clone()),
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: format!("{name}-sa"),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: format!("{name}-role"),
        },
    }
}

fn manager_pod_spec(manager: &Manager, cfg: &ControllerConfig) -> PodSpec {
    let name = manager.name_any();
    let deploy = &manager.spec.deploy;

    let mut image = deploy.image.clone();
    if image.is_empty() {
        image = cfg.manager_image.clone();
    }

    let mut env = vec![
        EnvVar {
            name: "NAMESPACE".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.namespace".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "ADDR".to_string(),
            value: Some(format!(":{MANAGER_PORT}")),
            ..Default::default()
        },
    ];
    for (k, v) in &deploy.env {
        env.push(EnvVar {
            name: k.clone(),
            value: Some(v.clone()),
            ..Default::default()
        });
    }

    let probe = super::job_resources::tcp_probe(MANAGER_PORT);

    let mut container = Container {
        name: name.clone(),
        image: Some(image),
        env: Some(env),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(MANAGER_PORT),
            name: Some("api".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };
    if !deploy.image_pull_policy.is_empty() {
        container.image_pull_policy = Some(deploy.image_pull_policy.clone());
    }

    PodSpec {
        containers: vec![container],
        service_account_name: Some(format!("{name}-sa")),
        image_pull_secrets: deploy.image_pull_secrets.clone(),
        node_name: (!deploy.node_name.is_empty()).then(|| deploy.node_name.clone()),
        affinity: deploy.affinity.clone(),
        tolerations: deploy.tolerations.clone(),
        ..Default::default()
    }
}

/// The manager workload, shaped by `spec.deployType`.
pub enum ManagerWorkload {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
}

pub fn desired_workload(manager: &Manager, cfg: &ControllerConfig) -> ManagerWorkload {
    let name = manager.name_any();
    let selector = LabelSelector {
        match_labels: Some(labels(&name)),
        ..Default::default()
    };
    let template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels(&name)),
            ..Default::default()
        }),
        spec: Some(manager_pod_spec(manager, cfg)),
    };

    match manager.spec.deploy_type.unwrap_or_default() {
        DeployType::Deployment => ManagerWorkload::Deployment(Deployment {
            metadata: child_meta(manager, name),
            spec: Some(DeploymentSpec {
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
        DeployType::DaemonSet => ManagerWorkload::DaemonSet(DaemonSet {
            metadata: child_meta(manager, name),
            spec: Some(DaemonSetSpec {
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

pub fn desired_service(manager: &Manager) -> Service {
    let name = manager.name_any();
    Service {
        metadata: child_meta(manager, name.clone()),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("api".to_string()),
                port: i32::from(MANAGER_PORT),
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String("api".to_string())),
                ..Default::default()
            }]),
            selector: Some(labels(&name)),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn desired_ingress(manager: &Manager, cfg: &ControllerConfig) -> Ingress {
    let name = manager.name_any();

    let mut annotations = cfg.front_ann.clone();
    annotations.extend(
        manager
            .spec
            .ingress
            .annotations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let mut metadata = child_meta(manager, name.clone());
    if !annotations.is_empty() {
        metadata.annotations = Some(annotations);
    }

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: name.clone(),
            port: Some(ServiceBackendPort {
                name: Some("api".to_string()),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };
    let mut rule = IngressRule {
        host: None,
        http: Some(HTTPIngressRuleValue {
            paths: API_PATHS
                .iter()
                .map(|p| HTTPIngressPath {
                    path: Some((*p).to_string()),
                    path_type: "Exact".to_string(),
                    backend: backend.clone(),
                })
                .collect(),
        }),
    };
    if !cfg.front_host.is_empty() {
        rule.host = Some(cfg.front_host.clone());
    }
    if !manager.spec.ingress.host.is_empty() {
        rule.host = Some(manager.spec.ingress.host.clone());
    }

    let mut class = None;
    if !cfg.front_class.is_empty() {
        class = Some(cfg.front_class.clone());
    }
    if !manager.spec.ingress.ingress_class.is_empty() {
        class = Some(manager.spec.ingress.ingress_class.clone());
    }

    let secret = if !manager.spec.ingress.tls_secret.is_empty() {
        manager.spec.ingress.tls_secret.clone()
    } else {
        cfg.front_tls.clone()
    };
    let tls = (!secret.is_empty()).then(|| {
        vec![IngressTLS {
            secret_name: Some(secret),
            ..Default::default()
        }]
    });

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

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorfleet_api::ManagerSpec;

    fn test_manager() -> Manager {
        let mut m = Manager::new("m1", ManagerSpec::default());
        m.metadata.namespace = Some("mirrors".into());
        m.metadata.uid = Some("uid-m1".into());
        m
    }

    #[test]
    fn role_covers_all_fleet_resources() {
        let role = desired_role(&test_manager());
        let rules = role.rules.unwrap();
        let resources: Vec<_> = rules
            .iter()
            .flat_map(|r| r.resources.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            resources,
            vec![
                "jobs",
                "jobs/status",
                "announcements",
                "announcements/status",
                "files",
                "files/status"
            ]
        );
        for r in &rules {
            assert_eq!(r.api_groups.as_ref().unwrap()[0], GROUP);
        }
    }

    #[test]
    fn role_binding_links_sa_to_role() {
        let rb = desired_role_binding(&test_manager());
        assert_eq!(rb.subjects.unwrap()[0].name, "m1-sa");
        assert_eq!(rb.role_ref.name, "m1-role");
    }

    #[test]
    fn workload_kind_follows_deploy_type() {
        let m = test_manager();
        assert!(matches!(
            desired_workload(&m, &ControllerConfig::default()),
            ManagerWorkload::Deployment(_)
        ));

        let mut m = test_manager();
        m.spec.deploy_type = Some(DeployType::DaemonSet);
        assert!(matches!(
            desired_workload(&m, &ControllerConfig::default()),
            ManagerWorkload::DaemonSet(_)
        ));
    }

    #[test]
    fn workload_falls_back_to_controller_image() {
        let m = test_manager();
        let ManagerWorkload::Deployment(app) = desired_workload(&m, &ControllerConfig::default())
        else {
            panic!("expected deployment");
        };
        let spec = app.spec.unwrap().template.spec.unwrap();
        assert_eq!(
            spec.containers[0].image.as_deref(),
            Some("mirrorfleet/manager:latest")
        );
        assert_eq!(spec.service_account_name.as_deref(), Some("m1-sa"));
    }

    #[test]
    fn ingress_exposes_the_four_api_paths() {
        let ig = desired_ingress(&test_manager(), &ControllerConfig::default());
        let paths: Vec<_> = ig.spec.unwrap().rules.unwrap()[0]
            .http
            .as_ref()
            .unwrap()
            .paths
            .iter()
            .map(|p| p.path.clone().unwrap())
            .collect();
        assert_eq!(
            paths,
            vec!["/api/mirrors", "/api/news", "/api/files", "/api/mirrorz.json"]
        );
    }
}
