//! Loki log store with Promtail collectors and a Grafana front end.
//!
//! Promtail pushes to the Loki service by its emitted name, so remapping
//! `loki-service` also rewires the collectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use kubegen_core::domain::{
    BuildContext, BuildItem, BuildSource, DomainError, DomainResult, OptionValue, StructuralObject,
};

use super::grafana::{GRAFANA_PORT, Grafana, GrafanaAdmin, GrafanaDashboard};
use super::{read_option, yaml_text};

const LOKI_PORT: u16 = 3100;
const DATA_VOLUME: &str = "loki-data";

const OBJECT_NAMES: &[&str] = &[
    "loki-service-account",
    "loki-config",
    "loki-statefulset",
    "loki-service",
    "promtail-service-account",
    "promtail-cluster-role",
    "promtail-cluster-role-binding",
    "promtail-config",
    "promtail-daemonset",
    "grafana-config",
    "grafana-admin",
    "grafana-deployment",
    "grafana-service",
];

/// `config.*` options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LokiStackConfig {
    pub loki_image: String,
    pub promtail_image: String,
    pub grafana_image: String,
    pub loki_service_port: u16,
    pub grafana_service_port: u16,
    /// Grafana provisioning tree: `datasources` and dashboard
    /// `providers`.
    #[serde(default)]
    pub grafana_provisioning: Json,
    #[serde(default)]
    pub grafana_dashboards: Vec<GrafanaDashboard>,
    #[serde(default)]
    pub grafana_admin: Option<GrafanaAdmin>,
}

impl Default for LokiStackConfig {
    fn default() -> Self {
        Self {
            loki_image: "grafana/loki:2.0.0".into(),
            promtail_image: "grafana/promtail:2.0.0".into(),
            grafana_image: "grafana/grafana:7.3.0".into(),
            loki_service_port: LOKI_PORT,
            grafana_service_port: GRAFANA_PORT,
            grafana_provisioning: json!({ "datasources": [] }),
            grafana_dashboards: Vec::new(),
            grafana_admin: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Enable {
    grafana: bool,
    promtail: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KubernetesOptions {
    #[serde(default)]
    volumes: BTreeMap<String, Json>,
    #[serde(default)]
    resources: BTreeMap<String, Json>,
}

/// Build source `lokistack`.
///
/// Items: `access-control`, `config` and `service`. Promtail and Grafana
/// objects are only emitted while `enable.promtail` / `enable.grafana` hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct LokiStack;

impl BuildSource for LokiStack {
    fn source_name(&self) -> &'static str {
        "lokistack"
    }

    fn items(&self) -> &'static [BuildItem] {
        const ITEMS: &[BuildItem] = &[
            BuildItem::requires("access-control", &["namespace", "enable.promtail"]),
            BuildItem::requires(
                "config",
                &["config.loki_service_port", "enable.promtail", "enable.grafana"],
            ),
            BuildItem::requires(
                "service",
                &["config.loki_service_port", "config.grafana_service_port"],
            ),
        ];
        ITEMS
    }

    fn object_names(&self) -> &'static [&'static str] {
        OBJECT_NAMES
    }

    fn required_options(&self) -> &'static [&'static str] {
        &["namespace"]
    }

    fn option_defaults(&self) -> OptionValue {
        OptionValue::from(json!({
            "namespace": "monitoring",
            "config": LokiStackConfig::default(),
            "enable": { "grafana": true, "promtail": true },
            "kubernetes": { "volumes": {}, "resources": {} },
        }))
    }

    fn produce(&self, item: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
        match item {
            "access-control" => access_control(ctx, ctx.options().get_bool("enable.promtail")?),
            "config" => config_maps(ctx, &read_config(ctx)?, read_enable(ctx)?),
            "service" => {
                let kubernetes: KubernetesOptions =
                    read_option(ctx, "kubernetes", "kubernetes volume/resource mapping")?;
                services(ctx, &read_config(ctx)?, read_enable(ctx)?, &kubernetes)
            }
            _ => Err(DomainError::UnknownBuildItem {
                builder: self.source_name().to_string(),
                item: item.to_string(),
            }),
        }
    }
}

fn grafana(config: &LokiStackConfig, resources: Json) -> Grafana<'_> {
    Grafana {
        image: &config.grafana_image,
        service_port: config.grafana_service_port,
        provisioning: &config.grafana_provisioning,
        dashboards: &config.grafana_dashboards,
        admin: config.grafana_admin.as_ref(),
        resources,
    }
}

fn read_config(ctx: &BuildContext<'_>) -> DomainResult<LokiStackConfig> {
    read_option(ctx, "config", "lokistack configuration")
}

fn read_enable(ctx: &BuildContext<'_>) -> DomainResult<Enable> {
    read_option(ctx, "enable", "mapping of booleans")
}

fn access_control(ctx: &BuildContext<'_>, promtail: bool) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let mut objects = vec![service_account(ctx, "loki-service-account", &namespace)?];
    if !promtail {
        return Ok(objects);
    }

    let account = ctx.object_name("promtail-service-account")?;
    let role = ctx.object_name("promtail-cluster-role")?;
    objects.push(service_account(ctx, "promtail-service-account", &namespace)?);
    objects.push(StructuralObject::named(
        "promtail-cluster-role",
        json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": { "name": role },
            "rules": [{
                "apiGroups": [""],
                "resources": ["nodes", "nodes/proxy", "services", "endpoints", "pods"],
                "verbs": ["get", "watch", "list"],
            }],
        }),
    ));
    objects.push(StructuralObject::named(
        "promtail-cluster-role-binding",
        json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRoleBinding",
            "metadata": { "name": ctx.object_name("promtail-cluster-role-binding")? },
            "roleRef": { "apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole", "name": role },
            "subjects": [{ "kind": "ServiceAccount", "name": account, "namespace": namespace }],
        }),
    ));
    Ok(objects)
}

fn service_account(ctx: &BuildContext<'_>, logical: &str, namespace: &str) -> DomainResult<StructuralObject> {
    Ok(StructuralObject::named(
        logical,
        json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": { "name": ctx.object_name(logical)?, "namespace": namespace },
        }),
    ))
}

fn config_map(ctx: &BuildContext<'_>, logical: &str, namespace: &str, data: Json) -> DomainResult<StructuralObject> {
    Ok(StructuralObject::named(
        logical,
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": ctx.object_name(logical)?, "namespace": namespace },
            "data": data,
        }),
    ))
}

fn config_maps(
    ctx: &BuildContext<'_>,
    config: &LokiStackConfig,
    enable: Enable,
) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;

    let loki = json!({
        "auth_enabled": false,
        "server": { "http_listen_port": LOKI_PORT },
        "ingester": {
            "lifecycler": { "ring": { "kvstore": { "store": "inmemory" }, "replication_factor": 1 } },
            "chunk_idle_period": "5m",
        },
        "schema_config": {
            "configs": [{
                "from": "2020-10-24",
                "store": "boltdb-shipper",
                "object_store": "filesystem",
                "schema": "v11",
                "index": { "prefix": "index_", "period": "24h" },
            }],
        },
        "storage_config": {
            "boltdb_shipper": {
                "active_index_directory": "/data/loki/index",
                "cache_location": "/data/loki/cache",
                "shared_store": "filesystem",
            },
            "filesystem": { "directory": "/data/loki/chunks" },
        },
    });
    let mut objects = vec![config_map(
        ctx,
        "loki-config",
        &namespace,
        json!({ "loki.yaml": yaml_text(&loki, "config")? }),
    )?];

    if enable.promtail {
        let push = format!(
            "http://{}:{}/loki/api/v1/push",
            ctx.object_name("loki-service")?,
            config.loki_service_port
        );
        let promtail = json!({
            "server": { "http_listen_port": 9080, "grpc_listen_port": 0 },
            "positions": { "filename": "/tmp/positions.yaml" },
            "clients": [{ "url": push }],
            "scrape_configs": [{
                "job_name": "kubernetes-pods",
                "kubernetes_sd_configs": [{ "role": "pod" }],
                "relabel_configs": [
                    { "source_labels": ["__meta_kubernetes_namespace"], "target_label": "namespace" },
                    { "source_labels": ["__meta_kubernetes_pod_name"], "target_label": "pod" },
                    {
                        "source_labels": ["__meta_kubernetes_pod_uid", "__meta_kubernetes_pod_container_name"],
                        "separator": "/",
                        "replacement": "/var/log/pods/*$1/*.log",
                        "target_label": "__path__",
                    },
                ],
            }],
        });
        objects.push(config_map(
            ctx,
            "promtail-config",
            &namespace,
            json!({ "promtail.yaml": yaml_text(&promtail, "config")? }),
        )?);
    }

    if enable.grafana {
        objects.extend(grafana(config, json!({})).config(ctx, &namespace)?);
    }

    Ok(objects)
}

fn services(
    ctx: &BuildContext<'_>,
    config: &LokiStackConfig,
    enable: Enable,
    kubernetes: &KubernetesOptions,
) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let loki = ctx.object_name("loki-statefulset")?;
    let loki_labels = json!({ "app": loki });
    let resources = |container: &str| kubernetes.resources.get(container).cloned().unwrap_or_else(|| json!({}));

    let mut data_volume = json!({ "name": DATA_VOLUME });
    let source = kubernetes
        .volumes
        .get(DATA_VOLUME)
        .cloned()
        .unwrap_or_else(|| json!({ "emptyDir": {} }));
    kubegen_core::domain::merge_json(&mut data_volume, source);

    let mut objects = vec![
        StructuralObject::named(
            "loki-statefulset",
            json!({
                "apiVersion": "apps/v1",
                "kind": "StatefulSet",
                "metadata": { "name": loki, "namespace": namespace, "labels": loki_labels },
                "spec": {
                    "replicas": 1,
                    "serviceName": ctx.object_name("loki-service")?,
                    "selector": { "matchLabels": loki_labels },
                    "template": {
                        "metadata": { "labels": loki_labels },
                        "spec": {
                            "serviceAccountName": ctx.object_name("loki-service-account")?,
                            "securityContext": { "fsGroup": 10001, "runAsUser": 10001 },
                            "containers": [{
                                "name": "loki",
                                "image": config.loki_image,
                                "args": ["-config.file=/etc/loki/loki.yaml"],
                                "ports": [{ "name": "http-metrics", "containerPort": LOKI_PORT }],
                                "resources": resources("loki"),
                                "volumeMounts": [
                                    { "name": "config", "mountPath": "/etc/loki" },
                                    { "name": DATA_VOLUME, "mountPath": "/data" },
                                ],
                            }],
                            "volumes": [
                                { "name": "config", "configMap": { "name": ctx.object_name("loki-config")? } },
                                data_volume,
                            ],
                        },
                    },
                },
            }),
        ),
        StructuralObject::named(
            "loki-service",
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": ctx.object_name("loki-service")?, "namespace": namespace },
                "spec": {
                    "selector": loki_labels,
                    "ports": [{
                        "name": "http-metrics",
                        "port": config.loki_service_port,
                        "targetPort": "http-metrics",
                    }],
                },
            }),
        ),
    ];

    if enable.promtail {
        let promtail = ctx.object_name("promtail-daemonset")?;
        let labels = json!({ "app": promtail });
        objects.push(StructuralObject::named(
            "promtail-daemonset",
            json!({
                "apiVersion": "apps/v1",
                "kind": "DaemonSet",
                "metadata": { "name": promtail, "namespace": namespace, "labels": labels },
                "spec": {
                    "selector": { "matchLabels": labels },
                    "template": {
                        "metadata": { "labels": labels },
                        "spec": {
                            "serviceAccountName": ctx.object_name("promtail-service-account")?,
                            "containers": [{
                                "name": "promtail",
                                "image": config.promtail_image,
                                "args": ["-config.file=/etc/promtail/promtail.yaml"],
                                "resources": resources("promtail"),
                                "volumeMounts": [
                                    { "name": "config", "mountPath": "/etc/promtail" },
                                    { "name": "pods", "mountPath": "/var/log/pods", "readOnly": true },
                                ],
                            }],
                            "volumes": [
                                { "name": "config", "configMap": { "name": ctx.object_name("promtail-config")? } },
                                { "name": "pods", "hostPath": { "path": "/var/log/pods" } },
                            ],
                        },
                    },
                },
            }),
        ));
    }

    if enable.grafana {
        objects.extend(grafana(config, resources("grafana")).service(ctx, &namespace)?);
    }

    Ok(objects)
}
