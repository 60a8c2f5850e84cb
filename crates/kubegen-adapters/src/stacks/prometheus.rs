//! Prometheus metrics store with a Grafana front end.
//!
//! The generated `prometheus.yml` discovers scrape targets through the
//! Kubernetes API; pods and services opt in with `prometheus.io/scrape`
//! annotations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use kubegen_core::domain::{
    BuildContext, BuildItem, BuildSource, DomainError, DomainResult, OptionValue, StructuralObject,
};

use super::grafana::{GRAFANA_PORT, Grafana, GrafanaAdmin, GrafanaDashboard};
use super::{read_option, yaml_text};

const PROMETHEUS_PORT: u16 = 9090;
const DATA_VOLUME: &str = "prometheus-data";
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const OBJECT_NAMES: &[&str] = &[
    "prometheus-service-account",
    "prometheus-cluster-role",
    "prometheus-cluster-role-binding",
    "prometheus-config",
    "prometheus-statefulset",
    "prometheus-service",
    "grafana-config",
    "grafana-admin",
    "grafana-deployment",
    "grafana-service",
];

/// Which scrape jobs the generated `prometheus.yml` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrometheusScrape {
    /// Prometheus scraping itself.
    pub prometheus: bool,
    /// API server, nodes, annotated services and pods.
    pub kubernetes: bool,
    /// Per-node container metrics through the API server proxy.
    pub cadvisor: bool,
    pub insecure_skip_verify: bool,
}

impl Default for PrometheusScrape {
    fn default() -> Self {
        Self {
            prometheus: true,
            kubernetes: true,
            cadvisor: true,
            insecure_skip_verify: false,
        }
    }
}

/// `config.*` options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusStackConfig {
    pub prometheus_image: String,
    pub grafana_image: String,
    pub prometheus_service_port: u16,
    pub grafana_service_port: u16,
    /// Annotate the Prometheus pod so it is scraped like any other target.
    #[serde(default)]
    pub prometheus_annotation: bool,
    #[serde(default)]
    pub scrape: PrometheusScrape,
    /// Literal `prometheus.yml` tree; replaces the generated one.
    #[serde(default)]
    pub prometheus_config: Option<Json>,
    #[serde(default)]
    pub grafana_provisioning: Json,
    #[serde(default)]
    pub grafana_dashboards: Vec<GrafanaDashboard>,
    #[serde(default)]
    pub grafana_admin: Option<GrafanaAdmin>,
}

impl Default for PrometheusStackConfig {
    fn default() -> Self {
        Self {
            prometheus_image: "prom/prometheus:v2.22.0".into(),
            grafana_image: "grafana/grafana:7.3.0".into(),
            prometheus_service_port: PROMETHEUS_PORT,
            grafana_service_port: GRAFANA_PORT,
            prometheus_annotation: false,
            scrape: PrometheusScrape::default(),
            prometheus_config: None,
            grafana_provisioning: json!({ "datasources": [] }),
            grafana_dashboards: Vec::new(),
            grafana_admin: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KubernetesOptions {
    #[serde(default)]
    volumes: BTreeMap<String, Json>,
    #[serde(default)]
    resources: BTreeMap<String, Json>,
}

/// Build source `prometheusstack`.
///
/// Items: `access-control`, `config` and `service`. Grafana objects are
/// only emitted while `enable.grafana` holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusStack;

impl BuildSource for PrometheusStack {
    fn source_name(&self) -> &'static str {
        "prometheusstack"
    }

    fn items(&self) -> &'static [BuildItem] {
        const ITEMS: &[BuildItem] = &[
            BuildItem::requires("access-control", &["namespace"]),
            BuildItem::requires("config", &["config.prometheus_service_port", "enable.grafana"]),
            BuildItem::requires(
                "service",
                &["config.prometheus_service_port", "config.grafana_service_port", "enable.grafana"],
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
            "config": PrometheusStackConfig::default(),
            "enable": { "grafana": true },
            "kubernetes": { "volumes": {}, "resources": {} },
        }))
    }

    fn produce(&self, item: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
        match item {
            "access-control" => access_control(ctx),
            "config" => config_maps(ctx, &read_config(ctx)?, ctx.options().get_bool("enable.grafana")?),
            "service" => {
                let kubernetes: KubernetesOptions =
                    read_option(ctx, "kubernetes", "kubernetes volume/resource mapping")?;
                services(
                    ctx,
                    &read_config(ctx)?,
                    ctx.options().get_bool("enable.grafana")?,
                    &kubernetes,
                )
            }
            _ => Err(DomainError::UnknownBuildItem {
                builder: self.source_name().to_string(),
                item: item.to_string(),
            }),
        }
    }
}

fn read_config(ctx: &BuildContext<'_>) -> DomainResult<PrometheusStackConfig> {
    read_option(ctx, "config", "prometheusstack configuration")
}

fn grafana(config: &PrometheusStackConfig, resources: Json) -> Grafana<'_> {
    Grafana {
        image: &config.grafana_image,
        service_port: config.grafana_service_port,
        provisioning: &config.grafana_provisioning,
        dashboards: &config.grafana_dashboards,
        admin: config.grafana_admin.as_ref(),
        resources,
    }
}

fn access_control(ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let account = ctx.object_name("prometheus-service-account")?;
    let role = ctx.object_name("prometheus-cluster-role")?;

    Ok(vec![
        StructuralObject::named(
            "prometheus-service-account",
            json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": { "name": account, "namespace": namespace },
            }),
        ),
        StructuralObject::named(
            "prometheus-cluster-role",
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRole",
                "metadata": { "name": role },
                "rules": [
                    {
                        "apiGroups": [""],
                        "resources": ["nodes", "nodes/proxy", "nodes/metrics", "services", "endpoints", "pods"],
                        "verbs": ["get", "list", "watch"],
                    },
                    {
                        "apiGroups": ["extensions", "networking.k8s.io"],
                        "resources": ["ingresses"],
                        "verbs": ["get", "list", "watch"],
                    },
                    { "apiGroups": [""], "resources": ["configmaps"], "verbs": ["get"] },
                    { "nonResourceURLs": ["/metrics"], "verbs": ["get"] },
                ],
            }),
        ),
        StructuralObject::named(
            "prometheus-cluster-role-binding",
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": { "name": ctx.object_name("prometheus-cluster-role-binding")? },
                "roleRef": { "apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole", "name": role },
                "subjects": [{ "kind": "ServiceAccount", "name": account, "namespace": namespace }],
            }),
        ),
    ])
}

/// The scrape configuration the stack ships unless `config.prometheus_config`
/// replaces it.
fn prometheus_yml(scrape: PrometheusScrape) -> Json {
    let tls = json!({
        "ca_file": format!("{SERVICE_ACCOUNT_DIR}/ca.crt"),
        "insecure_skip_verify": scrape.insecure_skip_verify,
    });
    let token = format!("{SERVICE_ACCOUNT_DIR}/token");

    let mut jobs = Vec::new();
    if scrape.prometheus {
        jobs.push(json!({
            "job_name": "prometheus",
            "static_configs": [{ "targets": [format!("localhost:{PROMETHEUS_PORT}")] }],
        }));
    }
    if scrape.kubernetes {
        jobs.push(json!({
            "job_name": "kubernetes-apiservers",
            "kubernetes_sd_configs": [{ "role": "endpoints" }],
            "scheme": "https",
            "tls_config": tls,
            "bearer_token_file": token,
            "relabel_configs": [{
                "source_labels": [
                    "__meta_kubernetes_namespace",
                    "__meta_kubernetes_service_name",
                    "__meta_kubernetes_endpoint_port_name",
                ],
                "action": "keep",
                "regex": "default;kubernetes;https",
            }],
        }));
        jobs.push(json!({
            "job_name": "kubernetes-nodes",
            "kubernetes_sd_configs": [{ "role": "node" }],
            "scheme": "https",
            "tls_config": tls,
            "bearer_token_file": token,
            "relabel_configs": [{ "action": "labelmap", "regex": "__meta_kubernetes_node_label_(.+)" }],
        }));
        if scrape.cadvisor {
            jobs.push(json!({
                "job_name": "kubernetes-cadvisor",
                "kubernetes_sd_configs": [{ "role": "node" }],
                "scheme": "https",
                "tls_config": tls,
                "bearer_token_file": token,
                "relabel_configs": [
                    { "action": "labelmap", "regex": "__meta_kubernetes_node_label_(.+)" },
                    { "target_label": "__address__", "replacement": "kubernetes.default.svc:443" },
                    {
                        "source_labels": ["__meta_kubernetes_node_name"],
                        "regex": "(.+)",
                        "target_label": "__metrics_path__",
                        "replacement": "/api/v1/nodes/${1}/proxy/metrics/cadvisor",
                    },
                ],
            }));
        }
        jobs.push(annotated_job("kubernetes-service-endpoints", "endpoints", "service"));
        jobs.push(annotated_job("kubernetes-pods", "pod", "pod"));
    }

    json!({
        "global": { "scrape_interval": "15s", "evaluation_interval": "15s" },
        "scrape_configs": jobs,
    })
}

/// A job keeping only targets annotated with `prometheus.io/scrape`.
fn annotated_job(name: &str, role: &str, annotated: &str) -> Json {
    let meta = format!("__meta_kubernetes_{annotated}_annotation_prometheus_io");
    json!({
        "job_name": name,
        "kubernetes_sd_configs": [{ "role": role }],
        "relabel_configs": [
            { "source_labels": [format!("{meta}_scrape")], "action": "keep", "regex": "true" },
            {
                "source_labels": [format!("{meta}_path")],
                "action": "replace",
                "target_label": "__metrics_path__",
                "regex": "(.+)",
            },
            {
                "source_labels": ["__address__", format!("{meta}_port")],
                "action": "replace",
                "regex": "([^:]+)(?::\\d+)?;(\\d+)",
                "replacement": "$1:$2",
                "target_label": "__address__",
            },
            { "source_labels": ["__meta_kubernetes_namespace"], "target_label": "namespace" },
            { "source_labels": [format!("__meta_kubernetes_{annotated}_name")], "target_label": annotated },
        ],
    })
}

fn config_maps(
    ctx: &BuildContext<'_>,
    config: &PrometheusStackConfig,
    with_grafana: bool,
) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let prometheus = match &config.prometheus_config {
        Some(literal) => literal.clone(),
        None => prometheus_yml(config.scrape),
    };

    let mut objects = vec![StructuralObject::named(
        "prometheus-config",
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": ctx.object_name("prometheus-config")?, "namespace": namespace },
            "data": { "prometheus.yml": yaml_text(&prometheus, "config.prometheus_config")? },
        }),
    )];
    if with_grafana {
        objects.extend(grafana(config, json!({})).config(ctx, &namespace)?);
    }
    Ok(objects)
}

fn services(
    ctx: &BuildContext<'_>,
    config: &PrometheusStackConfig,
    with_grafana: bool,
    kubernetes: &KubernetesOptions,
) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let prometheus = ctx.object_name("prometheus-statefulset")?;
    let labels = json!({ "app": prometheus });
    let resources = |container: &str| kubernetes.resources.get(container).cloned().unwrap_or_else(|| json!({}));

    let mut data_volume = json!({ "name": DATA_VOLUME });
    let source = kubernetes
        .volumes
        .get(DATA_VOLUME)
        .cloned()
        .unwrap_or_else(|| json!({ "emptyDir": {} }));
    kubegen_core::domain::merge_json(&mut data_volume, source);

    let mut pod_metadata = json!({ "labels": labels });
    if config.prometheus_annotation {
        pod_metadata["annotations"] = json!({
            "prometheus.io/scrape": "true",
            "prometheus.io/port": PROMETHEUS_PORT.to_string(),
        });
    }

    let mut objects = vec![
        StructuralObject::named(
            "prometheus-statefulset",
            json!({
                "apiVersion": "apps/v1",
                "kind": "StatefulSet",
                "metadata": { "name": prometheus, "namespace": namespace, "labels": labels },
                "spec": {
                    "replicas": 1,
                    "serviceName": ctx.object_name("prometheus-service")?,
                    "selector": { "matchLabels": labels },
                    "template": {
                        "metadata": pod_metadata,
                        "spec": {
                            "serviceAccountName": ctx.object_name("prometheus-service-account")?,
                            "securityContext": { "fsGroup": 65534, "runAsUser": 65534, "runAsNonRoot": true },
                            "containers": [{
                                "name": "prometheus",
                                "image": config.prometheus_image,
                                "args": [
                                    "--config.file=/etc/prometheus/prometheus.yml",
                                    "--storage.tsdb.path=/prometheus",
                                    "--web.enable-lifecycle",
                                ],
                                "ports": [{ "name": "http", "containerPort": PROMETHEUS_PORT }],
                                "resources": resources("prometheus"),
                                "volumeMounts": [
                                    { "name": "config", "mountPath": "/etc/prometheus" },
                                    { "name": DATA_VOLUME, "mountPath": "/prometheus" },
                                ],
                            }],
                            "volumes": [
                                { "name": "config", "configMap": { "name": ctx.object_name("prometheus-config")? } },
                                data_volume,
                            ],
                        },
                    },
                },
            }),
        ),
        StructuralObject::named(
            "prometheus-service",
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": ctx.object_name("prometheus-service")?, "namespace": namespace },
                "spec": {
                    "selector": labels,
                    "ports": [{ "name": "http", "port": config.prometheus_service_port, "targetPort": "http" }],
                },
            }),
        ),
    ];

    if with_grafana {
        objects.extend(grafana(config, resources("grafana")).service(ctx, &namespace)?);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegen_core::domain::{Builder, OptionStore};

    fn builder(user: Json) -> Builder<PrometheusStack> {
        let root = OptionStore::build(json!({"namespaces": {"mon": "monitoring"}})).unwrap();
        Builder::derived(PrometheusStack, &root, user).unwrap()
    }

    fn named<'a>(objects: &'a [StructuralObject], name: &str) -> &'a Json {
        objects
            .iter()
            .find(|o| o.identity().name.as_deref() == Some(name))
            .map(StructuralObject::document)
            .unwrap()
    }

    fn scrape_jobs(objects: &[StructuralObject]) -> Vec<String> {
        let text = named(objects, "prometheus-config")["data"]["prometheus.yml"].as_str().unwrap();
        let parsed: Json = serde_yaml::from_str(text).unwrap();
        parsed["scrape_configs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|job| job["job_name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn default_config_scrapes_cluster_and_annotated_pods() {
        let objects = builder(json!({})).build(&["config"]).unwrap();
        assert_eq!(
            scrape_jobs(&objects),
            vec![
                "prometheus",
                "kubernetes-apiservers",
                "kubernetes-nodes",
                "kubernetes-cadvisor",
                "kubernetes-service-endpoints",
                "kubernetes-pods",
            ]
        );
    }

    #[test]
    fn cadvisor_job_can_be_dropped() {
        let objects = builder(json!({"config": {"scrape": {"cadvisor": false, "insecure_skip_verify": true}}}))
            .build(&["config"])
            .unwrap();

        let jobs = scrape_jobs(&objects);
        assert!(!jobs.contains(&"kubernetes-cadvisor".to_string()));
        let text = named(&objects, "prometheus-config")["data"]["prometheus.yml"].as_str().unwrap();
        assert!(text.contains("insecure_skip_verify: true"));
    }

    #[test]
    fn literal_prometheus_config_wins() {
        let objects = builder(json!({"config": {"prometheus_config": {"scrape_configs": []}}}))
            .build(&["config"])
            .unwrap();
        assert!(scrape_jobs(&objects).is_empty());
    }

    #[test]
    fn remapped_service_and_claim_volume_reach_the_statefulset() {
        let mut b = builder(json!({
            "config": {"prometheus_service_port": 80, "prometheus_annotation": true},
            "kubernetes": {"volumes": {"prometheus-data": {
                "persistentVolumeClaim": {"claimName": "prometheus-storage-claim"},
            }}},
        }));
        b.remap([("prometheus-service", "prometheus")]).unwrap();
        let objects = b.build(&["service"]).unwrap();

        let statefulset = named(&objects, "prometheus-statefulset");
        assert_eq!(statefulset["spec"]["serviceName"], "prometheus");
        let pod = &statefulset["spec"]["template"];
        assert_eq!(pod["metadata"]["annotations"]["prometheus.io/port"], "9090");
        assert_eq!(
            pod["spec"]["volumes"][1],
            json!({"name": "prometheus-data", "persistentVolumeClaim": {"claimName": "prometheus-storage-claim"}})
        );
        assert_eq!(named(&objects, "prometheus")["spec"]["ports"][0]["port"], 80);
        assert_eq!(b.option_get("config.prometheus_service_port").unwrap(), OptionValue::Int(80));
    }

    #[test]
    fn grafana_admin_and_dashboards_are_provisioned() {
        let b = builder(json!({
            "config": {
                "grafana_provisioning": {
                    "datasources": [{"name": "Prometheus", "type": "prometheus", "url": "http://prometheus:80"}],
                    "dashboards": [{"name": "default", "type": "file"}],
                },
                "grafana_dashboards": [
                    {"source": "gnet", "provider": "default", "name": "prometheus", "gnet_id": 2, "revision": 2,
                     "datasource": "Prometheus"},
                ],
                "grafana_admin": {"user": "myuser", "password": "mypassword"},
            },
        }));

        let config = b.build(&["config"]).unwrap();
        assert_eq!(named(&config, "grafana-admin")["stringData"]["user"], "myuser");
        let providers: Json = serde_yaml::from_str(
            named(&config, "grafana-config")["data"]["dashboards.yaml"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(providers["providers"][0]["options"]["path"], "/var/lib/grafana/dashboards/default");

        let services = b.build(&["service"]).unwrap();
        let pod = &named(&services, "grafana-deployment")["spec"]["template"]["spec"];
        assert_eq!(pod["containers"][0]["env"][0]["name"], "GF_SECURITY_ADMIN_USER");
        let fetch = pod["initContainers"][0]["command"][2].as_str().unwrap();
        assert!(fetch.contains("https://grafana.com/api/dashboards/2/revisions/2/download"));
    }

    #[test]
    fn grafana_can_be_disabled() {
        let b = builder(json!({"enable": {"grafana": false}}));
        let objects = b.build(&["access-control", "config", "service"]).unwrap();
        assert!(objects.iter().all(|o| !o.identity().name.as_deref().unwrap_or("").starts_with("grafana")));
        assert_eq!(objects.len(), 6);
    }

    #[test]
    fn access_control_ignores_malformed_config() {
        let b = builder(json!({"config": {"scrape": "everything"}}));
        assert_eq!(b.build(&["access-control"]).unwrap().len(), 3);
        assert!(matches!(
            b.build(&["config"]),
            Err(DomainError::InvalidOptionValue { .. })
        ));
    }

    #[test]
    fn every_declared_item_builds() {
        let b = builder(json!({}));
        for item in b.item_names() {
            assert!(!b.build(&[item]).unwrap().is_empty(), "{item} emitted nothing");
        }
    }
}
