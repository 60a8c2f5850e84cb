//! The generation pipeline behind `kubegen generate`.
//!
//! Builds a Traefik 2 ingress controller and one monitoring stack (Loki or
//! Prometheus) for one provider and lays them out as nine manifest files
//! plus an apply script that applies them in order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::{Value as Json, json};
use tracing::{debug, info, instrument};

use kubegen_adapters::provider_with_cluster;
use kubegen_adapters::stacks::{
    GrafanaDashboard, LokiStack, PrometheusScrape, PrometheusStack, PrometheusStackConfig,
    Traefik2, Traefik2Config, Traefik2Port,
};
use kubegen_core::application::Generator;
use kubegen_core::domain::{
    BuildSource, Builder, DEFAULT_ROLE, DocumentFile, FileId, FileTemplate, ObjectFilter,
    ObjectIdentity, OptionStore, OptionValue, OutputProject, PatchRule, ProviderKind, ScriptFile,
    StructuralObject, patch,
};
use kubegen_core::error::KubegenResult;

use crate::cli::Stack;

const PROMETHEUS_METRICS_PORT: u16 = 9090;

/// Everything `assemble` needs besides the built-in stacks.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub stack: Stack,
    pub cluster_name: Option<String>,
    /// Host directory mounted as node storage by local clusters.
    pub storage_dir: String,
    /// Overlaid onto the root options, in order.
    pub values: Vec<OptionValue>,
    /// Applied after the provider's own rules.
    pub patches: Vec<PatchRule>,
    pub strict: bool,
}

type ManifestFile = (&'static str, Vec<StructuralObject>);

/// `<parent>/<provider>-<YYYYmmdd-HHMMSS>`, or `<parent>/<provider>`
/// without a timestamp.
pub fn target_dir(parent: &Path, provider: ProviderKind, at: Option<DateTime<Local>>) -> PathBuf {
    match at {
        Some(at) => parent.join(format!("{}-{}", provider, at.format("%Y%m%d-%H%M%S"))),
        None => parent.join(provider.as_str()),
    }
}

/// Root options; `grafana.admin` stays null unless a values file sets it.
fn root_options() -> Json {
    json!({
        "namespaces": { "default": "default", "mon": "monitoring" },
        "grafana": { "admin": null },
    })
}

/// Assemble the output project. Nothing is written.
#[instrument(skip_all, fields(provider = %settings.provider, stack = %settings.stack))]
pub fn assemble(settings: &Settings) -> KubegenResult<OutputProject> {
    let mut options = OptionStore::build(root_options())?;
    for values in &settings.values {
        options = options.overlay("", values.clone())?;
    }

    let provider = provider_with_cluster(settings.provider, settings.cluster_name.as_deref())?;
    let mut kg = Generator::new(provider, options);
    declare_storage(&mut kg, settings.stack)?;

    let mut traefik = kg
        .builder(Traefik2, traefik_options(settings.stack))?
        .strict(settings.strict);
    traefik.remap([("traefik-service", "traefik")])?;
    traefik.ensure_items(&["crd", "access-control", "service"])?;

    let traefik_ns = traefik.namespace()?;
    let traefik_service = traefik.object_name("traefik-service")?;

    let stack_files = match settings.stack {
        Stack::Loki => loki_files(&kg, settings.strict, &traefik_ns)?,
        Stack::Prometheus => prometheus_files(&kg, settings.strict)?,
    };

    let mut storage = kg.persistent_volume_build()?;
    storage.extend(kg.persistent_volume_claim_build()?);

    let mut traefik_config = traefik.build(&["access-control"])?;
    traefik_config.push(traefik_api_route(&traefik_ns));

    let mut traefik_main = traefik.build(&["service"])?;
    traefik_main.push(ingress_route(
        "admin-traefik",
        &traefik_ns,
        "web",
        "Host(`admin-traefik.localdomain`)",
        json!({ "name": traefik_service, "port": 8080 }),
    ));

    let mut files: Vec<ManifestFile> = vec![
        ("namespace.yaml", namespaces(kg.options())?),
        ("storage.yaml", storage),
        ("traefik-config-crd.yaml", traefik.build(&["crd"])?),
        ("traefik-config.yaml", traefik_config),
        ("traefik.yaml", traefik_main),
    ];
    files.extend(stack_files);
    files.push(("http-echo.yaml", http_echo(&traefik_ns)));
    files.push((
        "ingress.yaml",
        vec![ingress(
            &traefik_ns,
            kg.provider().target().ingress_http_path(),
            &traefik_service,
        )],
    ));

    let mut rules = kg.provider_patches(&ObjectFilter::new().names(["ingress"]));
    rules.extend(settings.patches.iter().cloned());
    debug!(rules = rules.len(), "Patch rules collected");

    let mut project = OutputProject::new().strict_references(settings.strict);
    let mut ids: Vec<FileId> = Vec::with_capacity(files.len());
    for (name, mut objects) in files {
        patch::apply(&mut objects, &rules)?;
        let mut file = DocumentFile::new(name);
        file.extend(objects);
        ids.push(project.append(file));
    }

    let mut script = ScriptFile::new(format!("create_{}.sh", settings.provider));
    script.append_line("set -e");
    if let Some(hint) = kg.provider().target().cluster_setup_hint(&settings.storage_dir) {
        script
            .append_line(format!("mkdir -p {}", settings.storage_dir))
            .append_line(hint);
    }
    for id in &ids {
        script.append_template_str(&format!("kubectl apply -f {}", FileTemplate::placeholder(*id)))?;
    }
    project.append(script);

    info!(files = project.len(), "Project assembled");
    Ok(project)
}

/// `lokistack-config.yaml` and `lokistack.yaml`.
fn loki_files(kg: &Generator, strict: bool, route_namespace: &str) -> KubegenResult<Vec<ManifestFile>> {
    let mut loki = kg.builder(LokiStack, loki_options())?.strict(strict);
    loki.remap([("loki-service", "loki")])?;
    loki.ensure_items(&["access-control", "config", "service"])?;

    let mut main = loki.build(&["service"])?;
    main.push(admin_route(&loki, "admin-grafana", route_namespace, "grafana-service", "config.grafana_service_port")?);

    Ok(vec![
        ("lokistack-config.yaml", loki.build(&["access-control", "config"])?),
        ("lokistack.yaml", main),
    ])
}

/// `prometheus-config.yaml` and `prometheus.yaml`; the admin routes live
/// in the stack's own namespace.
fn prometheus_files(kg: &Generator, strict: bool) -> KubegenResult<Vec<ManifestFile>> {
    let mut prometheus = kg
        .builder(PrometheusStack, prometheus_options(kg.kind()))?
        .strict(strict);
    prometheus.remap([("prometheus-service", "prometheus")])?;
    prometheus.ensure_items(&["access-control", "config", "service"])?;

    let namespace = prometheus.namespace()?;
    let mut main = prometheus.build(&["service"])?;
    main.push(admin_route(
        &prometheus,
        "admin-prometheus",
        &namespace,
        "prometheus-service",
        "config.prometheus_service_port",
    )?);
    main.push(admin_route(&prometheus, "admin-grafana", &namespace, "grafana-service", "config.grafana_service_port")?);

    Ok(vec![
        ("prometheus-config.yaml", prometheus.build(&["access-control", "config"])?),
        ("prometheus.yaml", main),
    ])
}

/// An IngressRoute on `<name>.localdomain` to a stack's service, at the
/// port that stack was configured with.
fn admin_route<S: BuildSource>(
    builder: &Builder<S>,
    name: &str,
    namespace: &str,
    service: &str,
    port_option: &str,
) -> KubegenResult<StructuralObject> {
    Ok(ingress_route(
        name,
        namespace,
        "web",
        &format!("Host(`{name}.localdomain`)"),
        json!({
            "name": builder.object_name(service)?,
            "namespace": builder.namespace()?,
            "port": builder.option_get(port_option)?.into_json(),
        }),
    ))
}

/// `<stack>-storage` and its claim, labelled `pv.role: <stack>`.
fn declare_storage(kg: &mut Generator, stack: Stack) -> KubegenResult<()> {
    let volume = format!("{stack}-storage");
    kg.persistent_volume_add(
        volume.clone(),
        DEFAULT_ROLE,
        json!({ "hostPath": { "path": format!("/var/storage/{stack}") }, "csi": { "fsType": "ext4" } }),
        json!({
            "metadata": { "labels": { "pv.role": stack.as_str() } },
            "spec": {
                "persistentVolumeReclaimPolicy": "Retain",
                "capacity": { "storage": "50Gi" },
                "accessModes": ["ReadWriteOnce"],
            },
        }),
    )?;
    kg.persistent_volume_claim_add(
        storage_claim(stack),
        DEFAULT_ROLE,
        json!({ "namespace": "monitoring", "persistentVolume": volume }),
        json!({ "spec": { "selector": { "matchLabels": { "pv.role": stack.as_str() } } } }),
    )
}

fn storage_claim(stack: Stack) -> String {
    format!("{stack}-storage-claim")
}

fn traefik_options(stack: Stack) -> OptionValue {
    let mut args = vec![
        "--api.dashboard=true",
        "--api.insecure=false",
        "--entrypoints.web.Address=:80",
        "--entrypoints.api.Address=:8080",
    ];
    let mut ports = vec![
        Traefik2Port::new("web", 80, Some(80)),
        Traefik2Port::new("api", 8080, Some(8080)),
    ];
    let metrics = stack == Stack::Prometheus;
    if metrics {
        args.extend([
            "--entryPoints.metrics.address=:9090",
            "--metrics.prometheus=true",
            "--metrics.prometheus.entryPoint=metrics",
            "--metrics.prometheus.addEntryPointsLabels=true",
        ]);
        ports.push(Traefik2Port::new("metrics", PROMETHEUS_METRICS_PORT, None).in_service(false));
    }
    args.extend([
        "--providers.kubernetescrd",
        "--providers.kubernetescrd.namespaces=default,monitoring",
    ]);

    let config = Traefik2Config {
        traefik_args: args.into_iter().map(String::from).collect(),
        ports,
        create_traefik_crd: true,
        prometheus_port: metrics.then_some(PROMETHEUS_METRICS_PORT),
        prometheus_annotation: metrics,
        ..Traefik2Config::default()
    };

    let mut options = config.into_options();
    options.merge(OptionValue::map([(
        "namespace",
        OptionValue::root_reference("namespaces.default"),
    )]));
    options
}

/// Namespace and Grafana credentials come from the root options.
fn stack_references() -> OptionValue {
    OptionValue::map([
        ("namespace", OptionValue::root_reference("namespaces.mon")),
        (
            "config",
            OptionValue::map([("grafana_admin", OptionValue::root_reference("grafana.admin"))]),
        ),
    ])
}

fn loki_options() -> OptionValue {
    let mut options = OptionValue::from(json!({
        "config": {
            "loki_service_port": 80,
            "grafana_service_port": 80,
            "grafana_provisioning": {
                "datasources": [{
                    "name": "Loki",
                    "type": "loki",
                    "access": "proxy",
                    "url": "http://loki:80",
                }],
            },
        },
        "enable": { "grafana": true },
        "kubernetes": {
            "volumes": {
                "loki-data": { "persistentVolumeClaim": { "claimName": storage_claim(Stack::Loki) } },
            },
        },
    }));
    options.merge(stack_references());
    options
}

fn prometheus_options(provider: ProviderKind) -> OptionValue {
    let config = PrometheusStackConfig {
        prometheus_annotation: true,
        prometheus_service_port: 80,
        grafana_service_port: 80,
        scrape: PrometheusScrape {
            insecure_skip_verify: true,
            cadvisor: provider != ProviderKind::K3d,
            ..PrometheusScrape::default()
        },
        grafana_provisioning: json!({
            "datasources": [{
                "name": "Prometheus",
                "type": "prometheus",
                "access": "proxy",
                "url": "http://prometheus:80",
            }],
            "dashboards": [{ "name": "default", "type": "file" }],
        }),
        grafana_dashboards: vec![
            GrafanaDashboard::GNet {
                provider: "default".into(),
                name: "prometheus".into(),
                gnet_id: 2,
                revision: 2,
                datasource: Some("Prometheus".into()),
            },
            GrafanaDashboard::Url {
                provider: "default".into(),
                name: "kubernetes".into(),
                url: "https://raw.githubusercontent.com/zaneclaes/grafana-dashboards/master/kubernetes.json".into(),
            },
        ],
        ..PrometheusStackConfig::default()
    };

    let mut options = OptionValue::from(json!({
        "config": config,
        "kubernetes": {
            "volumes": {
                "prometheus-data": {
                    "persistentVolumeClaim": { "claimName": storage_claim(Stack::Prometheus) },
                },
            },
        },
    }));
    options.merge(stack_references());
    options
}

fn app_object(name: &str, document: Json) -> StructuralObject {
    StructuralObject::with_identity(ObjectIdentity::new(name, "app", name), document)
}

/// One Namespace per configured namespace; `default` always exists.
fn namespaces(options: &OptionStore) -> KubegenResult<Vec<StructuralObject>> {
    let tree = options.to_json("namespaces")?;
    let names = tree
        .as_object()
        .map(|m| m.values().filter_map(Json::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    Ok(names
        .into_iter()
        .filter(|name| *name != "default")
        .map(|name| {
            app_object(
                name,
                json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": name } }),
            )
        })
        .collect())
}

fn ingress_route(name: &str, namespace: &str, entry_point: &str, rule: &str, service: Json) -> StructuralObject {
    app_object(
        name,
        json!({
            "apiVersion": "traefik.containo.us/v1alpha1",
            "kind": "IngressRoute",
            "metadata": { "name": name, "namespace": namespace },
            "spec": {
                "entryPoints": [entry_point],
                "routes": [{ "match": rule, "kind": "Rule", "services": [service] }],
            },
        }),
    )
}

fn traefik_api_route(namespace: &str) -> StructuralObject {
    ingress_route(
        "traefik-api",
        namespace,
        "api",
        "Method(`GET`)",
        json!({ "name": "api@internal", "kind": "TraefikService" }),
    )
}

fn http_echo(namespace: &str) -> Vec<StructuralObject> {
    let labels = json!({ "app": "echo" });
    vec![
        app_object(
            "echo-deployment",
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": { "name": "echo-deployment", "namespace": namespace, "labels": labels },
                "spec": {
                    "replicas": 1,
                    "selector": { "matchLabels": labels },
                    "template": {
                        "metadata": { "labels": labels },
                        "spec": {
                            "containers": [{
                                "name": "echo",
                                "image": "mendhak/http-https-echo",
                                "ports": [
                                    { "name": "http", "containerPort": 80 },
                                    { "name": "https", "containerPort": 443 },
                                ],
                            }],
                        },
                    },
                },
            }),
        ),
        app_object(
            "echo-service",
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": "echo-service", "namespace": namespace },
                "spec": {
                    "selector": labels,
                    "ports": [
                        { "name": "http", "port": 80, "targetPort": "http" },
                        { "name": "https", "port": 443, "targetPort": "https" },
                    ],
                },
            }),
        ),
        ingress_route(
            "http-echo",
            namespace,
            "web",
            "PathPrefix(`/`)",
            json!({ "name": "echo-service", "port": 80 }),
        ),
    ]
}

fn ingress(namespace: &str, path: &str, backend: &str) -> StructuralObject {
    app_object(
        "ingress",
        json!({
            "apiVersion": "extensions/v1beta1",
            "kind": "Ingress",
            "metadata": { "name": "ingress", "namespace": namespace },
            "spec": {
                "rules": [{
                    "http": {
                        "paths": [{
                            "path": path,
                            "backend": { "serviceName": backend, "servicePort": 80 },
                        }],
                    },
                }],
            },
        }),
    )
}
