//! Traefik 2 ingress controller with its CRD provider.

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use kubegen_core::domain::{
    BuildContext, BuildItem, BuildSource, DomainError, DomainResult, OptionValue, StructuralObject,
};

use super::read_option;

const GROUP: &str = "traefik.containo.us";

/// `(plural, kind)` of every CRD the kubernetescrd provider watches.
const CRDS: &[(&str, &str)] = &[
    ("ingressroutes", "IngressRoute"),
    ("ingressroutetcps", "IngressRouteTCP"),
    ("ingressrouteudps", "IngressRouteUDP"),
    ("middlewares", "Middleware"),
    ("tlsoptions", "TLSOption"),
    ("tlsstores", "TLSStore"),
    ("traefikservices", "TraefikService"),
];

const OBJECT_NAMES: &[&str] = &[
    "traefik-crd-ingressroutes",
    "traefik-crd-ingressroutetcps",
    "traefik-crd-ingressrouteudps",
    "traefik-crd-middlewares",
    "traefik-crd-tlsoptions",
    "traefik-crd-tlsstores",
    "traefik-crd-traefikservices",
    "traefik-service-account",
    "traefik-cluster-role",
    "traefik-cluster-role-binding",
    "traefik-deployment",
    "traefik-service",
];

/// A port the traefik container listens on.
///
/// The service exposes it on `port_service`, or on `port_container` when
/// unset, unless `in_service` is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traefik2Port {
    pub name: String,
    pub port_container: u16,
    #[serde(default)]
    pub port_service: Option<u16>,
    #[serde(default = "default_in_service")]
    pub in_service: bool,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl Traefik2Port {
    pub fn new(name: impl Into<String>, port_container: u16, port_service: Option<u16>) -> Self {
        Self {
            name: name.into(),
            port_container,
            port_service,
            in_service: true,
            protocol: default_protocol(),
        }
    }

    /// Keep this port off the service, e.g. a metrics entry point scraped
    /// through pod annotations.
    pub fn in_service(mut self, in_service: bool) -> Self {
        self.in_service = in_service;
        self
    }

    fn service_port(&self) -> Option<u16> {
        self.in_service
            .then(|| self.port_service.unwrap_or(self.port_container))
    }
}

fn default_in_service() -> bool {
    true
}

fn default_protocol() -> String {
    "TCP".into()
}

/// `config.*` options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traefik2Config {
    pub image: String,
    pub traefik_args: Vec<String>,
    pub ports: Vec<Traefik2Port>,
    pub create_traefik_crd: bool,
    /// Container port Prometheus scrapes metrics from.
    #[serde(default)]
    pub prometheus_port: Option<u16>,
    /// Annotate the pod for Prometheus discovery; needs `prometheus_port`.
    #[serde(default)]
    pub prometheus_annotation: bool,
}

impl Traefik2Config {
    /// This config as a builder option overlay under `config`.
    pub fn into_options(self) -> OptionValue {
        OptionValue::map([("config", OptionValue::from(json!(self)))])
    }
}

impl Default for Traefik2Config {
    fn default() -> Self {
        Self {
            image: "traefik:v2.3".into(),
            traefik_args: Vec::new(),
            ports: Vec::new(),
            create_traefik_crd: true,
            prometheus_port: None,
            prometheus_annotation: false,
        }
    }
}

/// Build source `traefik2`.
///
/// Items: `crd` (skipped unless `config.create_traefik_crd`),
/// `access-control` and `service`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Traefik2;

impl BuildSource for Traefik2 {
    fn source_name(&self) -> &'static str {
        "traefik2"
    }

    fn items(&self) -> &'static [BuildItem] {
        const ITEMS: &[BuildItem] = &[
            BuildItem::requires("crd", &["config.create_traefik_crd"]),
            BuildItem::requires("access-control", &["namespace"]),
            BuildItem::requires("service", &["namespace", "config.ports", "config.traefik_args"]),
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
        let defaults = Traefik2Config::default();
        OptionValue::from(json!({ "namespace": "default", "config": defaults }))
    }

    fn produce(&self, item: &str, ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
        match item {
            "crd" if ctx.options().get_bool("config.create_traefik_crd")? => Ok(crds()),
            "crd" => Ok(Vec::new()),
            "access-control" => access_control(ctx),
            "service" => {
                let config: Traefik2Config = read_option(ctx, "config", "traefik2 configuration")?;
                service(ctx, &config)
            }
            _ => Err(DomainError::UnknownBuildItem {
                builder: self.source_name().to_string(),
                item: item.to_string(),
            }),
        }
    }
}

fn crds() -> Vec<StructuralObject> {
    CRDS.iter()
        .map(|(plural, kind)| {
            StructuralObject::named(
                format!("traefik-crd-{plural}"),
                json!({
                    "apiVersion": "apiextensions.k8s.io/v1beta1",
                    "kind": "CustomResourceDefinition",
                    "metadata": { "name": format!("{plural}.{GROUP}") },
                    "spec": {
                        "group": GROUP,
                        "version": "v1alpha1",
                        "names": {
                            "kind": kind,
                            "plural": plural,
                            "singular": plural.trim_end_matches('s'),
                        },
                        "scope": "Namespaced",
                    },
                }),
            )
        })
        .collect()
}

fn access_control(ctx: &BuildContext<'_>) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let account = ctx.object_name("traefik-service-account")?;
    let role = ctx.object_name("traefik-cluster-role")?;
    let read = json!(["get", "list", "watch"]);

    Ok(vec![
        StructuralObject::named(
            "traefik-service-account",
            json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": { "name": account, "namespace": namespace },
            }),
        ),
        StructuralObject::named(
            "traefik-cluster-role",
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRole",
                "metadata": { "name": role },
                "rules": [
                    {
                        "apiGroups": [""],
                        "resources": ["services", "endpoints", "secrets"],
                        "verbs": read,
                    },
                    {
                        "apiGroups": ["extensions", "networking.k8s.io"],
                        "resources": ["ingresses", "ingressclasses"],
                        "verbs": read,
                    },
                    {
                        "apiGroups": ["extensions", "networking.k8s.io"],
                        "resources": ["ingresses/status"],
                        "verbs": ["update"],
                    },
                    {
                        "apiGroups": [GROUP],
                        "resources": CRDS.iter().map(|(plural, _)| *plural).collect::<Vec<_>>(),
                        "verbs": read,
                    },
                ],
            }),
        ),
        StructuralObject::named(
            "traefik-cluster-role-binding",
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": { "name": ctx.object_name("traefik-cluster-role-binding")? },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "ClusterRole",
                    "name": role,
                },
                "subjects": [
                    { "kind": "ServiceAccount", "name": account, "namespace": namespace },
                ],
            }),
        ),
    ])
}

fn service(ctx: &BuildContext<'_>, config: &Traefik2Config) -> DomainResult<Vec<StructuralObject>> {
    let namespace = ctx.namespace()?;
    let deployment = ctx.object_name("traefik-deployment")?;
    let labels = json!({ "app": deployment });

    let container_ports: Vec<Json> = config
        .ports
        .iter()
        .map(|p| json!({ "name": p.name, "containerPort": p.port_container, "protocol": p.protocol }))
        .collect();
    let service_ports: Vec<Json> = config
        .ports
        .iter()
        .filter_map(|p| {
            p.service_port().map(|port| {
                json!({ "name": p.name, "port": port, "targetPort": p.name, "protocol": p.protocol })
            })
        })
        .collect();

    let mut pod_metadata = json!({ "labels": labels });
    if let (true, Some(port)) = (config.prometheus_annotation, config.prometheus_port) {
        pod_metadata["annotations"] = json!({
            "prometheus.io/scrape": "true",
            "prometheus.io/port": port.to_string(),
        });
    }

    Ok(vec![
        StructuralObject::named(
            "traefik-deployment",
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": { "name": deployment, "namespace": namespace, "labels": labels },
                "spec": {
                    "replicas": 1,
                    "selector": { "matchLabels": labels },
                    "template": {
                        "metadata": pod_metadata,
                        "spec": {
                            "serviceAccountName": ctx.object_name("traefik-service-account")?,
                            "containers": [{
                                "name": "traefik",
                                "image": config.image,
                                "args": config.traefik_args,
                                "ports": container_ports,
                            }],
                        },
                    },
                },
            }),
        ),
        StructuralObject::named(
            "traefik-service",
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": ctx.object_name("traefik-service")?, "namespace": namespace },
                "spec": { "selector": labels, "ports": service_ports },
            }),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegen_core::domain::{Builder, DomainError, OptionStore};

    fn builder(user: Json) -> Builder<Traefik2> {
        let root = OptionStore::build(json!({"namespaces": {"default": "default"}})).unwrap();
        Builder::derived(Traefik2, &root, user).unwrap()
    }

    fn config() -> Json {
        json!({
            "namespace": "ingress",
            "config": {
                "traefik_args": ["--providers.kubernetescrd"],
                "ports": [
                    {"name": "web", "port_container": 80, "port_service": 80},
                    {"name": "metrics", "port_container": 8082, "in_service": false},
                ],
            },
        })
    }

    #[test]
    fn crd_item_emits_every_definition() {
        let objects = builder(config()).build(&["crd"]).unwrap();
        assert_eq!(objects.len(), CRDS.len());
        assert_eq!(
            objects[0].document()["metadata"]["name"],
            "ingressroutes.traefik.containo.us"
        );
        assert_eq!(objects[0].identity().source.as_deref(), Some("traefik2"));
    }

    #[test]
    fn crd_item_can_be_switched_off() {
        let mut user = config();
        user["config"]["create_traefik_crd"] = json!(false);
        assert!(builder(user).build(&["crd"]).unwrap().is_empty());
    }

    #[test]
    fn only_exposed_ports_reach_the_service() {
        let mut b = builder(config());
        b.remap([("traefik-service", "traefik")]).unwrap();
        let objects = b.build(&["service"]).unwrap();

        let deployment = objects[0].document();
        assert_eq!(deployment["metadata"]["namespace"], "ingress");
        assert_eq!(
            deployment["spec"]["template"]["spec"]["containers"][0]["ports"]
                .as_array()
                .unwrap()
                .len(),
            2
        );

        let service = &objects[1];
        assert_eq!(service.identity().name.as_deref(), Some("traefik"));
        assert_eq!(service.document()["metadata"]["name"], "traefik");
        assert_eq!(
            service.document()["spec"]["ports"],
            json!([{"name": "web", "port": 80, "targetPort": "web", "protocol": "TCP"}])
        );
    }

    #[test]
    fn binding_follows_remapped_names() {
        let mut b = builder(config());
        b.remap([("traefik-service-account", "ingress-controller")]).unwrap();
        let objects = b.build(&["access-control"]).unwrap();

        assert_eq!(objects[2].document()["subjects"][0]["name"], "ingress-controller");
        assert_eq!(objects[2].document()["subjects"][0]["namespace"], "ingress");
    }

    #[test]
    fn unset_service_port_falls_back_to_container_port() {
        let mut user = config();
        user["config"]["ports"] = json!([{"name": "api", "port_container": 8080}]);
        let objects = builder(user).build(&["service"]).unwrap();

        assert_eq!(objects[1].document()["spec"]["ports"][0]["port"], 8080);
    }

    #[test]
    fn prometheus_annotation_marks_the_pod() {
        let mut user = config();
        user["config"]["prometheus_port"] = json!(8082);
        user["config"]["prometheus_annotation"] = json!(true);
        let objects = builder(user).build(&["service"]).unwrap();

        let pod = &objects[0].document()["spec"]["template"]["metadata"];
        assert_eq!(pod["annotations"]["prometheus.io/scrape"], "true");
        assert_eq!(pod["annotations"]["prometheus.io/port"], "8082");
    }

    #[test]
    fn annotation_without_port_is_skipped() {
        let mut user = config();
        user["config"]["prometheus_annotation"] = json!(true);
        let objects = builder(user).build(&["service"]).unwrap();

        assert!(objects[0].document()["spec"]["template"]["metadata"].get("annotations").is_none());
    }

    #[test]
    fn every_declared_item_builds() {
        let b = builder(config());
        let items: Vec<_> = b.item_names().collect();
        assert_eq!(items, vec!["crd", "access-control", "service"]);
        for item in items {
            assert!(!b.build(&[item]).unwrap().is_empty(), "{item} emitted nothing");
        }
    }

    #[test]
    fn malformed_ports_only_break_the_service_item() {
        let mut user = config();
        user["config"]["ports"] = json!("80");
        let b = builder(user);

        b.ensure_items(&["access-control", "service"]).unwrap();
        assert_eq!(b.build(&["access-control"]).unwrap().len(), 3);
        assert_eq!(b.build(&["crd"]).unwrap().len(), CRDS.len());
        let err = b.build(&["service"]).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidOptionValue {
                path: "config".into(),
                expected: "traefik2 configuration",
            }
        );
    }

    #[test]
    fn typed_config_round_trips_through_options() {
        let config = Traefik2Config {
            ports: vec![
                Traefik2Port::new("web", 80, Some(80)),
                Traefik2Port::new("metrics", 9090, None).in_service(false),
            ],
            prometheus_port: Some(9090),
            ..Traefik2Config::default()
        };
        let store = OptionStore::build(config.clone().into_options()).unwrap();
        let back: Traefik2Config = serde_json::from_value(store.to_json("config").unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
