//! Grafana front end shared by the monitoring stacks.
//!
//! Datasources and dashboard providers come from a provisioning tree.
//! Dashboards listed in `grafana_dashboards` are downloaded by an init
//! container into `/var/lib/grafana/dashboards/<provider>/<name>.json`, the
//! directory the matching file provider watches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use kubegen_core::domain::{BuildContext, DomainResult, StructuralObject};

use super::yaml_text;

pub(super) const GRAFANA_PORT: u16 = 3000;
const DASHBOARDS_DIR: &str = "/var/lib/grafana/dashboards";
const FETCH_IMAGE: &str = "curlimages/curl:7.73.0";

/// A dashboard fetched when the pod starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum GrafanaDashboard {
    /// A dashboard published on grafana.com.
    GNet {
        provider: String,
        name: String,
        gnet_id: u32,
        revision: u32,
        /// Datasource substituted for the dashboard's `${DS_*}` inputs.
        #[serde(default)]
        datasource: Option<String>,
    },
    Url {
        provider: String,
        name: String,
        url: String,
    },
}

impl GrafanaDashboard {
    pub fn provider(&self) -> &str {
        match self {
            Self::GNet { provider, .. } | Self::Url { provider, .. } => provider,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::GNet { name, .. } | Self::Url { name, .. } => name,
        }
    }

    fn download_url(&self) -> String {
        match self {
            Self::GNet { gnet_id, revision, .. } => {
                format!("https://grafana.com/api/dashboards/{gnet_id}/revisions/{revision}/download")
            }
            Self::Url { url, .. } => url.clone(),
        }
    }

    fn fetch_command(&self) -> String {
        let target = format!("{DASHBOARDS_DIR}/{}/{}.json", self.provider(), self.name());
        let fetch = format!("curl -skf --retry 3 '{}'", self.download_url());
        match self {
            Self::GNet { datasource: Some(ds), .. } => {
                format!("{fetch} | sed 's/${{DS_[A-Z0-9_]*}}/{ds}/g' > '{target}'")
            }
            _ => format!("{fetch} > '{target}'"),
        }
    }
}

/// Administrator credentials, kept in the `grafana-admin` secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrafanaAdmin {
    pub user: String,
    pub password: String,
}

/// Everything a stack passes down to emit Grafana.
pub(super) struct Grafana<'a> {
    pub image: &'a str,
    pub service_port: u16,
    pub provisioning: &'a Json,
    pub dashboards: &'a [GrafanaDashboard],
    pub admin: Option<&'a GrafanaAdmin>,
    pub resources: Json,
}

impl Grafana<'_> {
    fn providers(&self) -> Vec<Json> {
        self.provisioning
            .get("dashboards")
            .and_then(Json::as_array)
            .map(|providers| {
                providers
                    .iter()
                    .map(|provider| {
                        let name = provider.get("name").and_then(Json::as_str).unwrap_or("default");
                        let mut entry = json!({
                            "orgId": 1,
                            "folder": "",
                            "disableDeletion": false,
                            "options": { "path": format!("{DASHBOARDS_DIR}/{name}") },
                        });
                        kubegen_core::domain::merge_json(&mut entry, provider.clone());
                        entry
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `grafana-config`, plus the `grafana-admin` secret when credentials
    /// are set.
    pub fn config(&self, ctx: &BuildContext<'_>, namespace: &str) -> DomainResult<Vec<StructuralObject>> {
        let datasources = json!({
            "apiVersion": 1,
            "datasources": self.provisioning.get("datasources").cloned().unwrap_or_else(|| json!([])),
        });
        let mut data = json!({
            "datasources.yaml": yaml_text(&datasources, "config.grafana_provisioning")?,
        });
        let providers = self.providers();
        if !providers.is_empty() {
            let dashboards = json!({ "apiVersion": 1, "providers": providers });
            data["dashboards.yaml"] = json!(yaml_text(&dashboards, "config.grafana_provisioning")?);
        }

        let mut objects = vec![StructuralObject::named(
            "grafana-config",
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": ctx.object_name("grafana-config")?, "namespace": namespace },
                "data": data,
            }),
        )];

        if let Some(admin) = self.admin {
            objects.push(StructuralObject::named(
                "grafana-admin",
                json!({
                    "apiVersion": "v1",
                    "kind": "Secret",
                    "metadata": { "name": ctx.object_name("grafana-admin")?, "namespace": namespace },
                    "type": "Opaque",
                    "stringData": { "user": admin.user, "password": admin.password },
                }),
            ));
        }
        Ok(objects)
    }

    /// `grafana-deployment` and `grafana-service`.
    pub fn service(&self, ctx: &BuildContext<'_>, namespace: &str) -> DomainResult<Vec<StructuralObject>> {
        let grafana = ctx.object_name("grafana-deployment")?;
        let config = ctx.object_name("grafana-config")?;
        let labels = json!({ "app": grafana });
        let with_dashboards = !self.providers().is_empty();

        let env = match self.admin {
            Some(_) => {
                let secret = ctx.object_name("grafana-admin")?;
                let from_secret = |key: &str| json!({ "secretKeyRef": { "name": secret, "key": key } });
                json!([
                    { "name": "GF_SECURITY_ADMIN_USER", "valueFrom": from_secret("user") },
                    { "name": "GF_SECURITY_ADMIN_PASSWORD", "valueFrom": from_secret("password") },
                ])
            }
            None => json!([
                { "name": "GF_AUTH_ANONYMOUS_ENABLED", "value": "true" },
                { "name": "GF_AUTH_ANONYMOUS_ORG_ROLE", "value": "Admin" },
            ]),
        };

        let mut mounts = vec![json!({
            "name": "provisioning-datasources",
            "mountPath": "/etc/grafana/provisioning/datasources",
        })];
        let mut volumes = vec![json!({
            "name": "provisioning-datasources",
            "configMap": { "name": config, "items": [{ "key": "datasources.yaml", "path": "datasources.yaml" }] },
        })];
        if with_dashboards {
            mounts.push(json!({ "name": "provisioning-dashboards", "mountPath": "/etc/grafana/provisioning/dashboards" }));
            mounts.push(json!({ "name": "dashboards", "mountPath": DASHBOARDS_DIR }));
            volumes.push(json!({
                "name": "provisioning-dashboards",
                "configMap": { "name": config, "items": [{ "key": "dashboards.yaml", "path": "dashboards.yaml" }] },
            }));
            volumes.push(json!({ "name": "dashboards", "emptyDir": {} }));
        }

        let mut pod = json!({
            "containers": [{
                "name": "grafana",
                "image": self.image,
                "ports": [{ "name": "http", "containerPort": GRAFANA_PORT }],
                "env": env,
                "resources": self.resources,
                "volumeMounts": mounts,
            }],
            "volumes": volumes,
        });
        if with_dashboards && !self.dashboards.is_empty() {
            let providers: BTreeSet<&str> = self.dashboards.iter().map(GrafanaDashboard::provider).collect();
            let mut script: Vec<String> = providers
                .into_iter()
                .map(|provider| format!("mkdir -p '{DASHBOARDS_DIR}/{provider}'"))
                .collect();
            script.extend(self.dashboards.iter().map(GrafanaDashboard::fetch_command));
            pod["initContainers"] = json!([{
                "name": "download-dashboards",
                "image": FETCH_IMAGE,
                "command": ["/bin/sh", "-c", script.join(" && ")],
                "volumeMounts": [{ "name": "dashboards", "mountPath": DASHBOARDS_DIR }],
            }]);
        }

        Ok(vec![
            StructuralObject::named(
                "grafana-deployment",
                json!({
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": { "name": grafana, "namespace": namespace, "labels": labels },
                    "spec": {
                        "replicas": 1,
                        "selector": { "matchLabels": labels },
                        "template": { "metadata": { "labels": labels }, "spec": pod },
                    },
                }),
            ),
            StructuralObject::named(
                "grafana-service",
                json!({
                    "apiVersion": "v1",
                    "kind": "Service",
                    "metadata": { "name": ctx.object_name("grafana-service")?, "namespace": namespace },
                    "spec": {
                        "selector": labels,
                        "ports": [{ "name": "http", "port": self.service_port, "targetPort": "http" }],
                    },
                }),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gnet_dashboard_substitutes_datasource() {
        let dashboard = GrafanaDashboard::GNet {
            provider: "default".into(),
            name: "prometheus".into(),
            gnet_id: 2,
            revision: 2,
            datasource: Some("Prometheus".into()),
        };
        let command = dashboard.fetch_command();

        assert!(command.starts_with("curl -skf --retry 3 'https://grafana.com/api/dashboards/2/revisions/2/download'"));
        assert!(command.contains("s/${DS_[A-Z0-9_]*}/Prometheus/g"));
        assert!(command.ends_with("> '/var/lib/grafana/dashboards/default/prometheus.json'"));
    }

    #[test]
    fn dashboards_deserialize_by_source_tag() {
        let dashboard: GrafanaDashboard = serde_json::from_value(json!({
            "source": "url",
            "provider": "default",
            "name": "kubernetes",
            "url": "https://example.com/kubernetes.json",
        }))
        .unwrap();

        assert_eq!(dashboard.name(), "kubernetes");
        assert_eq!(dashboard.fetch_command(), "curl -skf --retry 3 'https://example.com/kubernetes.json' > '/var/lib/grafana/dashboards/default/kubernetes.json'");
    }
}
