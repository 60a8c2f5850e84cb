//! Built-in stacks: build sources for Traefik 2, the Loki/Promtail/Grafana
//! logging stack and the Prometheus/Grafana metrics stack.

mod grafana;
mod loki;
mod prometheus;
mod traefik2;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use kubegen_core::domain::{BuildContext, DomainError, DomainResult};

pub use grafana::{GrafanaAdmin, GrafanaDashboard};
pub use loki::{LokiStack, LokiStackConfig};
pub use prometheus::{PrometheusScrape, PrometheusStack, PrometheusStackConfig};
pub use traefik2::{Traefik2, Traefik2Config, Traefik2Port};

/// Deserialize the option subtree at `path` into a typed config.
fn read_option<T: DeserializeOwned>(
    ctx: &BuildContext<'_>,
    path: &str,
    expected: &'static str,
) -> DomainResult<T> {
    serde_json::from_value(ctx.options().to_json(path)?).map_err(|_| {
        DomainError::InvalidOptionValue {
            path: path.to_string(),
            expected,
        }
    })
}

/// Embedded YAML text for a config map entry.
fn yaml_text(value: &Json, path: &str) -> DomainResult<String> {
    serde_yaml::to_string(value).map_err(|_| DomainError::InvalidOptionValue {
        path: path.to_string(),
        expected: "YAML-serializable mapping",
    })
}
