//! Values and patch-rule files.
//!
//! Values files are YAML mappings overlaid onto option stores. Deferred
//! references are written with local tags:
//!
//! ```yaml
//! namespace: !root namespaces.mon
//! config:
//!   grafana_service_port: !ref config.loki_service_port
//! ```
//!
//! Patch files are YAML lists of `{filter, patches}` rules.

use std::path::Path;

use serde_yaml::Value as Yaml;
use serde_yaml::value::TaggedValue;
use tracing::debug;

use kubegen_core::application::ApplicationError;
use kubegen_core::domain::{DottedPath, OptionRef, OptionValue, PatchRule, RefScope};
use kubegen_core::error::KubegenResult;

/// Parse a values document. `origin` names the source in errors.
pub fn parse_values(text: &str, origin: &str) -> KubegenResult<OptionValue> {
    let yaml: Yaml = serde_yaml::from_str(text).map_err(|e| invalid(origin, e))?;
    let value = convert(yaml, origin)?;
    match value {
        OptionValue::Null => Ok(OptionValue::empty_map()),
        OptionValue::Map(_) => Ok(value),
        _ => Err(invalid(origin, "top level must be a mapping")),
    }
}

pub fn load_values(path: &Path) -> KubegenResult<OptionValue> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| invalid(&origin, e))?;
    debug!(path = %origin, "Values file loaded");
    parse_values(&text, &origin)
}

/// Parse a patch-rule list.
pub fn parse_patch_rules(text: &str, origin: &str) -> KubegenResult<Vec<PatchRule>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(text).map_err(|e| invalid(origin, e))
}

pub fn load_patch_rules(path: &Path) -> KubegenResult<Vec<PatchRule>> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| invalid(&origin, e))?;
    let rules = parse_patch_rules(&text, &origin)?;
    debug!(path = %origin, rules = rules.len(), "Patch file loaded");
    Ok(rules)
}

fn convert(yaml: Yaml, origin: &str) -> KubegenResult<OptionValue> {
    Ok(match yaml {
        Yaml::Null => OptionValue::Null,
        Yaml::Bool(b) => OptionValue::Bool(b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => OptionValue::Int(i),
            None => OptionValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Yaml::String(s) => OptionValue::Str(s),
        Yaml::Sequence(items) => OptionValue::Seq(
            items
                .into_iter()
                .map(|item| convert(item, origin))
                .collect::<KubegenResult<_>>()?,
        ),
        Yaml::Mapping(entries) => OptionValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| -> KubegenResult<(String, OptionValue)> {
                    let key = match key {
                        Yaml::String(s) => s,
                        Yaml::Number(n) => n.to_string(),
                        Yaml::Bool(b) => b.to_string(),
                        _ => return Err(invalid(origin, "mapping keys must be scalars")),
                    };
                    Ok((key, convert(value, origin)?))
                })
                .collect::<KubegenResult<_>>()?,
        ),
        Yaml::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            let scope = if tag == "ref" {
                RefScope::Local
            } else if tag == "root" {
                RefScope::Root
            } else {
                return Err(invalid(origin, format!("unknown tag {tag}")));
            };
            let Yaml::String(path) = value else {
                return Err(invalid(origin, format!("{tag} expects a dotted path")));
            };
            let path = DottedPath::parse(&path).map_err(|e| invalid(origin, e))?;
            OptionValue::Ref(OptionRef { path, scope })
        }
    })
}

fn invalid(origin: &str, reason: impl ToString) -> kubegen_core::error::KubegenError {
    ApplicationError::InvalidInput {
        path: origin.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
