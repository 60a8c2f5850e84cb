//! Multi-document YAML output.

use kubegen_core::application::{ApplicationError, DocumentSerializer};
use kubegen_core::domain::StructuralObject;
use kubegen_core::error::KubegenResult;

/// Serializes each object as its own YAML document, separated by `---`.
/// Key order follows document insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl DocumentSerializer for YamlSerializer {
    fn serialize(&self, objects: &[StructuralObject]) -> KubegenResult<String> {
        let documents = objects
            .iter()
            .map(|object| -> KubegenResult<String> {
                serde_yaml::to_string(object.document()).map_err(|e| {
                    ApplicationError::Serialization {
                        file: object.identity().to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                })
            })
            .collect::<KubegenResult<Vec<_>>>()?;

        Ok(documents.join("---\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn documents_are_separated() {
        let objects = vec![
            StructuralObject::new(json!({"kind": "Namespace", "metadata": {"name": "monitoring"}})),
            StructuralObject::new(json!({"kind": "Service", "apiVersion": "v1"})),
        ];

        let text = YamlSerializer.serialize(&objects).unwrap();
        assert_eq!(
            text,
            "kind: Namespace\nmetadata:\n  name: monitoring\n---\nkind: Service\napiVersion: v1\n"
        );
    }

    #[test]
    fn json_looking_strings_are_quoted() {
        let objects = vec![StructuralObject::new(json!({
            "alb.ingress.kubernetes.io/listen-ports": "[{\"HTTP\": 80}]"
        }))];

        let text = YamlSerializer.serialize(&objects).unwrap();
        let back: serde_json::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back["alb.ingress.kubernetes.io/listen-ports"], "[{\"HTTP\": 80}]");
    }

    #[test]
    fn empty_file_serializes_to_nothing() {
        assert_eq!(YamlSerializer.serialize(&[]).unwrap(), "");
    }
}
