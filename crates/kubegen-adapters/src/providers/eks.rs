//! Amazon Elastic Kubernetes Service.
//!
//! Ingresses are served by the AWS load balancer controller, which only
//! picks up ingresses carrying its class annotation.

use serde_json::json;

use kubegen_core::domain::{
    ObjectFilter, PatchOp, PatchPath, PatchRule, PersistentVolumeClaimProfile, PersistentVolumeProfile,
    ProviderKind, ProviderTarget,
};

use super::claim::BasicClaimProfile;
use super::volume::AwsElasticBlockStoreProfile;

#[derive(Debug, Clone, Copy, Default)]
pub struct EksTarget;

impl ProviderTarget for EksTarget {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AmazonEks
    }

    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
        Box::new(AwsElasticBlockStoreProfile)
    }

    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
        Box::new(BasicClaimProfile::default())
    }

    fn ingress_http_path(&self) -> &'static str {
        "/*"
    }

    fn patch_rules(&self, ingress: &ObjectFilter) -> Vec<PatchRule> {
        let annotations = PatchOp::Merge {
            path: PatchPath::root(),
            value: json!({
                "metadata": {
                    "annotations": {
                        "kubernetes.io/ingress.class": "alb",
                        "alb.ingress.kubernetes.io/scheme": "internet-facing",
                        "alb.ingress.kubernetes.io/listen-ports": "[{\"HTTP\": 80}]",
                    }
                }
            }),
        };
        vec![PatchRule::new(ingress.clone(), vec![annotations])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubegen_core::domain::{ObjectIdentity, StructuralObject, patch};

    #[test]
    fn ingress_gets_alb_annotations() {
        let mut objects = vec![
            StructuralObject::with_identity(
                ObjectIdentity::new("ingress", "app", "ingress"),
                json!({"kind": "Ingress", "metadata": {"name": "ingress"}}),
            ),
            StructuralObject::with_identity(
                ObjectIdentity::new("traefik", "traefik2", "traefik2"),
                json!({"kind": "Service", "metadata": {"name": "traefik"}}),
            ),
        ];

        let rules = EksTarget.patch_rules(&ObjectFilter::new().names(["ingress"]));
        patch::apply(&mut objects, &rules).unwrap();

        let annotations = &objects[0].document()["metadata"]["annotations"];
        assert_eq!(annotations["kubernetes.io/ingress.class"], "alb");
        assert_eq!(annotations["alb.ingress.kubernetes.io/listen-ports"], "[{\"HTTP\": 80}]");
        assert!(objects[1].document()["metadata"].get("annotations").is_none());
    }
}
