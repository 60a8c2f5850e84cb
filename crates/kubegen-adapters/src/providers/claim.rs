//! Persistent volume claim profile.

use serde_json::{Value as Json, json};

use kubegen_core::domain::{
    ClaimRequest, DomainResult, PersistentVolumeClaimProfile, ProviderKind, StructuralObject,
    merge_json,
};

/// A claim that takes access modes, capacity and storage class from its
/// bound volume.
///
/// Provisioners that cannot match on labels (k3d's local-path) reject a
/// `spec.selector`; with `allow_selector` off it is stripped after merging.
#[derive(Debug, Clone, Copy)]
pub struct BasicClaimProfile {
    allow_selector: bool,
}

impl BasicClaimProfile {
    pub const fn new(allow_selector: bool) -> Self {
        Self { allow_selector }
    }
}

impl Default for BasicClaimProfile {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PersistentVolumeClaimProfile for BasicClaimProfile {
    fn materialize(&self, request: &ClaimRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let volume_spec = request
            .volume
            .as_ref()
            .and_then(|v| v.get("spec"))
            .cloned()
            .unwrap_or(Json::Null);

        let mut metadata = json!({ "name": request.name });
        if let Some(namespace) = request.config.get("namespace") {
            metadata["namespace"] = namespace.clone();
        }

        let mut spec = json!({
            "accessModes": volume_spec
                .get("accessModes")
                .cloned()
                .unwrap_or_else(|| json!(["ReadWriteOnce"])),
            "storageClassName": volume_spec
                .get("storageClassName")
                .cloned()
                .unwrap_or_else(|| json!("")),
        });
        if let Some(name) = request.config.get("persistentVolume") {
            spec["volumeName"] = name.clone();
        }
        if let Some(storage) = volume_spec.get("capacity").and_then(|c| c.get("storage")) {
            spec["resources"] = json!({ "requests": { "storage": storage } });
        }

        let mut document = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": metadata,
            "spec": spec,
        });
        merge_json(&mut document, request.merge.clone());

        if !self.allow_selector {
            if let Some(spec) = document.get_mut("spec").and_then(Json::as_object_mut) {
                spec.remove("selector");
            }
        }

        Ok(StructuralObject::named(request.name.clone(), document))
    }
}
