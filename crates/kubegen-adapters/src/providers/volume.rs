//! Persistent volume profiles, one per storage backend.
//!
//! Every profile builds the same skeleton (`v1/PersistentVolume` named after
//! the request) and differs only in the volume source it puts under `spec`.
//! The request's `merge` document is applied last.

use serde_json::{Map, Value as Json, json};

use kubegen_core::domain::{
    DomainError, DomainResult, PersistentVolumeProfile, ProviderKind, StructuralObject,
    VolumeRequest, merge_json,
};

const DEFAULT_FS_TYPE: &str = "ext4";

/// Local directory on the node. Requires `config.hostPath`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPathProfile;

/// GCE persistent disk; the disk name defaults to the volume name.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcePersistentDiskProfile;

/// AWS EBS volume; the volume id defaults to the volume name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsElasticBlockStoreProfile;

/// DigitalOcean block storage through its CSI driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalOceanCsiProfile;

impl PersistentVolumeProfile for HostPathProfile {
    fn materialize(&self, request: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let host_path = request
            .config
            .get("hostPath")
            .cloned()
            .ok_or_else(|| DomainError::MissingConfig {
                builder: format!("persistent volume '{}'", request.name),
                path: "hostPath".into(),
            })?;

        Ok(persistent_volume(request, json!({ "hostPath": host_path })))
    }
}

impl PersistentVolumeProfile for GcePersistentDiskProfile {
    fn materialize(&self, request: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let mut source = section(&request.config, "gcePersistentDisk");
        source
            .entry("pdName")
            .or_insert_with(|| json!(request.name));
        source
            .entry("fsType")
            .or_insert_with(|| json!(fs_type(&request.config)));

        Ok(persistent_volume(request, json!({ "gcePersistentDisk": source })))
    }
}

impl PersistentVolumeProfile for AwsElasticBlockStoreProfile {
    fn materialize(&self, request: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let mut source = section(&request.config, "awsElasticBlockStore");
        source
            .entry("volumeID")
            .or_insert_with(|| json!(request.name));
        source
            .entry("fsType")
            .or_insert_with(|| json!(fs_type(&request.config)));

        Ok(persistent_volume(request, json!({ "awsElasticBlockStore": source })))
    }
}

impl PersistentVolumeProfile for DigitalOceanCsiProfile {
    fn materialize(&self, request: &VolumeRequest, _: ProviderKind) -> DomainResult<StructuralObject> {
        let mut csi = section(&request.config, "csi");
        csi.insert("driver".into(), json!("dobs.csi.digitalocean.com"));
        csi.entry("fsType").or_insert_with(|| json!(DEFAULT_FS_TYPE));
        csi.entry("volumeHandle")
            .or_insert_with(|| json!(request.name));

        Ok(persistent_volume(
            request,
            json!({ "storageClassName": "do-block-storage", "csi": csi }),
        ))
    }
}

fn persistent_volume(request: &VolumeRequest, spec: Json) -> StructuralObject {
    let mut document = json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": request.name },
        "spec": spec,
    });
    merge_json(&mut document, request.merge.clone());
    StructuralObject::named(request.name.clone(), document)
}

fn section(config: &Json, key: &str) -> Map<String, Json> {
    config
        .get(key)
        .and_then(Json::as_object)
        .cloned()
        .unwrap_or_default()
}

fn fs_type(config: &Json) -> &str {
    config
        .get("csi")
        .and_then(|csi| csi.get("fsType"))
        .and_then(Json::as_str)
        .unwrap_or(DEFAULT_FS_TYPE)
}
