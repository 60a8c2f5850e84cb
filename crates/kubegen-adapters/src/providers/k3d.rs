//! k3d: a local k3s cluster in docker.

use kubegen_core::domain::{
    PersistentVolumeClaimProfile, PersistentVolumeProfile, ProviderKind, ProviderTarget,
};

use super::claim::BasicClaimProfile;
use super::volume::HostPathProfile;

#[derive(Debug, Clone)]
pub struct K3dTarget {
    cluster_name: String,
}

impl K3dTarget {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }
}

impl Default for K3dTarget {
    fn default() -> Self {
        Self::new("kubegen")
    }
}

impl ProviderTarget for K3dTarget {
    fn kind(&self) -> ProviderKind {
        ProviderKind::K3d
    }

    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
        Box::new(HostPathProfile)
    }

    // local-path cannot match claims by label
    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
        Box::new(BasicClaimProfile::new(false))
    }

    fn cluster_setup_hint(&self, storage_dir: &str) -> Option<String> {
        Some(format!(
            "# k3d cluster create {} --port 5051:80@loadbalancer --port 5052:443@loadbalancer -v {}:/var/storage",
            self.cluster_name, storage_dir
        ))
    }
}
