//! Google Kubernetes Engine.

use kubegen_core::domain::{
    PersistentVolumeClaimProfile, PersistentVolumeProfile, ProviderKind, ProviderTarget,
};

use super::claim::BasicClaimProfile;
use super::volume::GcePersistentDiskProfile;

#[derive(Debug, Clone, Copy, Default)]
pub struct GkeTarget;

impl ProviderTarget for GkeTarget {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleGke
    }

    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
        Box::new(GcePersistentDiskProfile)
    }

    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
        Box::new(BasicClaimProfile::default())
    }

    // The GCE load balancer needs a wildcard to forward sub-paths.
    fn ingress_http_path(&self) -> &'static str {
        "/*"
    }
}
