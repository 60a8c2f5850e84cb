//! DigitalOcean Kubernetes.

use kubegen_core::domain::{
    PersistentVolumeClaimProfile, PersistentVolumeProfile, ProviderKind, ProviderTarget,
};

use super::claim::BasicClaimProfile;
use super::volume::DigitalOceanCsiProfile;

#[derive(Debug, Clone, Copy, Default)]
pub struct DigitalOceanTarget;

impl ProviderTarget for DigitalOceanTarget {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOceanKubernetes
    }

    fn default_volume_profile(&self) -> Box<dyn PersistentVolumeProfile> {
        Box::new(DigitalOceanCsiProfile)
    }

    fn default_claim_profile(&self) -> Box<dyn PersistentVolumeClaimProfile> {
        Box::new(BasicClaimProfile::default())
    }
}
